//! Sparse pivot tree.
//!
//! Nodes live in an arena indexed by `NodeId`; freed ids are recycled. A
//! node exists exactly while at least one row contributes to it: `count`
//! is the number of contributing rows and a node whose count drops to zero
//! is pruned (the root never is).

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use rill_core::Scalar;

/// Index of a node in its tree's arena.
pub type NodeId = usize;

/// The root (grand total) node.
pub const ROOT: NodeId = 0;

/// A tree node.
#[derive(Clone, Debug)]
pub struct Node<T> {
    /// Pivot value of this node; Null for the root.
    pub value: Scalar,
    /// Root is depth 0.
    pub depth: usize,
    pub parent: Option<NodeId>,
    /// Children keyed by pivot value.
    pub children: BTreeMap<Scalar, NodeId>,
    /// Number of contributing rows.
    pub count: usize,
    pub payload: T,
}

/// Arena-backed tree keyed by pivot-value paths.
#[derive(Clone, Debug)]
pub struct SparseTree<T> {
    nodes: Vec<Option<Node<T>>>,
    free: Vec<NodeId>,
    live: usize,
}

impl<T> SparseTree<T> {
    pub fn new(root: T) -> Self {
        Self {
            nodes: alloc::vec![Some(Node {
                value: Scalar::Null,
                depth: 0,
                parent: None,
                children: BTreeMap::new(),
                count: 0,
                payload: root,
            })],
            free: Vec::new(),
            live: 1,
        }
    }

    /// Number of live nodes, root included.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 1
    }

    /// # Panics
    /// Panics on a pruned id.
    pub fn node(&self, id: NodeId) -> &Node<T> {
        self.nodes[id].as_ref().expect("live node")
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node<T> {
        self.nodes[id].as_mut().expect("live node")
    }

    pub fn get(&self, id: NodeId) -> Option<&Node<T>> {
        self.nodes.get(id).and_then(Option::as_ref)
    }

    /// Ids from the root down to `path`, creating missing nodes with `make`.
    pub fn path_ids(&mut self, path: &[Scalar], mut make: impl FnMut() -> T) -> Vec<NodeId> {
        let mut ids = Vec::with_capacity(path.len() + 1);
        let mut current = ROOT;
        ids.push(current);
        for value in path {
            let existing = self.node(current).children.get(value).copied();
            current = match existing {
                Some(id) => id,
                None => {
                    let depth = self.node(current).depth + 1;
                    let id = self.insert(Node {
                        value: value.clone(),
                        depth,
                        parent: Some(current),
                        children: BTreeMap::new(),
                        count: 0,
                        payload: make(),
                    });
                    self.node_mut(current).children.insert(value.clone(), id);
                    id
                }
            };
            ids.push(current);
        }
        ids
    }

    fn insert(&mut self, node: Node<T>) -> NodeId {
        self.live += 1;
        match self.free.pop() {
            Some(id) => {
                self.nodes[id] = Some(node);
                id
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        }
    }

    /// Looks up an existing path.
    pub fn find(&self, path: &[Scalar]) -> Option<NodeId> {
        let mut current = ROOT;
        for value in path {
            current = *self.node(current).children.get(value)?;
        }
        Some(current)
    }

    /// Ids of every prefix of `path`, root first; `None` past the deepest
    /// existing node.
    pub fn prefix_ids(&self, path: &[Scalar]) -> Vec<Option<NodeId>> {
        let mut ids = Vec::with_capacity(path.len() + 1);
        let mut current = Some(ROOT);
        ids.push(current);
        for value in path {
            current = current.and_then(|id| self.node(id).children.get(value).copied());
            ids.push(current);
        }
        ids
    }

    /// Pivot values from the root (exclusive) down to `id`.
    pub fn path_of(&self, id: NodeId) -> Vec<Scalar> {
        let mut path = Vec::new();
        let mut current = id;
        while let Some(parent) = self.node(current).parent {
            path.push(self.node(current).value.clone());
            current = parent;
        }
        path.reverse();
        path
    }

    /// Ids of `path_of(id)`'s ancestors, root first, `id` last.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut ids = alloc::vec![id];
        let mut current = id;
        while let Some(parent) = self.node(current).parent {
            ids.push(parent);
            current = parent;
        }
        ids.reverse();
        ids
    }

    /// Children of `id` in pivot-value order.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.node(id).children.values().copied()
    }

    /// Adjusts the contribution count of every node in `ids`.
    pub fn adjust_counts(&mut self, ids: &[NodeId], added: bool) {
        for &id in ids {
            let node = self.node_mut(id);
            if added {
                node.count += 1;
            } else {
                node.count = node.count.saturating_sub(1);
            }
        }
    }

    /// Prunes emptied nodes of a root-to-leaf chain, deepest first.
    /// Returns the number of nodes removed.
    pub fn prune(&mut self, ids: &[NodeId]) -> usize {
        let mut removed = 0;
        for &id in ids.iter().rev() {
            if id == ROOT {
                break;
            }
            let node = self.node(id);
            if node.count > 0 || !node.children.is_empty() {
                break;
            }
            let (parent, value) = (node.parent, node.value.clone());
            if let Some(parent) = parent {
                self.node_mut(parent).children.remove(&value);
            }
            self.nodes[id] = None;
            self.free.push(id);
            self.live -= 1;
            removed += 1;
        }
        removed
    }

    /// Pre-order ids below the root.
    pub fn iter_preorder(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.live);
        let mut stack: Vec<NodeId> = self.children(ROOT).collect();
        stack.reverse();
        while let Some(id) = stack.pop() {
            out.push(id);
            let mark = stack.len();
            stack.extend(self.children(id));
            stack[mark..].reverse();
        }
        out
    }

    /// Drops every node except the root, resetting its payload.
    pub fn clear(&mut self, root: T) {
        *self = Self::new(root);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn s(v: &str) -> Scalar {
        Scalar::str(v)
    }

    #[test]
    fn test_path_creation_and_lookup() {
        let mut tree = SparseTree::new(());
        let ids = tree.path_ids(&[s("A"), s("x")], || ());
        assert_eq!(ids.len(), 3);
        assert_eq!(ids[0], ROOT);
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.find(&[s("A"), s("x")]), Some(ids[2]));
        assert_eq!(tree.find(&[s("B")]), None);
        assert_eq!(tree.path_of(ids[2]), vec![s("A"), s("x")]);
        assert_eq!(tree.node(ids[2]).depth, 2);
        assert_eq!(tree.ancestors(ids[2]), ids);

        let again = tree.path_ids(&[s("A"), s("y")], || ());
        assert_eq!(again[1], ids[1]);
        assert_eq!(tree.len(), 4);

        assert_eq!(
            tree.prefix_ids(&[s("A"), s("z"), s("q")]),
            vec![Some(ROOT), Some(ids[1]), None, None]
        );
    }

    #[test]
    fn test_prune_on_zero_count() {
        let mut tree = SparseTree::new(());
        let a = tree.path_ids(&[s("A"), s("x")], || ());
        let b = tree.path_ids(&[s("A"), s("y")], || ());
        tree.adjust_counts(&a, true);
        tree.adjust_counts(&b, true);
        assert_eq!(tree.node(ROOT).count, 2);

        tree.adjust_counts(&a, false);
        assert_eq!(tree.prune(&a), 1);
        assert_eq!(tree.find(&[s("A"), s("x")]), None);
        assert!(tree.find(&[s("A")]).is_some());

        tree.adjust_counts(&b, false);
        assert_eq!(tree.prune(&b), 2);
        assert!(tree.is_empty());

        // Freed ids are recycled.
        let c = tree.path_ids(&[s("C")], || ());
        assert!(c[1] == a[2] || c[1] == b[1] || c[1] == b[2]);
    }

    #[test]
    fn test_preorder() {
        let mut tree = SparseTree::new(());
        tree.path_ids(&[s("B"), s("z")], || ());
        tree.path_ids(&[s("A"), s("y")], || ());
        tree.path_ids(&[s("A"), s("x")], || ());
        let paths: Vec<_> = tree.iter_preorder().into_iter().map(|id| tree.path_of(id)).collect();
        assert_eq!(
            paths,
            vec![
                vec![s("A")],
                vec![s("A"), s("x")],
                vec![s("A"), s("y")],
                vec![s("B")],
                vec![s("B"), s("z")],
            ]
        );
    }
}
