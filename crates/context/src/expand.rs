//! Expansion state of one pivot axis.
//!
//! Keyed by pivot path rather than node id, so an explicit open/close
//! survives the node being pruned and re-created.

use alloc::vec::Vec;
use hashbrown::HashMap;
use rill_core::Scalar;

#[derive(Clone, Debug, Default)]
pub struct Expansion {
    depth: usize,
    max_depth: usize,
    overrides: HashMap<Vec<Scalar>, bool>,
}

impl Expansion {
    /// Expanded down to `depth`, on an axis with `max_depth` pivots.
    pub fn new(depth: usize, max_depth: usize) -> Self {
        Self {
            depth: depth.min(max_depth),
            max_depth,
            overrides: HashMap::new(),
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Whether the children of the node at `path` are shown.
    pub fn is_expanded(&self, path: &[Scalar]) -> bool {
        if path.len() >= self.max_depth {
            return false;
        }
        self.overrides
            .get(path)
            .copied()
            .unwrap_or(path.len() < self.depth)
    }

    /// Bulk-expands to `depth`, dropping per-path overrides.
    pub fn set_depth(&mut self, depth: usize) {
        self.depth = depth.min(self.max_depth);
        self.overrides.clear();
    }

    /// Returns false when the path is a leaf of the pivot hierarchy.
    pub fn open(&mut self, path: &[Scalar]) -> bool {
        if path.len() >= self.max_depth {
            return false;
        }
        self.overrides.insert(path.to_vec(), true);
        true
    }

    pub fn close(&mut self, path: &[Scalar]) -> bool {
        if path.len() >= self.max_depth {
            return false;
        }
        self.overrides.insert(path.to_vec(), false);
        true
    }
}
