//! String interning.
//!
//! Every string column owns a `Vocab`. Cells hold `Arc<str>` handles into it,
//! so the reference count of an entry is the number of cells (plus any
//! outstanding `Scalar`s) that point at it. Overwriting or clearing a cell
//! drops its handle; `collect` then removes entries nobody references.

use alloc::sync::Arc;
use hashbrown::HashSet;

/// Interned string dictionary of a column.
#[derive(Clone, Debug, Default)]
pub struct Vocab {
    entries: HashSet<Arc<str>>,
}

impl Vocab {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the shared handle for `value`, inserting it if needed.
    pub fn intern(&mut self, value: &str) -> Arc<str> {
        if let Some(existing) = self.entries.get(value) {
            return existing.clone();
        }
        let handle: Arc<str> = Arc::from(value);
        self.entries.insert(handle.clone());
        handle
    }

    /// Interns an existing handle, reusing the dictionary entry when one
    /// with equal contents exists.
    pub fn intern_arc(&mut self, value: &Arc<str>) -> Arc<str> {
        if let Some(existing) = self.entries.get(value.as_ref()) {
            return existing.clone();
        }
        self.entries.insert(value.clone());
        value.clone()
    }

    pub fn contains(&self, value: &str) -> bool {
        self.entries.contains(value)
    }

    /// Number of live references to `value`, excluding the dictionary's own.
    pub fn ref_count(&self, value: &str) -> usize {
        self.entries
            .get(value)
            .map(|h| Arc::strong_count(h) - 1)
            .unwrap_or(0)
    }

    /// Drops entries that are only referenced by the dictionary.
    /// Returns the number of entries removed.
    pub fn collect(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|h| Arc::strong_count(h) > 1);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    #[test]
    fn test_intern_shares_handles() {
        let mut vocab = Vocab::new();
        let a = vocab.intern("alpha");
        let b = vocab.intern("alpha");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(vocab.len(), 1);
        assert_eq!(vocab.ref_count("alpha"), 2);
    }

    #[test]
    fn test_collect_reclaims_unreferenced() {
        let mut vocab = Vocab::new();
        let kept = vocab.intern("kept");
        let dropped: Vec<_> = (0..3).map(|_| vocab.intern("dropped")).collect();
        assert_eq!(vocab.ref_count("dropped"), 3);
        drop(dropped);
        assert_eq!(vocab.collect(), 1);
        assert!(vocab.contains("kept"));
        assert!(!vocab.contains("dropped"));
        drop(kept);
        assert_eq!(vocab.collect(), 1);
        assert!(vocab.is_empty());
    }
}
