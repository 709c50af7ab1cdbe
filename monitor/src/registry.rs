//! Copy-on-write collection used for listener and observer sets
//!
//! Every mutation builds a new backing vector and swaps it in; readers take
//! a cheap `Arc` snapshot and iterate it without holding any lock, so a
//! registration made during a notification pass never disturbs that pass.

use std::sync::Arc;

use parking_lot::RwLock;

/// Copy-on-write registry of `T`
#[derive(Debug)]
pub struct CowRegistry<T> {
    items: RwLock<Arc<Vec<T>>>,
}

impl<T> Default for CowRegistry<T> {
    fn default() -> Self {
        Self {
            items: RwLock::new(Arc::new(Vec::new())),
        }
    }
}

impl<T: Clone> CowRegistry<T> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding `items` in order
    pub fn from_vec(items: Vec<T>) -> Self {
        Self {
            items: RwLock::new(Arc::new(items)),
        }
    }

    /// Current contents; later mutations do not affect the returned snapshot
    pub fn snapshot(&self) -> Arc<Vec<T>> {
        self.items.read().clone()
    }

    /// Append an item
    pub fn push(&self, item: T) {
        let mut guard = self.items.write();
        let mut next: Vec<T> = guard.iter().cloned().collect();
        next.push(item);
        *guard = Arc::new(next);
    }

    /// Keep only the items matching `keep`; returns how many were removed
    pub fn retain(&self, mut keep: impl FnMut(&T) -> bool) -> usize {
        let mut guard = self.items.write();
        let next: Vec<T> = guard.iter().filter(|item| keep(item)).cloned().collect();
        let removed = guard.len() - next.len();
        if removed > 0 {
            *guard = Arc::new(next);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

impl<T: ?Sized> CowRegistry<Arc<T>> {
    /// Remove every registration of this exact `Arc` (pointer identity)
    pub fn remove(&self, item: &Arc<T>) -> bool {
        let target = Arc::as_ptr(item) as *const ();
        self.retain(|existing| Arc::as_ptr(existing) as *const () != target) > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_snapshot() {
        let registry = CowRegistry::new();
        registry.push(1);
        registry.push(2);

        assert_eq!(*registry.snapshot(), vec![1, 2]);
        assert_eq!(registry.len(), 2);
        assert!(!registry.is_empty());
    }

    #[test]
    fn test_snapshot_unaffected_by_later_mutation() {
        let registry = CowRegistry::from_vec(vec!["a", "b"]);
        let before = registry.snapshot();

        registry.push("c");
        registry.retain(|item| *item != "a");

        assert_eq!(*before, vec!["a", "b"]);
        assert_eq!(*registry.snapshot(), vec!["b", "c"]);
    }

    #[test]
    fn test_remove_by_identity() {
        let first = Arc::new(String::from("same"));
        let second = Arc::new(String::from("same"));

        let registry = CowRegistry::new();
        registry.push(first.clone());
        registry.push(second.clone());

        assert!(registry.remove(&first));
        assert!(!registry.remove(&first));
        assert_eq!(registry.len(), 1);
        assert!(Arc::ptr_eq(&registry.snapshot()[0], &second));
    }

    #[test]
    fn test_mutation_while_iterating() {
        let registry = CowRegistry::from_vec(vec![1, 2, 3]);

        for item in registry.snapshot().iter() {
            registry.push(item * 10);
        }

        assert_eq!(*registry.snapshot(), vec![1, 2, 3, 10, 20, 30]);
    }
}
