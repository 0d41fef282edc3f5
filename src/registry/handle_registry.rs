// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// Maps opaque native handles to the single library wrapper for each.
///
/// While a handle is mapped, every lookup returns a clone of the same
/// `Arc`, so wrapper identity can be checked with [`Arc::ptr_eq`]. The
/// registry holds one strong reference per entry; unmapping drops only that
/// reference and leaves wrappers already handed out alive.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use the_switchboard::registry::HandleRegistry;
///
/// let mut registry: HandleRegistry<u64, String> = HandleRegistry::new();
/// registry.map(7, Arc::new("seven".to_string()));
///
/// let first = registry.find(7).unwrap();
/// let second = registry.find(7).unwrap();
/// assert!(Arc::ptr_eq(&first, &second));
///
/// registry.unmap(7);
/// assert!(registry.find(7).is_none());
/// assert_eq!(first.as_str(), "seven");
/// ```
pub struct HandleRegistry<K, W: ?Sized> {
    entries: HashMap<K, Arc<W>>,
}

impl<K, W> HandleRegistry<K, W>
where
    K: Eq + Hash + Copy,
    W: ?Sized,
{
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Record `wrapper` as the wrapper for `id`.
    ///
    /// Mapping an id that is already present replaces the entry; the
    /// displaced wrapper is returned.
    pub fn map(&mut self, id: K, wrapper: Arc<W>) -> Option<Arc<W>> {
        self.entries.insert(id, wrapper)
    }

    pub fn find(&self, id: K) -> Option<Arc<W>> {
        self.entries.get(&id).cloned()
    }

    /// Remove the entry for `id`. Absent ids are a no-op.
    pub fn unmap(&mut self, id: K) -> Option<Arc<W>> {
        self.entries.remove(&id)
    }

    /// Return the mapped wrapper for `id`, or construct and map one.
    ///
    /// The flag reports whether construction happened.
    pub fn find_or_map_with<E, F>(&mut self, id: K, construct: F) -> Result<(Arc<W>, bool), E>
    where
        F: FnOnce() -> Result<Arc<W>, E>,
    {
        if let Some(existing) = self.entries.get(&id) {
            return Ok((existing.clone(), false));
        }
        let wrapper = construct()?;
        self.entries.insert(id, wrapper.clone());
        Ok((wrapper, true))
    }

    pub fn contains(&self, id: K) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = K> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, W> Default for HandleRegistry<K, W>
where
    K: Eq + Hash + Copy,
    W: ?Sized,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, W> fmt::Debug for HandleRegistry<K, W>
where
    K: fmt::Debug,
    W: ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleRegistry")
            .field("len", &self.entries.len())
            .field("ids", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Wrapper(&'static str);

    #[test]
    fn test_find_returns_identical_wrapper_while_mapped() {
        let mut registry: HandleRegistry<u64, Wrapper> = HandleRegistry::new();
        let original = Arc::new(Wrapper("a"));
        registry.map(1, original.clone());

        let found = registry.find(1).unwrap();
        assert!(Arc::ptr_eq(&found, &original));
        assert!(Arc::ptr_eq(&found, &registry.find(1).unwrap()));
    }

    #[test]
    fn test_remap_replaces_and_returns_previous() {
        let mut registry: HandleRegistry<u64, Wrapper> = HandleRegistry::new();
        registry.map(1, Arc::new(Wrapper("old")));
        let displaced = registry.map(1, Arc::new(Wrapper("new")));

        assert_eq!(displaced.as_deref(), Some(&Wrapper("old")));
        assert_eq!(registry.find(1).as_deref(), Some(&Wrapper("new")));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unmap_missing_id_is_a_noop() {
        let mut registry: HandleRegistry<u64, Wrapper> = HandleRegistry::new();
        registry.map(1, Arc::new(Wrapper("a")));

        assert!(registry.unmap(2).is_none());
        assert!(registry.contains(1));
        assert!(registry.unmap(1).is_some());
        assert!(registry.unmap(1).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unmap_leaves_outstanding_wrappers_alive() {
        let mut registry: HandleRegistry<u64, Wrapper> = HandleRegistry::new();
        registry.map(5, Arc::new(Wrapper("held")));
        let held = registry.find(5).unwrap();

        registry.unmap(5);
        assert_eq!(Arc::strong_count(&held), 1);
        assert_eq!(*held, Wrapper("held"));
    }

    #[test]
    fn test_find_or_map_with_constructs_once() {
        let mut registry: HandleRegistry<u64, Wrapper> = HandleRegistry::new();
        let mut constructions = 0;
        let mut created_flags = Vec::new();

        for _ in 0..3 {
            let (_, created) = registry
                .find_or_map_with(9, || {
                    constructions += 1;
                    Ok::<_, ()>(Arc::new(Wrapper("lazy")))
                })
                .unwrap();
            created_flags.push(created);
        }

        assert_eq!(created_flags, vec![true, false, false]);
        assert_eq!(constructions, 1);
    }

    #[test]
    fn test_find_or_map_with_propagates_construction_error() {
        let mut registry: HandleRegistry<u64, Wrapper> = HandleRegistry::new();
        let result = registry.find_or_map_with(3, || Err("boom"));

        assert_eq!(result.err(), Some("boom"));
        assert!(!registry.contains(3));
    }
}
