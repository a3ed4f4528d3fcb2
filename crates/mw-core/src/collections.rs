//! Shared collection abstractions used throughout mw-core.
//!
//! The keep store and the process-wide memo tables sit on `dashmap::DashMap`
//! so that writes are atomic per key.

use dashmap::DashMap;
use std::hash::Hash;

pub struct ConcurrentMap<K, V> {
    inner: DashMap<K, V>,
}

impl<K, V> Default for ConcurrentMap<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> ConcurrentMap<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            inner: dashmap::DashMap::new(),
        }
    }

    pub fn insert(&self, key: K, value: V) {
        self.inner.insert(key, value);
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.inner.remove(key).map(|(_, value)| value)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.contains_key(key)
    }

    pub fn get_cloned(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.inner.get(key).map(|entry| entry.value().clone())
    }

    pub fn get_or_insert_default(&self, key: K) -> V
    where
        V: Default + Clone,
    {
        self.inner.entry(key).or_default().value().clone()
    }

    pub fn get_or_insert_with(&self, key: K, init: impl FnOnce() -> V) -> V
    where
        V: Clone,
    {
        self.inner.entry(key).or_insert_with(init).value().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn clear(&self) {
        self.inner.clear();
    }

    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&K, &V),
    {
        for entry in self.inner.iter() {
            let (k, v) = entry.pair();
            f(k, v);
        }
    }

    /// Copy every entry into a fresh, independently owned map.
    pub fn duplicate(&self) -> Self
    where
        K: Clone,
        V: Clone,
    {
        let copy = Self::new();
        self.for_each(|k, v| copy.insert(k.clone(), v.clone()));
        copy
    }
}
