//! The keep store: memoized construction results scoped to a context entry.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use itertools::Itertools;

use crate::collections::ConcurrentMap;
use crate::def::DefRef;
use crate::value::{Instance, Value};

/// Whether a construction may read or write the keep store in a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cacheability {
    NotCacheable,
    /// May write, may not read.
    CacheStorable,
    /// May read, may not write.
    CacheRetrievable,
    FullyCacheable,
}

impl Cacheability {
    fn from_flags(store: bool, retrieve: bool) -> Self {
        match (store, retrieve) {
            (true, true) => Cacheability::FullyCacheable,
            (true, false) => Cacheability::CacheStorable,
            (false, true) => Cacheability::CacheRetrievable,
            (false, false) => Cacheability::NotCacheable,
        }
    }

    pub fn can_store(self) -> bool {
        matches!(
            self,
            Cacheability::CacheStorable | Cacheability::FullyCacheable
        )
    }

    pub fn can_retrieve(self) -> bool {
        matches!(
            self,
            Cacheability::CacheRetrievable | Cacheability::FullyCacheable
        )
    }

    /// Keep only the capabilities both tiers grant.
    pub fn restrict(self, other: Cacheability) -> Self {
        Self::from_flags(
            self.can_store() && other.can_store(),
            self.can_retrieve() && other.can_retrieve(),
        )
    }
}

/// (nominal definition, name, arguments, indexes).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeepKey {
    pub def: DefRef,
    pub name: String,
    pub args: Vec<Vec<Value>>,
    pub indexes: Vec<Value>,
}

impl fmt::Display for KeepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.def)?;
        for args in self.args.iter().filter(|a| !a.is_empty()) {
            write!(f, "({})", args.iter().join(", "))?;
        }
        for index in &self.indexes {
            write!(f, "[{}]", index)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct KeepEntry {
    /// The concrete definition the value was constructed from.
    pub resolved: DefRef,
    pub args: Arc<[Value]>,
    pub instance: Option<Instance>,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeepStats {
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub rejected: u64,
}

/// One scope of the keep store. Each context entry owns one; the runtime
/// owns one more for globally durable definitions.
#[derive(Default)]
pub struct KeepScope {
    entries: ConcurrentMap<KeepKey, KeepEntry>,
    hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
    rejected: AtomicU64,
}

impl KeepScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored value for `key`, provided it was constructed from `resolved`.
    /// An entry written for another definition under the same key is stale
    /// and ignored.
    pub fn retrieve(&self, key: &KeepKey, resolved: &DefRef) -> Option<KeepEntry> {
        match self.entries.get_cloned(key) {
            Some(entry) if entry.resolved == *resolved => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry)
            }
            Some(_) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn store(&self, key: KeepKey, entry: KeepEntry) {
        self.stores.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(key, entry);
    }

    pub fn contains(&self, key: &KeepKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> KeepStats {
        KeepStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stores: self.stores.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }

    /// Independent copy holding the same entries.
    pub fn duplicate(&self) -> Self {
        Self {
            entries: self.entries.duplicate(),
            ..Self::default()
        }
    }
}

impl fmt::Debug for KeepScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeepScope")
            .field("len", &self.len())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::def::DefId;
    use pretty_assertions::assert_eq;

    fn key(def: u32) -> KeepKey {
        KeepKey {
            def: DefRef::Node(DefId(def)),
            name: "area".to_string(),
            args: vec![vec![Value::Int(2)]],
            indexes: Vec::new(),
        }
    }

    fn entry(resolved: u32, value: i64) -> KeepEntry {
        KeepEntry {
            resolved: DefRef::Node(DefId(resolved)),
            args: Arc::from(Vec::new()),
            instance: None,
            value: Value::Int(value),
        }
    }

    #[test]
    fn restrict_intersects_capabilities() {
        use Cacheability::*;
        assert_eq!(FullyCacheable.restrict(CacheStorable), CacheStorable);
        assert_eq!(CacheRetrievable.restrict(CacheStorable), NotCacheable);
        assert_eq!(FullyCacheable.restrict(FullyCacheable), FullyCacheable);
    }

    #[test]
    fn entries_for_another_definition_are_ignored() {
        let scope = KeepScope::new();
        scope.store(key(1), entry(7, 12));
        assert!(scope.retrieve(&key(1), &DefRef::Node(DefId(8))).is_none());
        let hit = scope.retrieve(&key(1), &DefRef::Node(DefId(7))).unwrap();
        assert_eq!(hit.value, Value::Int(12));
        assert_eq!(
            scope.stats(),
            KeepStats {
                hits: 1,
                misses: 0,
                stores: 1,
                rejected: 1,
            }
        );
    }

    #[test]
    fn duplicates_do_not_share_later_writes() {
        let scope = KeepScope::new();
        scope.store(key(1), entry(1, 1));
        let copy = scope.duplicate();
        copy.store(key(2), entry(2, 2));
        assert_eq!(scope.len(), 1);
        assert_eq!(copy.len(), 2);
    }
}
