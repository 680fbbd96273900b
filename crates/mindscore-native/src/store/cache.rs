//! In-memory cache of loaded models, keyed by artifact checksum

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use mindscore_core::types::ModelInfo;

use super::error::{StoreError, StoreResult};

/// A loaded model with the identity it was stored under.
#[derive(Debug)]
pub struct CacheEntry<M> {
    /// Loaded model
    pub model: M,
    /// Identity stored next to the model
    pub info: ModelInfo,
    /// Artifact checksum
    pub checksum: String,
}

/// Checksum-keyed model cache.
///
/// Entries are never evicted. Inserting a checksum that is already present
/// keeps the first entry. Every write is a single map operation, so a lock
/// poisoned by a panicking reader or writer still guards a consistent map and
/// is recovered rather than reported.
#[derive(Debug)]
pub struct ModelCache<M> {
    entries: RwLock<HashMap<String, Arc<CacheEntry<M>>>>,
}

impl<M> Default for ModelCache<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> ModelCache<M> {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<CacheEntry<M>>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<CacheEntry<M>>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a model, or return the entry already held for `checksum`.
    pub fn insert(&self, model: M, info: ModelInfo, checksum: impl Into<String>) -> StoreResult<Arc<CacheEntry<M>>> {
        let checksum = checksum.into().to_ascii_lowercase();
        let mut entries = self.write();

        let entry = match entries.entry(checksum) {
            Entry::Occupied(slot) => {
                debug!(checksum = %slot.key(), "Cache hit");
                Arc::clone(slot.get())
            }
            Entry::Vacant(slot) => {
                debug!(checksum = %slot.key(), info = %info, "Cache update with new model");
                let entry = Arc::new(CacheEntry {
                    model,
                    info,
                    checksum: slot.key().clone(),
                });
                Arc::clone(slot.insert(entry))
            }
        };

        Ok(entry)
    }

    /// Entry for `checksum`
    pub fn get(&self, checksum: &str) -> StoreResult<Arc<CacheEntry<M>>> {
        self.read()
            .get(&checksum.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                checksum: checksum.to_string(),
            })
    }

    /// Whether `checksum` is cached
    #[must_use]
    pub fn contains(&self, checksum: &str) -> bool {
        self.read().contains_key(&checksum.to_ascii_lowercase())
    }

    /// Number of cached models
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// True when nothing is cached
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn info(name: &str) -> ModelInfo {
        ModelInfo::new(name, "org", "user", "focus")
    }

    #[test]
    fn test_insert_is_idempotent() {
        let cache = ModelCache::new();

        let first = cache.insert(1_u32, info("a"), "abc").unwrap();
        let second = cache.insert(2_u32, info("b"), "abc").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.model, 1);
        assert_eq!(second.info.name, "a");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_distinct_checksums_are_independent() {
        let cache = ModelCache::new();
        cache.insert(1_u32, info("a"), "aaa").unwrap();
        cache.insert(2_u32, info("b"), "bbb").unwrap();

        assert_eq!(cache.get("aaa").unwrap().model, 1);
        assert_eq!(cache.get("bbb").unwrap().model, 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_get_absent_checksum_fails() {
        let cache: ModelCache<u32> = ModelCache::new();
        assert!(cache.is_empty());
        assert!(matches!(cache.get("missing"), Err(StoreError::NotFound { .. })));
        assert!(!cache.contains("missing"));
    }

    #[test]
    fn test_checksum_case_is_ignored() {
        let cache = ModelCache::new();
        cache.insert(7_u32, info("a"), "ABCDEF").unwrap();
        assert!(cache.contains("abcdef"));
        assert_eq!(cache.get("AbCdEf").unwrap().checksum, "abcdef");
    }

    #[test]
    fn test_concurrent_inserts_resolve_to_one_entry() {
        let cache = Arc::new(ModelCache::new());

        let handles: Vec<_> = (0..8_u32)
            .map(|i| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || cache.insert(i, info("t"), "shared").unwrap())
            })
            .collect();

        let entries: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(entries.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_poisoned_lock_is_recovered() {
        let cache = Arc::new(ModelCache::new());
        cache.insert(1_u32, info("a"), "aaa").unwrap();

        let poisoner = Arc::clone(&cache);
        let result = thread::spawn(move || {
            let _guard = poisoner.entries.write().unwrap();
            panic!("writer died holding the lock");
        })
        .join();
        assert!(result.is_err());
        assert!(cache.entries.is_poisoned());

        assert!(cache.contains("aaa"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("aaa").unwrap().model, 1);

        cache.insert(2_u32, info("b"), "bbb").unwrap();
        assert_eq!(cache.len(), 2);
        assert!(!cache.is_empty());
    }
}
