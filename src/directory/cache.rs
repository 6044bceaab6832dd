//! Local cache of grain locations learned from remote owners.
//!
//! Entries are hints. The directory validates every hit against current
//! membership before trusting it.

use crate::config::{CacheKind, DirectoryCacheConfig};
use crate::types::{GrainAddress, GrainId};
use moka::ops::compute::Op;
use moka::sync::Cache;
use std::sync::Arc;

/// A cached address and the version tag it was learned at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedAddress {
    /// Cached location.
    pub address: GrainAddress,
    /// Version tag reported by the owner.
    pub version_tag: i32,
}

/// Best-effort cache of grain locations.
pub trait DirectoryCache: Send + Sync + 'static {
    /// Insert or overwrite the entry for `address.grain_id`.
    fn add_or_update(&self, address: GrainAddress, version_tag: i32);

    /// Remove the entry for `grain`. Returns whether one existed.
    fn remove(&self, grain: &GrainId) -> bool;

    /// Remove the entry for `address.grain_id` only if it names the same
    /// activation.
    fn remove_address(&self, address: &GrainAddress) -> bool;

    /// Cached entry for `grain`.
    fn lookup(&self, grain: &GrainId) -> Option<CachedAddress>;

    /// Snapshot of all entries.
    fn entries(&self) -> Vec<CachedAddress>;

    /// Approximate number of entries.
    fn len(&self) -> u64;

    /// Whether the cache is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all entries.
    fn clear(&self);
}

/// Build the cache selected by configuration.
pub fn create_directory_cache(config: &DirectoryCacheConfig) -> Arc<dyn DirectoryCache> {
    match config.kind {
        CacheKind::Bounded => Arc::new(BoundedDirectoryCache::new(config)),
        CacheKind::Disabled => Arc::new(NullDirectoryCache),
    }
}

/// Bounded cache backed by Moka (TinyLFU admission, LRU eviction).
pub struct BoundedDirectoryCache {
    cache: Cache<GrainId, CachedAddress>,
}

impl BoundedDirectoryCache {
    /// Create a cache from configuration.
    pub fn new(config: &DirectoryCacheConfig) -> Self {
        let mut builder = Cache::builder().max_capacity(config.max_capacity);
        if let Some(ttl) = config.time_to_live {
            builder = builder.time_to_live(ttl);
        }
        Self {
            cache: builder.build(),
        }
    }

    /// Create a cache holding at most `max_capacity` entries.
    pub fn with_capacity(max_capacity: u64) -> Self {
        Self::new(&DirectoryCacheConfig::bounded(max_capacity))
    }
}

impl DirectoryCache for BoundedDirectoryCache {
    fn add_or_update(&self, address: GrainAddress, version_tag: i32) {
        let key = address.grain_id.clone();
        self.cache.insert(
            key,
            CachedAddress {
                address,
                version_tag,
            },
        );
    }

    fn remove(&self, grain: &GrainId) -> bool {
        self.cache.remove(grain).is_some()
    }

    fn remove_address(&self, address: &GrainAddress) -> bool {
        let result = self
            .cache
            .entry_by_ref(&address.grain_id)
            .and_compute_with(|entry| match entry {
                Some(entry) if entry.value().address.matches(address) => Op::Remove,
                _ => Op::Nop,
            });
        matches!(result, moka::ops::compute::CompResult::Removed(_))
    }

    fn lookup(&self, grain: &GrainId) -> Option<CachedAddress> {
        self.cache.get(grain)
    }

    fn entries(&self) -> Vec<CachedAddress> {
        self.cache.iter().map(|(_, v)| v).collect()
    }

    fn len(&self) -> u64 {
        self.cache.iter().count() as u64
    }

    fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks();
    }
}

/// Cache that stores nothing.
pub struct NullDirectoryCache;

impl DirectoryCache for NullDirectoryCache {
    fn add_or_update(&self, _address: GrainAddress, _version_tag: i32) {}

    fn remove(&self, _grain: &GrainId) -> bool {
        false
    }

    fn remove_address(&self, _address: &GrainAddress) -> bool {
        false
    }

    fn lookup(&self, _grain: &GrainId) -> Option<CachedAddress> {
        None
    }

    fn entries(&self) -> Vec<CachedAddress> {
        Vec::new()
    }

    fn len(&self) -> u64 {
        0
    }

    fn clear(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActivationId, GrainType, SiloAddress};

    fn address(key: &str) -> GrainAddress {
        GrainAddress::new(
            GrainId::new(GrainType::new("user"), key),
            ActivationId::new(),
            SiloAddress::new("127.0.0.1:11111".parse().unwrap(), 1),
        )
    }

    #[test]
    fn test_add_lookup_remove() {
        let cache = BoundedDirectoryCache::with_capacity(100);
        let a = address("a");

        cache.add_or_update(a.clone(), 7);
        let hit = cache.lookup(&a.grain_id).unwrap();
        assert_eq!(hit.address, a);
        assert_eq!(hit.version_tag, 7);
        assert_eq!(cache.len(), 1);

        assert!(cache.remove(&a.grain_id));
        assert!(cache.lookup(&a.grain_id).is_none());
        assert!(!cache.remove(&a.grain_id));
    }

    #[test]
    fn test_update_overwrites() {
        let cache = BoundedDirectoryCache::with_capacity(100);
        let a = address("a");
        let mut b = address("a");
        b.grain_id = a.grain_id.clone();

        cache.add_or_update(a.clone(), 1);
        cache.add_or_update(b.clone(), 2);
        assert_eq!(cache.lookup(&a.grain_id).unwrap().address, b);
    }

    #[test]
    fn test_remove_address_only_when_matching() {
        let cache = BoundedDirectoryCache::with_capacity(100);
        let a = address("a");
        let mut other = address("a");
        other.grain_id = a.grain_id.clone();

        cache.add_or_update(a.clone(), 1);
        assert!(!cache.remove_address(&other));
        assert!(cache.lookup(&a.grain_id).is_some());

        assert!(cache.remove_address(&a));
        assert!(cache.lookup(&a.grain_id).is_none());
    }

    #[test]
    fn test_entries_and_clear() {
        let cache = BoundedDirectoryCache::with_capacity(100);
        cache.add_or_update(address("a"), 1);
        cache.add_or_update(address("b"), 2);
        assert_eq!(cache.entries().len(), 2);

        cache.clear();
        assert!(cache.entries().is_empty());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_null_cache_stores_nothing() {
        let cache = create_directory_cache(&DirectoryCacheConfig::disabled());
        let a = address("a");
        cache.add_or_update(a.clone(), 1);
        assert!(cache.lookup(&a.grain_id).is_none());
        assert!(cache.is_empty());
    }
}
