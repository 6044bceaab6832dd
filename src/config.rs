//! Configuration types for the grain directory.

use crate::error::{Error, Result};
use crate::types::SiloAddress;
use std::time::Duration;

/// Default maximum number of forwards for one request.
pub const DEFAULT_HOP_LIMIT: u32 = 6;

/// Default pause before re-resolving ownership on a non-initial hop.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Main configuration for a directory service.
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    /// Maximum number of times a request may be forwarded.
    pub hop_limit: u32,

    /// Pause between forwards to let the membership settle.
    pub retry_delay: Duration,

    /// Minimum age of a registration before a `NonexistentActivation`
    /// unregistration may remove it. Zero disables such removals.
    pub lazy_deregistration_delay: Duration,

    /// Primary silo owning the membership table singleton.
    pub seed: Option<SiloAddress>,

    /// Directory cache configuration.
    pub cache: DirectoryCacheConfig,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            hop_limit: DEFAULT_HOP_LIMIT,
            retry_delay: DEFAULT_RETRY_DELAY,
            lazy_deregistration_delay: Duration::from_secs(60),
            seed: None,
            cache: DirectoryCacheConfig::default(),
        }
    }
}

impl DirectoryConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the hop limit.
    pub fn with_hop_limit(mut self, hop_limit: u32) -> Self {
        self.hop_limit = hop_limit;
        self
    }

    /// Set the retry delay.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set the lazy deregistration delay.
    pub fn with_lazy_deregistration_delay(mut self, delay: Duration) -> Self {
        self.lazy_deregistration_delay = delay;
        self
    }

    /// Set the seed (primary) silo.
    pub fn with_seed(mut self, seed: SiloAddress) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the cache configuration.
    pub fn with_cache(mut self, cache: DirectoryCacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Check the configuration for values the directory cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.hop_limit == 0 {
            return Err(Error::Config("hop_limit must be at least 1".into()));
        }
        if self.cache.kind == CacheKind::Bounded && self.cache.max_capacity == 0 {
            return Err(Error::Config(
                "bounded directory cache needs a non-zero max_capacity".into(),
            ));
        }
        Ok(())
    }
}

/// Which directory cache implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    /// Bounded cache with TinyLFU eviction.
    Bounded,

    /// No caching; every lookup goes to the owner.
    Disabled,
}

/// Directory cache configuration.
#[derive(Debug, Clone)]
pub struct DirectoryCacheConfig {
    /// Cache implementation.
    pub kind: CacheKind,

    /// Maximum number of cached entries.
    pub max_capacity: u64,

    /// Optional time-to-live for cached entries.
    pub time_to_live: Option<Duration>,
}

impl Default for DirectoryCacheConfig {
    fn default() -> Self {
        Self {
            kind: CacheKind::Bounded,
            max_capacity: 1_000_000,
            time_to_live: None,
        }
    }
}

impl DirectoryCacheConfig {
    /// A bounded cache with the given capacity.
    pub fn bounded(max_capacity: u64) -> Self {
        Self {
            kind: CacheKind::Bounded,
            max_capacity,
            time_to_live: None,
        }
    }

    /// A disabled cache.
    pub fn disabled() -> Self {
        Self {
            kind: CacheKind::Disabled,
            ..Default::default()
        }
    }

    /// Set the time-to-live for cached entries.
    pub fn with_time_to_live(mut self, ttl: Duration) -> Self {
        self.time_to_live = Some(ttl);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DirectoryConfig::default();
        assert_eq!(config.hop_limit, 6);
        assert_eq!(config.retry_delay, Duration::from_millis(200));
        assert!(config.seed.is_none());
        assert_eq!(config.cache.kind, CacheKind::Bounded);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = DirectoryConfig::new()
            .with_hop_limit(3)
            .with_retry_delay(Duration::from_millis(5))
            .with_cache(DirectoryCacheConfig::bounded(10).with_time_to_live(Duration::from_secs(1)));

        assert_eq!(config.hop_limit, 3);
        assert_eq!(config.retry_delay, Duration::from_millis(5));
        assert_eq!(config.cache.max_capacity, 10);
        assert_eq!(config.cache.time_to_live, Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let config = DirectoryConfig::new().with_hop_limit(0);
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = DirectoryConfig::new().with_cache(DirectoryCacheConfig::bounded(0));
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = DirectoryConfig::new().with_cache(DirectoryCacheConfig {
            max_capacity: 0,
            ..DirectoryCacheConfig::disabled()
        });
        assert!(config.validate().is_ok());
    }
}
