//! Directory metrics.
//!
//! Every directory operation is counted four ways: calls issued, calls served
//! by the local partition, calls forwarded to the owner, and forwarded calls
//! received from other silos. Cache lookups and membership changes have their
//! own counters.
//!
//! ```rust,ignore
//! let snapshot = directory.stats().metrics;
//! println!("lookups served locally: {}", snapshot.lookups.local);
//! ```

mod counters;

pub use counters::{Counter, OperationCounters, OperationSnapshot};

/// Counters for one directory service.
#[derive(Debug)]
pub struct DirectoryMetrics {
    /// Register calls.
    pub registrations: OperationCounters,
    /// Single unregister calls.
    pub unregistrations: OperationCounters,
    /// Batch unregister calls.
    pub unregistrations_many: OperationCounters,
    /// Lookup calls.
    pub lookups: OperationCounters,
    /// Delete calls.
    pub deletes: OperationCounters,

    /// Local lookups that found a partition entry.
    pub lookups_local_successes: Counter,
    /// Cache lookups attempted.
    pub cache_lookups: Counter,
    /// Cache lookups that returned a valid entry.
    pub cache_hits: Counter,

    /// Silos added to the ring.
    pub silos_added: Counter,
    /// Silos removed from the ring.
    pub silos_removed: Counter,
    /// Entries evicted from the partition by membership changes.
    pub partition_evictions: Counter,
    /// Entries evicted from the cache by membership changes.
    pub cache_evictions: Counter,
}

impl DirectoryMetrics {
    /// Create a new metrics instance.
    pub fn new() -> Self {
        Self {
            registrations: OperationCounters::new(
                "directory_registrations_issued",
                "directory_registrations_local",
                "directory_registrations_remote_sent",
                "directory_registrations_remote_received",
            ),
            unregistrations: OperationCounters::new(
                "directory_unregistrations_issued",
                "directory_unregistrations_local",
                "directory_unregistrations_remote_sent",
                "directory_unregistrations_remote_received",
            ),
            unregistrations_many: OperationCounters::new(
                "directory_unregistrations_many_issued",
                "directory_unregistrations_many_local",
                "directory_unregistrations_many_remote_sent",
                "directory_unregistrations_many_remote_received",
            ),
            lookups: OperationCounters::new(
                "directory_lookups_issued",
                "directory_lookups_local",
                "directory_lookups_remote_sent",
                "directory_lookups_remote_received",
            ),
            deletes: OperationCounters::new(
                "directory_deletes_issued",
                "directory_deletes_local",
                "directory_deletes_remote_sent",
                "directory_deletes_remote_received",
            ),
            lookups_local_successes: Counter::new(
                "directory_lookups_local_successes",
                "Local lookups that found an entry",
            ),
            cache_lookups: Counter::new("directory_cache_lookups", "Cache lookups attempted"),
            cache_hits: Counter::new("directory_cache_hits", "Cache lookups that hit"),
            silos_added: Counter::new("directory_silos_added", "Silos added to the ring"),
            silos_removed: Counter::new("directory_silos_removed", "Silos removed from the ring"),
            partition_evictions: Counter::new(
                "directory_partition_evictions",
                "Partition entries evicted on membership change",
            ),
            cache_evictions: Counter::new(
                "directory_cache_evictions",
                "Cache entries evicted on membership change",
            ),
        }
    }

    /// Record a cache lookup.
    pub fn record_cache_lookup(&self, hit: bool) {
        self.cache_lookups.inc();
        if hit {
            self.cache_hits.inc();
        }
    }

    /// Get a snapshot of current metrics.
    pub fn snapshot(&self) -> DirectoryMetricsSnapshot {
        DirectoryMetricsSnapshot {
            registrations: self.registrations.snapshot(),
            unregistrations: self.unregistrations.snapshot(),
            unregistrations_many: self.unregistrations_many.snapshot(),
            lookups: self.lookups.snapshot(),
            deletes: self.deletes.snapshot(),
            lookups_local_successes: self.lookups_local_successes.get(),
            cache_lookups: self.cache_lookups.get(),
            cache_hits: self.cache_hits.get(),
            silos_added: self.silos_added.get(),
            silos_removed: self.silos_removed.get(),
            partition_evictions: self.partition_evictions.get(),
            cache_evictions: self.cache_evictions.get(),
        }
    }
}

impl Default for DirectoryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A snapshot of directory metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryMetricsSnapshot {
    pub registrations: OperationSnapshot,
    pub unregistrations: OperationSnapshot,
    pub unregistrations_many: OperationSnapshot,
    pub lookups: OperationSnapshot,
    pub deletes: OperationSnapshot,
    pub lookups_local_successes: u64,
    pub cache_lookups: u64,
    pub cache_hits: u64,
    pub silos_added: u64,
    pub silos_removed: u64,
    pub partition_evictions: u64,
    pub cache_evictions: u64,
}

impl DirectoryMetricsSnapshot {
    /// Fraction of cache lookups that hit.
    pub fn cache_hit_rate(&self) -> f64 {
        if self.cache_lookups == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.cache_lookups as f64
        }
    }
}

/// Point-in-time view of one directory service.
#[derive(Debug, Clone)]
pub struct DirectoryStats {
    /// Entries in the local partition.
    pub partition_size: usize,
    /// Entries in the local cache.
    pub cache_size: u64,
    /// Silos in the directory ring.
    pub ring_size: usize,
    /// Clockwise ring distance from this silo to its successor.
    pub ring_distance_to_successor: u64,
    /// Share of the hash space this silo owns, in percent.
    pub ring_percentage: f64,
    /// Share each silo would own on a perfectly balanced ring, in percent.
    pub average_ring_percentage: f64,
    /// Operation counters.
    pub metrics: DirectoryMetricsSnapshot,
}
