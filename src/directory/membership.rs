//! Ring maintenance on membership change.
//!
//! Adding or removing a silo publishes a new ring snapshot and then drops
//! partition and cache entries the new ring makes stale. Both steps run
//! under the membership lock, so no two changes interleave. Readers keep
//! resolving against whichever snapshot they loaded.

use crate::cluster::{SiloStatus, SiloStatusEvent};
use crate::directory::service::DirectoryService;
use crate::types::{GrainAddress, SiloAddress, UnregistrationCause};
use tracing::{debug, error, trace};

impl DirectoryService {
    /// Apply a status change reported by the membership oracle.
    ///
    /// Changes to the local silo and intermediate statuses are ignored.
    pub fn handle_status_change(&self, event: &SiloStatusEvent) {
        if event.silo == self.local {
            return;
        }

        if event.is_leave() {
            self.remove_silo(&event.silo, event.status);
        } else if event.is_join() {
            self.add_silo(&event.silo);
        } else {
            trace!(local = %self.local, silo = %event.silo, status = ?event.status, "Ignoring status change");
        }
    }

    /// Add `silo` to the ring. Returns false if it was already there.
    pub fn add_silo(&self, silo: &SiloAddress) -> bool {
        let _guard = self.membership_lock.lock();

        let Some(next) = self.resolver.snapshot().with_silo(silo) else {
            return false;
        };
        let ring_size = next.len();
        self.resolver.publish(next);

        self.handoff.on_member_added(silo);
        self.adjust_partition(silo, false);
        self.adjust_cache(silo, false);

        self.metrics.silos_added.inc();
        debug!(local = %self.local, silo = %silo, ring_size, "Silo added to directory ring");
        true
    }

    /// Remove `silo` from the ring. Returns false if it was not there.
    ///
    /// The catalog is told first, against the ring that still contains
    /// `silo`, and outside the membership lock.
    pub fn remove_silo(&self, silo: &SiloAddress, status: SiloStatus) -> bool {
        let before = self.resolver.snapshot();
        if let Err(e) = self.catalog.on_silo_status_change(&before, silo, status) {
            error!(local = %self.local, silo = %silo, error = %e, "Catalog failed to process silo status change");
        }

        let _guard = self.membership_lock.lock();

        let Some(next) = self.resolver.snapshot().without_silo(silo) else {
            return false;
        };
        let ring_size = next.len();
        self.resolver.publish(next);

        self.adjust_partition(silo, true);
        self.adjust_cache(silo, true);

        self.metrics.silos_removed.inc();
        debug!(local = %self.local, silo = %silo, ?status, ring_size, "Silo removed from directory ring");
        true
    }

    /// Drop registrations on `changed` (when it died) or on an older
    /// incarnation of it.
    fn adjust_partition(&self, changed: &SiloAddress, dead: bool) {
        let stale: Vec<GrainAddress> = self
            .partition
            .items()
            .into_iter()
            .filter(|address| is_stale(&address.silo, changed, dead))
            .collect();

        let mut evicted = 0;
        for address in &stale {
            if self.partition.remove_activation(
                &address.grain_id,
                address.activation_id,
                UnregistrationCause::Force,
            ) {
                evicted += 1;
            }
        }

        if evicted > 0 {
            self.metrics.partition_evictions.inc_by(evicted);
            debug!(local = %self.local, silo = %changed, dead, evicted, "Evicted partition entries");
        }
    }

    /// Drop cache entries that now belong to our own partition, and those
    /// pointing at `changed` (when it died) or an older incarnation of it.
    ///
    /// Entries for grains whose owner moved to an unaffected silo stay; the
    /// next remote call revalidates them.
    fn adjust_cache(&self, changed: &SiloAddress, dead: bool) {
        let mut evicted = 0;
        for entry in self.cache.entries() {
            let address = &entry.address;
            let owned_here = matches!(
                self.resolver.owner_of(&address.grain_id),
                Ok(Some(owner)) if owner == self.local
            );

            if (owned_here || is_stale(&address.silo, changed, dead))
                && self.cache.remove(&address.grain_id)
            {
                evicted += 1;
            }
        }

        if evicted > 0 {
            self.metrics.cache_evictions.inc_by(evicted);
            debug!(local = %self.local, silo = %changed, dead, evicted, "Evicted cache entries");
        }
    }
}

fn is_stale(silo: &SiloAddress, changed: &SiloAddress, dead: bool) -> bool {
    (dead && silo == changed) || silo.is_predecessor_of(changed)
}
