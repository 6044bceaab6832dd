//! Directory partition ownership.
//!
//! The resolver holds the current [`RingMembership`] snapshot behind an
//! [`ArcSwap`] so ownership queries never take a lock. Writers publish a
//! complete new snapshot; readers observe either the old or the new one.

use crate::error::{Error, Result};
use crate::partitioning::ring::{ring_distance, RingMembership, RING_SIZE};
use crate::types::{GrainId, SiloAddress};
use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Computes which silo owns the directory partition for a grain.
#[derive(Debug)]
pub struct OwnershipResolver {
    /// This silo.
    local: SiloAddress,

    /// Primary silo owning the membership table singleton.
    seed: Option<SiloAddress>,

    /// Maximum number of forwards for one request.
    hop_limit: u32,

    /// Current membership snapshot.
    membership: ArcSwap<RingMembership>,

    /// Whether the local silo accepts ownership. Cleared while draining.
    running: AtomicBool,
}

impl OwnershipResolver {
    /// Create a resolver with an empty ring.
    pub fn new(local: SiloAddress, seed: Option<SiloAddress>, hop_limit: u32) -> Self {
        Self {
            local,
            seed,
            hop_limit,
            membership: ArcSwap::from_pointee(RingMembership::empty()),
            running: AtomicBool::new(false),
        }
    }

    /// The local silo.
    pub fn local(&self) -> &SiloAddress {
        &self.local
    }

    /// The configured hop limit.
    pub fn hop_limit(&self) -> u32 {
        self.hop_limit
    }

    /// Whether the local silo currently accepts ownership.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    /// Current membership snapshot.
    pub fn snapshot(&self) -> Arc<RingMembership> {
        self.membership.load_full()
    }

    /// Publish a new membership snapshot.
    ///
    /// Callers serialize publication with the directory's membership lock.
    pub(crate) fn publish(&self, membership: RingMembership) {
        self.membership.store(Arc::new(membership));
    }

    /// Silo owning the directory entry for `grain`.
    ///
    /// `Ok(None)` only happens while the local silo is draining and no other
    /// candidate exists; the caller then acts locally as a last resort.
    pub fn owner_of(&self, grain: &GrainId) -> Result<Option<SiloAddress>> {
        if grain.is_system_target() {
            if grain.grain_type().is_membership_table() && self.seed.is_none() {
                return Err(Error::Config(format!(
                    "development clustering cannot run without a primary silo; \
                     configure a seed address to address {}",
                    grain
                )));
            }
            trace!(local = %self.local, grain = %grain, "System target owned locally");
            return Ok(Some(self.local.clone()));
        }

        let membership = self.membership.load();
        Ok(self.owner_in(&membership, grain))
    }

    /// Owner of an ordinary grain within a given snapshot.
    pub(crate) fn owner_in(&self, membership: &RingMembership, grain: &GrainId) -> Option<SiloAddress> {
        let running = self.is_running();

        if membership.is_empty() {
            return running.then(|| self.local.clone());
        }

        let excluded = (!running).then_some(&self.local);
        let owner = membership
            .owner_of_position(grain.ring_position(), excluded)
            .cloned();

        trace!(
            local = %self.local,
            grain = %grain,
            grain_hash = grain.ring_position(),
            owner = ?owner.as_ref().map(|o| o.to_string()),
            owner_hash = ?owner.as_ref().map(|o| o.ring_position()),
            "Calculated directory partition owner"
        );

        owner
    }

    /// Decide whether a request must be forwarded.
    ///
    /// Returns `Ok(None)` when the operation should run locally, the owner
    /// otherwise, and fails once `hop_count` reaches the hop limit.
    pub fn check_forward(
        &self,
        grain: &GrainId,
        hop_count: u32,
        operation: &str,
    ) -> Result<Option<SiloAddress>> {
        let owner = match self.owner_of(grain)? {
            Some(owner) if owner != self.local => owner,
            _ => return Ok(None),
        };

        if hop_count >= self.hop_limit {
            return Err(Error::HopLimitExceeded {
                operation: operation.to_string(),
                grain: grain.clone(),
                local: self.local.clone(),
                owner,
                hop_count,
            });
        }

        Ok(Some(owner))
    }

    /// Ring neighbor before `silo` in the current snapshot.
    pub fn predecessor(&self, silo: &SiloAddress) -> Option<SiloAddress> {
        self.membership.load().predecessor(silo).cloned()
    }

    /// Ring neighbor after `silo` in the current snapshot.
    pub fn successor(&self, silo: &SiloAddress) -> Option<SiloAddress> {
        self.membership.load().successor(silo).cloned()
    }

    /// Whether `silo` is in the current snapshot.
    pub fn is_member(&self, silo: &SiloAddress) -> bool {
        self.membership.load().contains(silo)
    }

    /// Clockwise distance from the local silo's predecessor to the local silo,
    /// i.e. the size of the key range the local silo owns.
    pub fn owned_range_size(&self) -> u64 {
        match self.predecessor(&self.local) {
            Some(prev) => ring_distance(&prev, &self.local),
            None if self.is_member(&self.local) => RING_SIZE,
            None => 0,
        }
    }
}
