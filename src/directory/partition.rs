//! Authoritative storage for the key range this silo owns.

use crate::cluster::MembershipOracle;
use crate::types::{ActivationId, AddressAndTag, GrainAddress, GrainId, UnregistrationCause};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Storage of grain → activation registrations owned by the local silo.
pub trait PartitionStore: Send + Sync + 'static {
    /// Register `address` unless another activation already holds the grain.
    ///
    /// Returns the authoritative registration: `address` when it won, the
    /// existing registration otherwise. Replaces the existing registration
    /// only when it matches `previous`.
    fn add_single_activation(
        &self,
        address: GrainAddress,
        previous: Option<&GrainAddress>,
    ) -> AddressAndTag;

    /// Remove the registration for `grain` if it is `activation`.
    ///
    /// Returns whether an entry was removed.
    fn remove_activation(
        &self,
        grain: &GrainId,
        activation: ActivationId,
        cause: UnregistrationCause,
    ) -> bool;

    /// Remove whatever is registered for `grain`.
    fn remove_grain(&self, grain: &GrainId) -> bool;

    /// Current registration for `grain`.
    fn lookup(&self, grain: &GrainId) -> AddressAndTag;

    /// Snapshot of all registrations.
    fn items(&self) -> Vec<GrainAddress>;

    /// Number of registrations.
    fn len(&self) -> usize;

    /// Whether the store is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all registrations.
    fn clear(&self);
}

#[derive(Debug, Clone)]
struct Registration {
    address: GrainAddress,
    version_tag: i32,
    registered_at: Instant,
}

/// In-memory partition store.
pub struct LocalDirectoryPartition {
    /// Registrations by grain.
    entries: RwLock<HashMap<GrainId, Registration>>,

    /// Source of version tags. Tags are positive and increasing.
    next_tag: AtomicI32,

    /// Minimum registration age for `NonexistentActivation` removals.
    lazy_deregistration_delay: Duration,

    /// Used to take over registrations pointing at dead silos.
    oracle: Option<Arc<dyn MembershipOracle>>,
}

impl LocalDirectoryPartition {
    /// Create an empty partition.
    pub fn new(lazy_deregistration_delay: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            next_tag: AtomicI32::new(1),
            lazy_deregistration_delay,
            oracle: None,
        }
    }

    /// Let registrations on non-functional silos be replaced by new ones.
    pub fn with_oracle(mut self, oracle: Arc<dyn MembershipOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Next version tag. Saturates at `i32::MAX` rather than wrapping into
    /// the reserved non-positive values.
    fn next_tag(&self) -> i32 {
        match self
            .next_tag
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |tag| {
                Some(tag.saturating_add(1))
            }) {
            Ok(tag) | Err(tag) => tag,
        }
    }

    fn is_silo_dead(&self, address: &GrainAddress) -> bool {
        self.oracle
            .as_ref()
            .is_some_and(|oracle| oracle.status_of(&address.silo).is_terminating())
    }

    fn ok_to_remove(&self, registration: &Registration, cause: UnregistrationCause) -> bool {
        match cause {
            UnregistrationCause::Force => true,
            UnregistrationCause::NonexistentActivation => {
                !self.lazy_deregistration_delay.is_zero()
                    && registration.registered_at.elapsed() >= self.lazy_deregistration_delay
            }
        }
    }
}

impl PartitionStore for LocalDirectoryPartition {
    fn add_single_activation(
        &self,
        address: GrainAddress,
        previous: Option<&GrainAddress>,
    ) -> AddressAndTag {
        let mut entries = self.entries.write();

        if let Some(existing) = entries.get(&address.grain_id) {
            if existing.address.matches(&address) {
                return AddressAndTag::new(existing.address.clone(), existing.version_tag);
            }

            let replaceable = previous.is_some_and(|p| existing.address.matches(p))
                || self.is_silo_dead(&existing.address);
            if !replaceable {
                trace!(
                    grain = %address.grain_id,
                    winner = %existing.address,
                    loser = %address,
                    "Duplicate activation, existing registration wins"
                );
                return AddressAndTag::new(existing.address.clone(), existing.version_tag);
            }

            debug!(
                grain = %address.grain_id,
                replaced = %existing.address,
                "Replacing registration"
            );
        }

        let version_tag = self.next_tag();
        entries.insert(
            address.grain_id.clone(),
            Registration {
                address: address.clone(),
                version_tag,
                registered_at: Instant::now(),
            },
        );
        AddressAndTag::new(address, version_tag)
    }

    fn remove_activation(
        &self,
        grain: &GrainId,
        activation: ActivationId,
        cause: UnregistrationCause,
    ) -> bool {
        let mut entries = self.entries.write();
        match entries.get(grain) {
            Some(existing)
                if existing.address.activation_id == activation
                    && self.ok_to_remove(existing, cause) =>
            {
                entries.remove(grain);
                true
            }
            _ => false,
        }
    }

    fn remove_grain(&self, grain: &GrainId) -> bool {
        self.entries.write().remove(grain).is_some()
    }

    fn lookup(&self, grain: &GrainId) -> AddressAndTag {
        self.entries
            .read()
            .get(grain)
            .map(|r| AddressAndTag::new(r.address.clone(), r.version_tag))
            .unwrap_or_else(AddressAndTag::none)
    }

    fn items(&self) -> Vec<GrainAddress> {
        self.entries
            .read()
            .values()
            .map(|r| r.address.clone())
            .collect()
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }

    fn clear(&self) {
        self.entries.write().clear();
    }
}
