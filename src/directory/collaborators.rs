//! Hooks the directory notifies during membership changes.

use crate::cluster::SiloStatus;
use crate::error::Result;
use crate::partitioning::RingMembership;
use crate::types::SiloAddress;

/// Moves directory partitions between silos when membership changes.
///
/// Called from inside the membership critical section, so implementations
/// must only schedule work and return.
pub trait HandoffManager: Send + Sync + 'static {
    /// A silo joined the directory ring.
    fn on_member_added(&self, silo: &SiloAddress);
}

/// Activation catalog told about silos leaving the cluster.
pub trait Catalog: Send + Sync + 'static {
    /// A silo is leaving. `membership` is the ring before the removal, so
    /// the catalog can still tell whether `silo` was a member.
    ///
    /// Errors are logged by the directory and never abort the removal.
    fn on_silo_status_change(
        &self,
        membership: &RingMembership,
        silo: &SiloAddress,
        status: SiloStatus,
    ) -> Result<()>;
}

/// Handoff manager that does nothing.
pub struct NoopHandoffManager;

impl HandoffManager for NoopHandoffManager {
    fn on_member_added(&self, _silo: &SiloAddress) {}
}

/// Catalog that does nothing.
pub struct NoopCatalog;

impl Catalog for NoopCatalog {
    fn on_silo_status_change(
        &self,
        _membership: &RingMembership,
        _silo: &SiloAddress,
        _status: SiloStatus,
    ) -> Result<()> {
        Ok(())
    }
}
