//! Silo status events and the membership oracle seam.

use crate::types::SiloAddress;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Lifecycle status of a silo as seen by the membership oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SiloStatus {
    /// Status unknown.
    None,
    /// Process created, not yet joining.
    Created,
    /// Joining the cluster.
    Joining,
    /// Fully active member.
    Active,
    /// Graceful shutdown started.
    ShuttingDown,
    /// Stopping.
    Stopping,
    /// Declared dead.
    Dead,
}

impl SiloStatus {
    /// Whether the silo is leaving or has left the cluster.
    pub fn is_terminating(&self) -> bool {
        matches!(
            self,
            SiloStatus::ShuttingDown | SiloStatus::Stopping | SiloStatus::Dead
        )
    }
}

/// A status change delivered by the membership oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiloStatusEvent {
    /// The silo whose status changed.
    pub silo: SiloAddress,
    /// Its new status.
    pub status: SiloStatus,
}

impl SiloStatusEvent {
    /// Create a status event.
    pub fn new(silo: SiloAddress, status: SiloStatus) -> Self {
        Self { silo, status }
    }

    /// Whether this event should add the silo to the directory ring.
    pub fn is_join(&self) -> bool {
        self.status == SiloStatus::Active
    }

    /// Whether this event should remove the silo from the directory ring.
    pub fn is_leave(&self) -> bool {
        self.status.is_terminating()
    }
}

/// Handle identifying one subscription to an oracle.
pub type SubscriptionId = u64;

/// Source of silo status changes.
///
/// Subscribers receive events through an unbounded queue so the oracle never
/// blocks on a slow consumer.
pub trait MembershipOracle: Send + Sync + 'static {
    /// Subscribe to status changes.
    fn subscribe(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<SiloStatusEvent>);

    /// Drop a subscription.
    fn unsubscribe(&self, id: SubscriptionId);

    /// Last known status of a silo.
    fn status_of(&self, silo: &SiloAddress) -> SiloStatus;

    /// Every silo currently considered functional, the local one included.
    ///
    /// Subscribers read this after subscribing to learn the members that
    /// joined before them.
    fn functional_silos(&self) -> Vec<SiloAddress>;

    /// Whether a silo is currently considered alive and reachable.
    fn is_functional(&self, silo: &SiloAddress) -> bool {
        let status = self.status_of(silo);
        status != SiloStatus::None && !status.is_terminating()
    }
}
