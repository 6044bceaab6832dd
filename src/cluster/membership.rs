//! In-memory membership oracle.
//!
//! Tracks the last reported status of every silo and fans status changes out
//! to subscribers. Hosts without a failure detector, such as single process
//! clusters, drive it directly.

use crate::cluster::events::{MembershipOracle, SiloStatus, SiloStatusEvent, SubscriptionId};
use crate::types::SiloAddress;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Membership oracle fed by explicit status updates.
pub struct StaticMembershipOracle {
    /// Last known status per silo.
    statuses: RwLock<HashMap<SiloAddress, SiloStatus>>,

    /// Subscriber queues.
    subscribers: RwLock<HashMap<SubscriptionId, mpsc::UnboundedSender<SiloStatusEvent>>>,

    /// Subscription id counter.
    next_id: AtomicU64,
}

impl StaticMembershipOracle {
    /// Create an oracle that knows no silos.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            statuses: RwLock::new(HashMap::new()),
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    /// Create an oracle where all given silos are active.
    pub fn with_active<I: IntoIterator<Item = SiloAddress>>(silos: I) -> Arc<Self> {
        let oracle = Self::new();
        {
            let mut statuses = oracle.statuses.write();
            for silo in silos {
                statuses.insert(silo, SiloStatus::Active);
            }
        }
        oracle
    }

    /// Record a status change and notify subscribers.
    ///
    /// Repeating the current status is a no-op.
    pub fn set_status(&self, silo: SiloAddress, status: SiloStatus) {
        {
            let mut statuses = self.statuses.write();
            if statuses.get(&silo) == Some(&status) {
                return;
            }
            statuses.insert(silo.clone(), status);
        }

        debug!(silo = %silo, ?status, "Silo status updated");
        self.notify(SiloStatusEvent::new(silo, status));
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    fn notify(&self, event: SiloStatusEvent) {
        // Drop subscribers whose receiver is gone.
        self.subscribers
            .write()
            .retain(|_, tx| tx.send(event.clone()).is_ok());
    }
}

impl MembershipOracle for StaticMembershipOracle {
    fn subscribe(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<SiloStatusEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().insert(id, tx);
        (id, rx)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.write().remove(&id);
    }

    fn status_of(&self, silo: &SiloAddress) -> SiloStatus {
        self.statuses
            .read()
            .get(silo)
            .copied()
            .unwrap_or(SiloStatus::None)
    }

    fn functional_silos(&self) -> Vec<SiloAddress> {
        self.statuses
            .read()
            .iter()
            .filter(|(_, status)| **status != SiloStatus::None && !status.is_terminating())
            .map(|(silo, _)| silo.clone())
            .collect()
    }
}
