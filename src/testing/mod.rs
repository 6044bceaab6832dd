//! Testing utilities for the grain directory.
//!
//! [`TestCluster`] hosts several [`DirectoryService`]s in one process. They
//! share a [`StaticMembershipOracle`] and reach each other through a
//! [`RecordingChannel`], which logs every forwarded call so tests can assert
//! on network traffic.
//!
//! # Example
//!
//! ```rust,ignore
//! let cluster = TestCluster::start(&[10, 50, 90], DirectoryConfig::default());
//! let a = cluster.silo(0);
//! a.register(activation(grain_at(60), a.local()), None, 0).await?;
//! assert_eq!(cluster.channel.calls_to(&cluster.address(2)).len(), 1);
//! ```

mod directory_scenarios;
mod membership_tests;
mod utils;

pub use utils::{activation, grain_at, silo_at, wait_for};

use crate::cluster::{SiloStatus, StaticMembershipOracle};
use crate::config::DirectoryConfig;
use crate::directory::{DirectoryService, GrainDirectory};
use crate::error::Result;
use crate::network::{InProcessChannel, RemoteDirectoryChannel};
use crate::types::{AddressAndTag, GrainAddress, GrainId, SiloAddress, UnregistrationCause};
use parking_lot::Mutex;
use std::sync::Arc;

/// First port used by [`TestCluster`] silos.
pub const BASE_PORT: u16 = 11110;

/// One forwarded call seen by a [`RecordingChannel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Silo the call was sent to.
    pub target: SiloAddress,
    /// Operation name.
    pub operation: &'static str,
    /// Hop count carried by the call.
    pub hop_count: u32,
}

/// In-process channel that records every call it carries.
#[derive(Default)]
pub struct RecordingChannel {
    inner: InProcessChannel,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl RecordingChannel {
    /// Create an empty channel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `directory` reachable as its local silo.
    pub fn attach(&self, directory: &Arc<DirectoryService>) {
        self.inner.register(directory.local().clone(), directory);
    }

    /// Make `silo` unreachable.
    pub fn detach(&self, silo: &SiloAddress) {
        self.inner.deregister(silo);
    }

    /// All recorded calls, oldest first.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Calls sent to `silo`.
    pub fn calls_to(&self, silo: &SiloAddress) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.target == *silo)
            .cloned()
            .collect()
    }

    /// Number of recorded calls.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Forget recorded calls.
    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

impl RemoteDirectoryChannel for RecordingChannel {
    fn directory(&self, silo: &SiloAddress) -> Result<Arc<dyn GrainDirectory>> {
        let inner = self.inner.directory(silo)?;
        Ok(Arc::new(RecordingDirectory {
            target: silo.clone(),
            inner,
            calls: self.calls.clone(),
        }))
    }
}

struct RecordingDirectory {
    target: SiloAddress,
    inner: Arc<dyn GrainDirectory>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl RecordingDirectory {
    fn record(&self, operation: &'static str, hop_count: u32) {
        self.calls.lock().push(RecordedCall {
            target: self.target.clone(),
            operation,
            hop_count,
        });
    }
}

#[async_trait::async_trait]
impl GrainDirectory for RecordingDirectory {
    async fn register(
        &self,
        address: GrainAddress,
        previous: Option<GrainAddress>,
        hop_count: u32,
    ) -> Result<AddressAndTag> {
        self.record("register", hop_count);
        self.inner.register(address, previous, hop_count).await
    }

    async fn unregister(
        &self,
        address: GrainAddress,
        cause: UnregistrationCause,
        hop_count: u32,
    ) -> Result<()> {
        self.record("unregister", hop_count);
        self.inner.unregister(address, cause, hop_count).await
    }

    async fn unregister_many(
        &self,
        addresses: Vec<GrainAddress>,
        cause: UnregistrationCause,
        hop_count: u32,
    ) -> Result<()> {
        self.record("unregister_many", hop_count);
        self.inner.unregister_many(addresses, cause, hop_count).await
    }

    async fn lookup(&self, grain: GrainId, hop_count: u32) -> Result<AddressAndTag> {
        self.record("lookup", hop_count);
        self.inner.lookup(grain, hop_count).await
    }

    async fn delete(&self, grain: GrainId, hop_count: u32) -> Result<()> {
        self.record("delete", hop_count);
        self.inner.delete(grain, hop_count).await
    }
}

/// A set of directory services wired together in one process.
pub struct TestCluster {
    /// Shared membership oracle.
    pub oracle: Arc<StaticMembershipOracle>,

    /// Shared channel.
    pub channel: Arc<RecordingChannel>,

    /// Services, in the order of the hashes they were created with.
    pub silos: Vec<Arc<DirectoryService>>,
}

impl TestCluster {
    /// Start one silo per ring hash. Every silo learns the others from the
    /// shared oracle when it starts.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(hashes: &[u32], config: DirectoryConfig) -> Self {
        let addresses: Vec<SiloAddress> = hashes
            .iter()
            .enumerate()
            .map(|(i, &hash)| silo_at(BASE_PORT + i as u16, hash))
            .collect();

        let oracle = StaticMembershipOracle::with_active(addresses.iter().cloned());
        let channel = Arc::new(RecordingChannel::new());

        let silos: Vec<Arc<DirectoryService>> = addresses
            .iter()
            .map(|address| {
                let service = DirectoryService::builder(address.clone(), config.clone())
                    .with_oracle(oracle.clone())
                    .with_channel(channel.clone())
                    .build()
                    .unwrap();
                channel.attach(&service);
                service.start();
                service
            })
            .collect();

        Self {
            oracle,
            channel,
            silos,
        }
    }

    /// Service `i`.
    pub fn silo(&self, i: usize) -> &Arc<DirectoryService> {
        &self.silos[i]
    }

    /// Address of silo `i`.
    pub fn address(&self, i: usize) -> SiloAddress {
        self.silos[i].local().clone()
    }

    /// Declare silo `i` dead and remove it from every other silo's ring.
    pub fn kill(&self, i: usize) {
        let dead = self.address(i);
        self.oracle.set_status(dead.clone(), SiloStatus::Dead);
        self.channel.detach(&dead);
        for (j, service) in self.silos.iter().enumerate() {
            if j != i {
                service.remove_silo(&dead, SiloStatus::Dead);
            }
        }
    }

    /// Stop every service.
    pub async fn shutdown(&self) {
        for service in &self.silos {
            service.stop().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cluster_rings_agree() {
        let cluster = TestCluster::start(&[10, 50, 90], DirectoryConfig::default());

        for service in &cluster.silos {
            let ring = service.membership_snapshot();
            assert_eq!(ring.len(), 3);
            assert_eq!(
                ring.silos().iter().map(|s| s.consistent_hash()).collect::<Vec<_>>(),
                vec![10, 50, 90]
            );
        }
        cluster.shutdown().await;
    }

    #[tokio::test]
    async fn test_recording_channel() {
        let cluster = TestCluster::start(&[10, 50], DirectoryConfig::default());
        let a = cluster.silo(0);

        a.lookup(grain_at(40), 0).await.unwrap();

        assert_eq!(
            cluster.channel.calls(),
            vec![RecordedCall {
                target: cluster.address(1),
                operation: "lookup",
                hop_count: 1,
            }]
        );

        cluster.channel.clear();
        assert_eq!(cluster.channel.call_count(), 0);
    }
}
