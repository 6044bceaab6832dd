//! Routes forwarded directory calls to the owning silo.

use crate::directory::GrainDirectory;
use crate::error::{NetworkError, Result};
use crate::types::SiloAddress;
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Resolves a silo to a handle on its directory.
///
/// The handle speaks the same [`GrainDirectory`] interface as the local
/// service, so forwarding code does not care whether the owner is in this
/// process or behind a transport.
pub trait RemoteDirectoryChannel: Send + Sync + 'static {
    /// Directory of `silo`, or [`NetworkError::Unreachable`].
    fn directory(&self, silo: &SiloAddress) -> Result<Arc<dyn GrainDirectory>>;
}

/// Channel between directories hosted in the same process.
///
/// Holds weak references so a dropped service becomes unreachable instead
/// of being kept alive by its peers.
#[derive(Default)]
pub struct InProcessChannel {
    directories: DashMap<SiloAddress, Weak<dyn GrainDirectory>>,
}

impl InProcessChannel {
    /// Create an empty channel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `directory` reachable as `silo`.
    pub fn register<D: GrainDirectory>(&self, silo: SiloAddress, directory: &Arc<D>) {
        let weak = Arc::downgrade(directory);
        let weak: Weak<dyn GrainDirectory> = weak;
        debug!(silo = %silo, "Directory attached to in-process channel");
        self.directories.insert(silo, weak);
    }

    /// Make `silo` unreachable.
    pub fn deregister(&self, silo: &SiloAddress) -> bool {
        self.directories.remove(silo).is_some()
    }

    /// Number of attached directories.
    pub fn len(&self) -> usize {
        self.directories.len()
    }

    /// Whether no directory is attached.
    pub fn is_empty(&self) -> bool {
        self.directories.is_empty()
    }
}

impl RemoteDirectoryChannel for InProcessChannel {
    fn directory(&self, silo: &SiloAddress) -> Result<Arc<dyn GrainDirectory>> {
        self.directories
            .get(silo)
            .and_then(|weak| weak.upgrade())
            .ok_or_else(|| NetworkError::Unreachable(silo.clone()).into())
    }
}
