//! The distributed grain directory.
//!
//! Each silo runs a [`DirectoryService`] that owns the entries for its arc of
//! the hash ring ([`partition`]), caches locations learned from other owners
//! ([`cache`]), and forwards requests for keys it does not own.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                      DirectoryService                      │
//! │                                                            │
//! │  caller ──▶ OwnershipResolver ──┬── local ──▶ PartitionStore
//! │              (ring snapshot)    │                          │
//! │                                 └── remote ─▶ RemoteDirectoryChannel
//! │                                              (hop + 1)     │
//! │                                                            │
//! │  MembershipOracle ──▶ event loop ──▶ add/remove silo       │
//! │                                      (ring swap, evictions)│
//! └────────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod collaborators;
mod membership;
pub mod partition;
pub mod service;

pub use cache::{
    create_directory_cache, BoundedDirectoryCache, CachedAddress, DirectoryCache,
    NullDirectoryCache,
};
pub use collaborators::{Catalog, HandoffManager, NoopCatalog, NoopHandoffManager};
pub use partition::{LocalDirectoryPartition, PartitionStore};
pub use service::{DirectoryService, DirectoryServiceBuilder, GrainDirectory};
