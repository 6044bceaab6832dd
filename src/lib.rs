//! Distributed grain directory partitioned by consistent hashing.
//!
//! Every silo in a cluster owns a contiguous range of a 32-bit hash ring and
//! keeps the authoritative location of the grain activations whose ids hash
//! into that range. This crate provides one silo's share of that directory:
//! - **Ring ownership** from an immutable membership snapshot, swapped
//!   atomically on every membership change
//! - **Hop-limited forwarding** of operations to the owning silo
//! - **Membership adjustment** that drops entries invalidated by silo
//!   departures and restarts
//! - **Local cache** of remote answers, backed by Moka
//!
//! # Example
//!
//! ```rust,no_run
//! use grain_directory::cluster::StaticMembershipOracle;
//! use grain_directory::network::InProcessChannel;
//! use grain_directory::types::{ActivationId, GrainAddress, GrainId, GrainType, SiloAddress};
//! use grain_directory::{DirectoryConfig, DirectoryService, GrainDirectory};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let local = SiloAddress::new("127.0.0.1:11111".parse()?, 1);
//!     let oracle = StaticMembershipOracle::with_active([local.clone()]);
//!     let channel = Arc::new(InProcessChannel::new());
//!
//!     let directory = DirectoryService::builder(local.clone(), DirectoryConfig::default())
//!         .with_oracle(oracle)
//!         .with_channel(channel.clone())
//!         .build()?;
//!     channel.register(local.clone(), &directory);
//!     directory.start();
//!
//!     // Register an activation; the owner answers with the winning one.
//!     let grain = GrainId::new(GrainType::new("user"), "42");
//!     let address = GrainAddress::new(grain.clone(), ActivationId::new(), local);
//!     let registered = directory.register(address, None, 0).await?;
//!
//!     // Lookups are forwarded to the owner unless answered locally.
//!     let found = directory.lookup(grain, 0).await?;
//!     assert_eq!(found, registered);
//!
//!     directory.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               Silo runtime                   │
//! └─────────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────────┐
//! │            GrainDirectory API               │
//! │  • register / unregister / unregister_many  │
//! │  • lookup / delete                          │
//! └─────────────────────────────────────────────┘
//!                     │
//!     ┌───────────────┼───────────────┐
//!     ▼               ▼               ▼
//! ┌─────────┐   ┌──────────┐   ┌─────────┐
//! │  Ring   │   │Partition │   │  Moka   │
//! │Ownership│   │  Store   │   │ Cache   │
//! └─────────┘   └──────────┘   └─────────┘
//!     ▲
//!     │ silo status events
//! ┌─────────┐
//! │ Oracle  │
//! └─────────┘
//! ```
//!
//! # Consistency Model
//!
//! - **Owner**: the partition of the owning silo is authoritative
//! - **Cache**: may be stale, served with version tag `0`
//! - **Membership**: silos may briefly disagree on the ring; forwarding is
//!   bounded by the hop limit

pub mod cluster;
pub mod config;
pub mod directory;
pub mod error;
pub mod metrics;
pub mod network;
pub mod partitioning;
pub mod testing;
pub mod types;

// Re-export main types for convenience
pub use config::{CacheKind, DirectoryCacheConfig, DirectoryConfig};
pub use directory::{DirectoryService, DirectoryServiceBuilder, GrainDirectory};
pub use error::{Error, NetworkError, Result};
pub use types::{
    ActivationId, AddressAndTag, GrainAddress, GrainId, GrainType, SiloAddress,
    UnregistrationCause,
};

// Re-export cluster types
pub use cluster::{MembershipOracle, SiloStatus, SiloStatusEvent, StaticMembershipOracle};

// Re-export partitioning types
pub use partitioning::{OwnershipResolver, RingMembership};

// Re-export metrics types
pub use metrics::{Counter, DirectoryMetrics, DirectoryMetricsSnapshot, DirectoryStats};

// Re-export testing types
pub use testing::{RecordedCall, RecordingChannel, TestCluster};
