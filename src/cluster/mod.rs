//! Cluster membership as seen by the directory.

pub mod events;
pub mod membership;

pub use events::{MembershipOracle, SiloStatus, SiloStatusEvent, SubscriptionId};
pub use membership::StaticMembershipOracle;
