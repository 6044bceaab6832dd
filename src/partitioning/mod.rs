//! Directory partitioning across the silos of a cluster.
//!
//! Silos sit on a 32-bit hash ring at their consistent hash. A grain's
//! directory entry belongs to the first silo at or after the grain's uniform
//! hash, wrapping around past the highest member:
//!
//! ```text
//!            S(10)        S(50)           S(90)
//!   ──────────●────────────●───────────────●──────────▶ hash
//!        ▲         g(40) ──┘     g(60) ────┘    g(95) ─┐
//!        └─────────────────────────────────────────────┘  wraps to S(10)
//! ```
//!
//! [`RingMembership`] is an immutable snapshot of the ring.
//! [`OwnershipResolver`] holds the current snapshot and answers ownership
//! queries without locking.

pub mod ownership;
pub mod ring;

pub use ownership::OwnershipResolver;
pub use ring::{ring_distance, RingMembership, RING_SIZE};
