//! End-to-end directory scenarios.
//!
//! Each test builds a [`TestCluster`](super::TestCluster) with fixed ring
//! positions so the owner of every grain is known up front:
//! - single silo registration and lookup
//! - ownership moving on silo removal, with cache eviction
//! - forwarding to the owner and serving the result from cache
//! - hop limit exhaustion between disagreeing silos
//! - batch unregistration split by owner
