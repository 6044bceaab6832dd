use crate::types::{ActivationId, GrainAddress, GrainId, GrainType, SiloAddress};
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// Loopback silo at `port` with a fixed ring position.
pub fn silo_at(port: u16, hash: u32) -> SiloAddress {
    SiloAddress::with_consistent_hash(format!("127.0.0.1:{}", port).parse().unwrap(), 1, hash)
}

/// Ordinary grain with a fixed ring position.
pub fn grain_at(hash: u32) -> GrainId {
    GrainId::with_uniform_hash(GrainType::new("test.grain"), format!("g{}", hash), hash)
}

/// Fresh activation of `grain` on `silo`.
pub fn activation(grain: GrainId, silo: &SiloAddress) -> GrainAddress {
    GrainAddress::new(grain, ActivationId::new(), silo.clone())
}

/// Wait for a condition with timeout
pub async fn wait_for<F>(condition: F, timeout: Duration, check_interval: Duration) -> bool
where
    F: Fn() -> bool,
{
    let start = Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        sleep(check_interval).await;
    }
    false
}
