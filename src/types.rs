//! Core types used throughout the grain directory.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;
use twox_hash::XxHash64;
use uuid::Uuid;

/// Hash bytes with xxHash64 and fold the result to 32 bits.
fn hash32(parts: &[&[u8]]) -> u32 {
    let mut hasher = XxHash64::with_seed(0);
    for part in parts {
        hasher.write(part);
    }
    let h = hasher.finish();
    (h ^ (h >> 32)) as u32
}

/// Identity of a silo (cluster node).
///
/// A silo is identified by its endpoint and a generation number that changes
/// every time a process is (re)started on that endpoint. The consistent hash
/// places the silo on the directory ring and is computed once at creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiloAddress {
    endpoint: SocketAddr,
    generation: i32,
    consistent_hash: u32,
}

impl SiloAddress {
    /// Create a silo address, deriving its consistent hash from its identity.
    pub fn new(endpoint: SocketAddr, generation: i32) -> Self {
        let consistent_hash = hash32(&[
            endpoint.to_string().as_bytes(),
            &generation.to_le_bytes(),
        ]);
        Self {
            endpoint,
            generation,
            consistent_hash,
        }
    }

    /// Create a silo address with an explicit ring position.
    ///
    /// Useful to lay out a ring deterministically in simulations and tests.
    pub fn with_consistent_hash(endpoint: SocketAddr, generation: i32, hash: u32) -> Self {
        Self {
            endpoint,
            generation,
            consistent_hash: hash,
        }
    }

    /// The silo's endpoint.
    pub fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    /// The silo's generation.
    pub fn generation(&self) -> i32 {
        self.generation
    }

    /// Raw 32-bit consistent hash.
    pub fn consistent_hash(&self) -> u32 {
        self.consistent_hash
    }

    /// Ring position: the consistent hash reinterpreted as a signed value.
    pub fn ring_position(&self) -> i32 {
        self.consistent_hash as i32
    }

    /// Whether this address is an earlier incarnation of `other`.
    pub fn is_predecessor_of(&self, other: &SiloAddress) -> bool {
        self.endpoint == other.endpoint && self.generation < other.generation
    }
}

impl PartialEq for SiloAddress {
    fn eq(&self, other: &Self) -> bool {
        self.endpoint == other.endpoint && self.generation == other.generation
    }
}

impl Eq for SiloAddress {}

impl Hash for SiloAddress {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.endpoint.hash(state);
        self.generation.hash(state);
    }
}

impl PartialOrd for SiloAddress {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SiloAddress {
    fn cmp(&self, other: &Self) -> Ordering {
        self.endpoint
            .cmp(&other.endpoint)
            .then(self.generation.cmp(&other.generation))
    }
}

impl fmt::Display for SiloAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}:{}", self.endpoint, self.generation)
    }
}

/// Type tag of a grain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GrainType(SmolStr);

impl GrainType {
    /// Prefix shared by all system target types.
    pub const SYSTEM_TARGET_PREFIX: &'static str = "sys.svc.";

    /// Type name of the membership table singleton.
    pub const MEMBERSHIP_TABLE: &'static str = "sys.svc.membership-table";

    /// Create an ordinary grain type.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(SmolStr::new(name))
    }

    /// Create a system target type.
    pub fn system_target(name: impl AsRef<str>) -> Self {
        let name = name.as_ref();
        if name.starts_with(Self::SYSTEM_TARGET_PREFIX) {
            Self(SmolStr::new(name))
        } else {
            Self(SmolStr::new(format!("{}{}", Self::SYSTEM_TARGET_PREFIX, name)))
        }
    }

    /// The membership table singleton type.
    pub fn membership_table() -> Self {
        Self(SmolStr::new(Self::MEMBERSHIP_TABLE))
    }

    /// Type name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether grains of this type are system targets.
    pub fn is_system_target(&self) -> bool {
        self.0.starts_with(Self::SYSTEM_TARGET_PREFIX)
    }

    /// Whether this is the membership table singleton type.
    pub fn is_membership_table(&self) -> bool {
        self.0 == Self::MEMBERSHIP_TABLE
    }
}

impl fmt::Display for GrainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Logical identity of a grain.
///
/// The uniform hash locates the grain on the directory ring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrainId {
    grain_type: GrainType,
    key: SmolStr,
    uniform_hash: u32,
}

impl GrainId {
    /// Create a grain id, deriving its uniform hash from type and key.
    pub fn new(grain_type: GrainType, key: impl AsRef<str>) -> Self {
        let key = SmolStr::new(key);
        let uniform_hash = hash32(&[grain_type.as_str().as_bytes(), b"/", key.as_bytes()]);
        Self {
            grain_type,
            key,
            uniform_hash,
        }
    }

    /// Create a grain id with an explicit uniform hash.
    pub fn with_uniform_hash(grain_type: GrainType, key: impl AsRef<str>, hash: u32) -> Self {
        Self {
            grain_type,
            key: SmolStr::new(key),
            uniform_hash: hash,
        }
    }

    /// Grain type.
    pub fn grain_type(&self) -> &GrainType {
        &self.grain_type
    }

    /// Grain key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Raw 32-bit uniform hash.
    pub fn uniform_hash(&self) -> u32 {
        self.uniform_hash
    }

    /// Ring position: the uniform hash reinterpreted as a signed value.
    pub fn ring_position(&self) -> i32 {
        self.uniform_hash as i32
    }

    /// Whether this grain is a system target.
    pub fn is_system_target(&self) -> bool {
        self.grain_type.is_system_target()
    }
}

impl PartialEq for GrainId {
    fn eq(&self, other: &Self) -> bool {
        self.grain_type == other.grain_type && self.key == other.key
    }
}

impl Eq for GrainId {}

impl Hash for GrainId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.grain_type.hash(state);
        self.key.hash(state);
    }
}

impl fmt::Display for GrainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.grain_type, self.key)
    }
}

/// Identity of one incarnation of a grain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActivationId(Uuid);

impl ActivationId {
    /// Generate a fresh activation id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The unspecified activation id.
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Whether this is the unspecified activation id.
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl fmt::Display for ActivationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0.simple())
    }
}

/// Location of one live activation of a grain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GrainAddress {
    /// The grain.
    pub grain_id: GrainId,
    /// The incarnation.
    pub activation_id: ActivationId,
    /// The silo hosting the activation.
    pub silo: SiloAddress,
}

impl GrainAddress {
    /// Create a grain address.
    pub fn new(grain_id: GrainId, activation_id: ActivationId, silo: SiloAddress) -> Self {
        Self {
            grain_id,
            activation_id,
            silo,
        }
    }

    /// Whether both addresses name the same activation of the same grain.
    pub fn matches(&self, other: &GrainAddress) -> bool {
        self.grain_id == other.grain_id && self.activation_id == other.activation_id
    }
}

impl fmt::Display for GrainAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} {} {}]", self.silo, self.grain_id, self.activation_id)
    }
}

/// A grain address (or none) plus the version tag it was read at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressAndTag {
    /// The registered address, if any.
    pub address: Option<GrainAddress>,
    /// Version tag used for cache staleness comparison.
    pub version_tag: i32,
}

impl AddressAndTag {
    /// Tag value denoting "no such entry".
    pub const NO_ETAG: i32 = -1;

    /// Tag reported for results served from the local cache.
    pub const CACHED: i32 = 0;

    /// Create a found result.
    pub fn new(address: GrainAddress, version_tag: i32) -> Self {
        Self {
            address: Some(address),
            version_tag,
        }
    }

    /// The "not found" result.
    pub fn none() -> Self {
        Self {
            address: None,
            version_tag: Self::NO_ETAG,
        }
    }

    /// Whether an address was found.
    pub fn is_found(&self) -> bool {
        self.address.is_some()
    }
}

/// Why an activation is being unregistered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnregistrationCause {
    /// Remove the matching registration unconditionally.
    Force,

    /// A message hit a silo that no longer hosts the activation.
    ///
    /// Only registrations older than the lazy deregistration delay are removed.
    NonexistentActivation,
}

impl fmt::Display for UnregistrationCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnregistrationCause::Force => f.write_str("force"),
            UnregistrationCause::NonexistentActivation => f.write_str("nonexistent-activation"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(port: u16) -> SocketAddr {
        format!("10.0.0.1:{}", port).parse().unwrap()
    }

    #[test]
    fn test_silo_hash_is_deterministic() {
        let a = SiloAddress::new(endpoint(11111), 7);
        let b = SiloAddress::new(endpoint(11111), 7);
        let c = SiloAddress::new(endpoint(11111), 8);
        assert_eq!(a.consistent_hash(), b.consistent_hash());
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_silo_equality_ignores_explicit_hash() {
        let a = SiloAddress::with_consistent_hash(endpoint(1), 1, 10);
        let b = SiloAddress::with_consistent_hash(endpoint(1), 1, 20);
        assert_eq!(a, b);
    }

    #[test]
    fn test_predecessor_is_older_incarnation() {
        let old = SiloAddress::new(endpoint(11111), 1);
        let new = SiloAddress::new(endpoint(11111), 2);
        let other = SiloAddress::new(endpoint(22222), 3);

        assert!(old.is_predecessor_of(&new));
        assert!(!new.is_predecessor_of(&old));
        assert!(!old.is_predecessor_of(&old));
        assert!(!old.is_predecessor_of(&other));
    }

    #[test]
    fn test_ring_position_is_signed() {
        let silo = SiloAddress::with_consistent_hash(endpoint(1), 1, u32::MAX);
        assert_eq!(silo.ring_position(), -1);
    }

    #[test]
    fn test_system_target_types() {
        let sys = GrainType::system_target("directory");
        assert_eq!(sys.as_str(), "sys.svc.directory");
        assert!(sys.is_system_target());
        assert!(!GrainType::new("user").is_system_target());

        let table = GrainType::membership_table();
        assert!(table.is_system_target());
        assert!(table.is_membership_table());
    }

    #[test]
    fn test_grain_id_hash_and_display() {
        let a = GrainId::new(GrainType::new("user"), "42");
        let b = GrainId::new(GrainType::new("user"), "42");
        let c = GrainId::new(GrainType::new("account"), "42");
        assert_eq!(a.uniform_hash(), b.uniform_hash());
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.to_string(), "user/42");
    }

    #[test]
    fn test_address_matches() {
        let grain = GrainId::new(GrainType::new("user"), "1");
        let act = ActivationId::new();
        let a = GrainAddress::new(grain.clone(), act, SiloAddress::new(endpoint(1), 1));
        let b = GrainAddress::new(grain.clone(), act, SiloAddress::new(endpoint(2), 1));
        let c = GrainAddress::new(grain, ActivationId::new(), SiloAddress::new(endpoint(1), 1));
        assert!(a.matches(&b));
        assert!(!a.matches(&c));
    }

    #[test]
    fn test_address_and_tag_none() {
        let none = AddressAndTag::none();
        assert!(!none.is_found());
        assert_eq!(none.version_tag, AddressAndTag::NO_ETAG);
    }
}
