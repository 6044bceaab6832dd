//! Immutable snapshot of the directory ring.
//!
//! Silos are placed on a 32-bit ring by their consistent hash. A snapshot is
//! never mutated: adding or removing a silo produces a new snapshot which
//! replaces the old one wholesale.

use crate::types::SiloAddress;
use std::collections::HashSet;

/// Size of the hash ring.
pub const RING_SIZE: u64 = 1 << 32;

/// Hash-sorted ring of member silos plus a set for O(1) membership tests.
#[derive(Debug, Clone, Default)]
pub struct RingMembership {
    /// Members sorted by (ring position, address).
    ring: Vec<SiloAddress>,

    /// Same members, for membership tests.
    members: HashSet<SiloAddress>,
}

impl RingMembership {
    /// Create an empty ring.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a ring from a set of silos.
    pub fn from_silos<I: IntoIterator<Item = SiloAddress>>(silos: I) -> Self {
        silos.into_iter().fold(Self::empty(), |ring, silo| {
            ring.with_silo(&silo).unwrap_or(ring)
        })
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Whether the ring has no members.
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Members in ring order.
    pub fn silos(&self) -> &[SiloAddress] {
        &self.ring
    }

    /// Whether a silo is a member.
    pub fn contains(&self, silo: &SiloAddress) -> bool {
        self.members.contains(silo)
    }

    fn sort_key(silo: &SiloAddress) -> (i32, &SiloAddress) {
        (silo.ring_position(), silo)
    }

    /// Snapshot with `silo` inserted at its sorted position.
    ///
    /// Returns `None` if the silo is already a member.
    pub fn with_silo(&self, silo: &SiloAddress) -> Option<Self> {
        if self.members.contains(silo) {
            return None;
        }

        let key = Self::sort_key(silo);
        let index = self.ring.partition_point(|s| Self::sort_key(s) < key);

        let mut ring = Vec::with_capacity(self.ring.len() + 1);
        ring.extend_from_slice(&self.ring[..index]);
        ring.push(silo.clone());
        ring.extend_from_slice(&self.ring[index..]);

        let mut members = self.members.clone();
        members.insert(silo.clone());

        Some(Self { ring, members })
    }

    /// Snapshot with `silo` removed.
    ///
    /// Returns `None` if the silo is not a member.
    pub fn without_silo(&self, silo: &SiloAddress) -> Option<Self> {
        if !self.members.contains(silo) {
            return None;
        }

        let ring = self.ring.iter().filter(|s| *s != silo).cloned().collect();
        let mut members = self.members.clone();
        members.remove(silo);

        Some(Self { ring, members })
    }

    /// Owner of a ring position.
    ///
    /// The owner is the first member whose position is at or after `position`,
    /// wrapping to the lowest member. `excluded` (a draining local silo) is
    /// never chosen. Returns `None` for an empty ring or when the only member
    /// is excluded.
    pub fn owner_of_position(
        &self,
        position: i32,
        excluded: Option<&SiloAddress>,
    ) -> Option<&SiloAddress> {
        let is_excluded = |s: &SiloAddress| excluded.is_some_and(|e| e == s);

        let start = self.ring.partition_point(|s| s.ring_position() < position);
        if let Some(found) = self.ring[start..].iter().find(|s| !is_excluded(s)) {
            return Some(found);
        }

        // Wrapped around the ring.
        let first = self.ring.first()?;
        if is_excluded(first) {
            self.ring.get(1)
        } else {
            Some(first)
        }
    }

    fn index_of(&self, silo: &SiloAddress) -> Option<usize> {
        if !self.members.contains(silo) {
            return None;
        }
        self.ring.iter().position(|s| s == silo)
    }

    /// Ring neighbor before `silo`.
    ///
    /// `None` if the silo is not a member or it is the only member.
    pub fn predecessor(&self, silo: &SiloAddress) -> Option<&SiloAddress> {
        let index = self.index_of(silo)?;
        if self.ring.len() < 2 {
            return None;
        }
        let prev = if index == 0 { self.ring.len() - 1 } else { index - 1 };
        self.ring.get(prev)
    }

    /// Ring neighbor after `silo`.
    ///
    /// `None` if the silo is not a member or it is the only member.
    pub fn successor(&self, silo: &SiloAddress) -> Option<&SiloAddress> {
        let index = self.index_of(silo)?;
        if self.ring.len() < 2 {
            return None;
        }
        self.ring.get((index + 1) % self.ring.len())
    }
}

/// Clockwise distance from `from` to `to` on the ring.
pub fn ring_distance(from: &SiloAddress, to: &SiloAddress) -> u64 {
    let a = from.consistent_hash() as i64;
    let b = to.consistent_hash() as i64;
    if b >= a {
        (b - a) as u64
    } else {
        RING_SIZE - (a - b) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn silo(port: u16, hash: u32) -> SiloAddress {
        SiloAddress::with_consistent_hash(format!("127.0.0.1:{}", port).parse().unwrap(), 1, hash)
    }

    #[test]
    fn test_empty_ring() {
        let ring = RingMembership::empty();
        assert!(ring.is_empty());
        assert!(ring.owner_of_position(42, None).is_none());
    }

    #[test]
    fn test_insert_keeps_order() {
        let ring = RingMembership::from_silos([silo(3, 90), silo(1, 10), silo(2, 50)]);
        let hashes: Vec<u32> = ring.silos().iter().map(|s| s.consistent_hash()).collect();
        assert_eq!(hashes, vec![10, 50, 90]);
        assert_eq!(ring.len(), 3);
    }

    #[test]
    fn test_signed_order() {
        // u32::MAX is -1 as a ring position and sorts before 10.
        let ring = RingMembership::from_silos([silo(1, 10), silo(2, u32::MAX)]);
        assert_eq!(ring.silos()[0].consistent_hash(), u32::MAX);
    }

    #[test]
    fn test_duplicate_add_and_missing_remove() {
        let a = silo(1, 10);
        let ring = RingMembership::from_silos([a.clone()]);
        assert!(ring.with_silo(&a).is_none());
        assert!(ring.without_silo(&silo(2, 20)).is_none());

        let ring = ring.without_silo(&a).unwrap();
        assert!(ring.is_empty());
        assert!(!ring.contains(&a));
    }

    #[test]
    fn test_equal_hashes_ordered_by_address() {
        let ring_a = RingMembership::from_silos([silo(2, 50), silo(1, 50)]);
        let ring_b = RingMembership::from_silos([silo(1, 50), silo(2, 50)]);
        assert_eq!(ring_a.silos(), ring_b.silos());
    }

    #[test]
    fn test_owner_is_successor() {
        let ring = RingMembership::from_silos([silo(1, 10), silo(2, 50), silo(3, 90)]);
        assert_eq!(ring.owner_of_position(60, None), Some(&silo(3, 90)));
        assert_eq!(ring.owner_of_position(50, None), Some(&silo(2, 50)));
        assert_eq!(ring.owner_of_position(5, None), Some(&silo(1, 10)));
        // Wraps around to the lowest member.
        assert_eq!(ring.owner_of_position(95, None), Some(&silo(1, 10)));
    }

    #[test]
    fn test_owner_skips_excluded() {
        let ring = RingMembership::from_silos([silo(1, 10), silo(2, 50), silo(3, 90)]);
        let excluded = silo(3, 90);
        assert_eq!(ring.owner_of_position(60, Some(&excluded)), Some(&silo(1, 10)));

        let excluded = silo(1, 10);
        assert_eq!(ring.owner_of_position(95, Some(&excluded)), Some(&silo(2, 50)));

        let single = RingMembership::from_silos([silo(1, 10)]);
        assert!(single.owner_of_position(5, Some(&silo(1, 10))).is_none());
    }

    #[test]
    fn test_neighbors() {
        let ring = RingMembership::from_silos([silo(1, 10), silo(2, 50), silo(3, 90)]);
        assert_eq!(ring.predecessor(&silo(1, 10)), Some(&silo(3, 90)));
        assert_eq!(ring.successor(&silo(3, 90)), Some(&silo(1, 10)));
        assert_eq!(ring.successor(&silo(1, 10)), Some(&silo(2, 50)));
        assert!(ring.predecessor(&silo(9, 99)).is_none());

        let single = RingMembership::from_silos([silo(1, 10)]);
        assert!(single.successor(&silo(1, 10)).is_none());
        assert!(single.predecessor(&silo(1, 10)).is_none());
    }

    #[test]
    fn test_ring_distance() {
        assert_eq!(ring_distance(&silo(1, 10), &silo(2, 50)), 40);
        assert_eq!(ring_distance(&silo(2, 50), &silo(1, 10)), RING_SIZE - 40);
        assert_eq!(ring_distance(&silo(1, 10), &silo(1, 10)), 0);
    }
}
