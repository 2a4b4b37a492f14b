//! Vector clocks.
//!
//! A per-peer counter map with zero defaults for unseen peers. Clocks order
//! partially: pointwise `<=` over the union of keys, with incomparable pairs
//! reported as concurrent.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::peer::PeerId;

/// Outcome of comparing two clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Causality {
    Before,
    After,
    Equal,
    Concurrent,
}

/// `PeerId -> u64` counter map. Missing entries read as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VectorClock(BTreeMap<PeerId, u64>);

impl VectorClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A clock with a single zero entry for `peer`.
    #[must_use]
    pub fn with_peer(peer: PeerId) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(peer, 0);
        Self(entries)
    }

    #[must_use]
    pub fn get(&self, peer: &PeerId) -> u64 {
        self.0.get(peer).copied().unwrap_or(0)
    }

    /// Bumps `peer`'s counter and returns the new value.
    pub fn increment(&mut self, peer: &PeerId) -> u64 {
        let entry = self.0.entry(peer.clone()).or_insert(0);
        *entry += 1;
        *entry
    }

    /// A copy with `peer`'s counter bumped.
    #[must_use]
    pub fn incremented(&self, peer: &PeerId) -> Self {
        let mut next = self.clone();
        next.increment(peer);
        next
    }

    /// Pointwise maximum.
    pub fn merge(&mut self, other: &Self) {
        for (peer, &count) in &other.0 {
            let entry = self.0.entry(peer.clone()).or_insert(0);
            *entry = (*entry).max(count);
        }
    }

    /// Pointwise `<=` over the union of keys.
    #[must_use]
    pub fn le(&self, other: &Self) -> bool {
        self.0.iter().all(|(peer, &count)| count <= other.get(peer))
    }

    #[must_use]
    pub fn compare(&self, other: &Self) -> Causality {
        match (self.le(other), other.le(self)) {
            (true, true) => Causality::Equal,
            (true, false) => Causality::Before,
            (false, true) => Causality::After,
            (false, false) => Causality::Concurrent,
        }
    }

    #[must_use]
    pub fn is_before(&self, other: &Self) -> bool {
        self.compare(other) == Causality::Before
    }

    #[must_use]
    pub fn is_after(&self, other: &Self) -> bool {
        self.compare(other) == Causality::After
    }

    #[must_use]
    pub fn is_equal(&self, other: &Self) -> bool {
        self.compare(other) == Causality::Equal
    }

    #[must_use]
    pub fn is_concurrent(&self, other: &Self) -> bool {
        self.compare(other) == Causality::Concurrent
    }

    /// Peers with a non-zero entry.
    pub fn peers(&self) -> impl Iterator<Item = &PeerId> {
        self.0
            .iter()
            .filter(|&(_, &count)| count > 0)
            .map(|(peer, _)| peer)
    }
}

impl fmt::Display for VectorClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (peer, count)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{peer}:{count}")?;
        }
        write!(f, "}}")
    }
}
