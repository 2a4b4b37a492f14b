//! Neighbor-set bookkeeping.
//!
//! The pure part of the mesh layer: the neighbor set itself and the
//! pairwise stitch plan a gracefully departing peer hands its neighbors.
//! Connection management lives in the runtime actor.

use std::collections::BTreeSet;

use tandem_core::PeerId;

/// Per-peer neighbor state.
pub struct MeshCore {
    peer: PeerId,
    neighbors: BTreeSet<PeerId>,
}

impl MeshCore {
    #[must_use]
    pub fn new(peer: PeerId) -> Self {
        Self {
            peer,
            neighbors: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    #[must_use]
    pub fn neighbors(&self) -> &BTreeSet<PeerId> {
        &self.neighbors
    }

    #[must_use]
    pub fn is_neighbor(&self, peer: &PeerId) -> bool {
        self.neighbors.contains(peer)
    }

    /// Returns `false` when `peer` was already a neighbor (or is ourselves).
    pub fn add(&mut self, peer: PeerId) -> bool {
        if peer == self.peer {
            return false;
        }
        self.neighbors.insert(peer)
    }

    /// Returns `false` when `peer` was not a neighbor.
    pub fn remove(&mut self, peer: &PeerId) -> bool {
        self.neighbors.remove(peer)
    }

    /// Every unordered neighbor pair `(n1, n2)` with `n1 < n2`. On graceful
    /// exit each side of a pair is told to join the other, which keeps the
    /// remainder connected when this peer was a cut vertex.
    #[must_use]
    pub fn stitch_plan(&self) -> Vec<(PeerId, PeerId)> {
        let neighbors: Vec<&PeerId> = self.neighbors.iter().collect();
        let mut pairs = Vec::new();
        for (i, left) in neighbors.iter().enumerate() {
            for right in &neighbors[i + 1..] {
                pairs.push(((*left).clone(), (*right).clone()));
            }
        }
        pairs
    }
}
