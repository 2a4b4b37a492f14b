//! Characters, operations, and broadcast envelopes.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::clock::VectorClock;
use crate::peer::PeerId;
use crate::position::Position;

/// Globally-unique character identity: the originating peer plus that peer's
/// strictly increasing character counter.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CharId {
    pub author: PeerId,
    pub seq: u64,
}

impl CharId {
    #[must_use]
    pub fn new(author: PeerId, seq: u64) -> Self {
        Self { author, seq }
    }
}

/// One character of the replicated document.
///
/// Identity is `(pos, id)`; `value` is payload and excluded from equality so
/// the tree order stays consistent. `value` is `None` only for sentinels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Char {
    pub id: CharId,
    pub pos: Position,
    pub value: Option<char>,
}

impl Char {
    #[must_use]
    pub fn new(id: CharId, pos: Position, value: char) -> Self {
        Self {
            id,
            pos,
            value: Some(value),
        }
    }

    #[must_use]
    pub fn sentinel(seq: u64, pos: Position) -> Self {
        Self {
            id: CharId::new(PeerId::sentinel(), seq),
            pos,
            value: None,
        }
    }
}

impl PartialEq for Char {
    fn eq(&self, other: &Self) -> bool {
        self.pos == other.pos && self.id == other.id
    }
}

impl Eq for Char {}

impl PartialOrd for Char {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Char {
    fn cmp(&self, other: &Self) -> Ordering {
        self.pos
            .cmp(&other.pos)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// A committed edit, as shipped between peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
    Insert(Char),
    Delete(CharId),
}

/// Wave identifier: the originator's clock stamp. Originators strictly
/// increment before broadcasting, so stamps are unique system-wide.
pub type WaveId = VectorClock;

/// A stamped operation as it travels the mesh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub origin: PeerId,
    pub stamp: VectorClock,
    pub payload: Op,
}
