//! Causal broadcast state machine.
//!
//! Stamps every outgoing operation with the replica's vector clock and
//! releases incoming envelopes only once their causal dependencies have
//! been delivered. FIFO per origin falls out of the same predicate.

use serde::{Deserialize, Serialize};
use tandem_core::{Envelope, Op, PeerId, VectorClock};

/// The bus counters shipped to joiners and written to the snapshot store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusSnapshot {
    pub stamp: VectorClock,
    pub delivered: VectorClock,
}

/// Per-peer causal broadcast state.
pub struct CausalBusCore {
    peer: PeerId,
    /// Own broadcast count plus everything merged from received stamps.
    stamp: VectorClock,
    /// Per-origin count of operations applied to the local replica. Own
    /// broadcasts count immediately: local edits apply before the wave
    /// starts, so envelopes that causally depend on them stay deliverable.
    delivered: VectorClock,
    buffer: Vec<Envelope>,
}

impl CausalBusCore {
    #[must_use]
    pub fn new(peer: PeerId) -> Self {
        Self {
            stamp: VectorClock::with_peer(peer.clone()),
            delivered: VectorClock::with_peer(peer.clone()),
            peer,
            buffer: Vec::new(),
        }
    }

    #[must_use]
    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    #[must_use]
    pub fn stamp(&self) -> &VectorClock {
        &self.stamp
    }

    #[must_use]
    pub fn delivered(&self) -> &VectorClock {
        &self.delivered
    }

    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Stamps `payload` for broadcast. The caller applies the edit locally
    /// first and hands the returned envelope to the wave layer; the bus
    /// never self-delivers it.
    pub fn broadcast(&mut self, payload: Op) -> Envelope {
        self.stamp.increment(&self.peer);
        self.delivered.increment(&self.peer);
        Envelope {
            origin: self.peer.clone(),
            stamp: self.stamp.clone(),
            payload,
        }
    }

    /// Accepts an envelope from the wave layer. Returns every envelope that
    /// became deliverable, in delivery order; the caller applies each to the
    /// document.
    pub fn receive(&mut self, envelope: Envelope) -> Vec<Envelope> {
        self.stamp.merge(&envelope.stamp);

        // The buffer is a set, and anything at or below the delivered count
        // for its origin has already been applied (this is also how the
        // originator's own flooded envelope is discarded).
        let duplicate = envelope.stamp.get(&envelope.origin)
            <= self.delivered.get(&envelope.origin)
            || self.buffer.contains(&envelope);
        if !duplicate {
            self.buffer.push(envelope);
        }
        self.drain()
    }

    /// State handoff to a joiner.
    #[must_use]
    pub fn snapshot(&self) -> BusSnapshot {
        BusSnapshot {
            stamp: self.stamp.clone(),
            delivered: self.delivered.clone(),
        }
    }

    /// Installs counters from a donor. Envelopes that arrived during the
    /// handoff stay buffered; any now deliverable are returned. Counters
    /// merge rather than overwrite, so stamps already absorbed from
    /// in-flight envelopes survive the handoff.
    pub fn install(&mut self, snapshot: BusSnapshot) -> Vec<Envelope> {
        self.stamp.merge(&snapshot.stamp);
        self.delivered.merge(&snapshot.delivered);
        self.drain()
    }

    fn deliverable(&self, envelope: &Envelope) -> bool {
        envelope
            .stamp
            .le(&self.delivered.incremented(&envelope.origin))
    }

    fn drain(&mut self) -> Vec<Envelope> {
        let mut released = Vec::new();
        loop {
            let Some(i) = self.buffer.iter().position(|e| self.deliverable(e)) else {
                break;
            };
            let envelope = self.buffer.remove(i);
            self.delivered.increment(&envelope.origin);
            released.push(envelope);
        }
        released
    }
}
