//! Echo-wave dissemination state machine.
//!
//! Floods one envelope across the neighbor mesh so that every reachable
//! peer sees it exactly once, and echoes completion back up the spanning
//! tree the flood carves out (Chang's echo algorithm). The wave id is the
//! broadcast stamp, which originators strictly increment, so ids are unique
//! across the system.

use std::collections::{BTreeSet, HashMap};

use tandem_core::{Envelope, PeerId, WaveId};
use tracing::warn;

use crate::types::WaveToken;

/// Bookkeeping for one wave passing through this peer.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Wave {
    parent: PeerId,
    remaining: BTreeSet<PeerId>,
    count: u32,
}

/// What the runtime must do after a token transition.
#[derive(Debug, Clone, PartialEq)]
pub enum WaveEffect {
    /// Hand the envelope to the local causal bus (first arrival only).
    Deliver(Envelope),
    /// Ship a token to a neighbor over the reliable link.
    Unicast { to: PeerId, token: WaveToken },
    /// This peer originated the wave and every echo is in.
    Complete { wave_id: WaveId, count: u32 },
}

/// Per-peer echo-wave state over the current neighbor set.
pub struct EchoWaveCore {
    peer: PeerId,
    neighbors: BTreeSet<PeerId>,
    pending: HashMap<WaveId, Wave>,
}

impl EchoWaveCore {
    #[must_use]
    pub fn new(peer: PeerId) -> Self {
        Self {
            peer,
            neighbors: BTreeSet::new(),
            pending: HashMap::new(),
        }
    }

    #[must_use]
    pub fn neighbors(&self) -> &BTreeSet<PeerId> {
        &self.neighbors
    }

    #[must_use]
    pub fn pending_waves(&self) -> usize {
        self.pending.len()
    }

    /// Replaces the neighbor set. Waves already in flight keep the
    /// `remaining` sets they recorded at first arrival; only new waves see
    /// the change.
    pub fn set_neighbors(&mut self, neighbors: BTreeSet<PeerId>) {
        self.neighbors = neighbors;
    }

    pub fn add_neighbor(&mut self, peer: PeerId) -> bool {
        self.neighbors.insert(peer)
    }

    pub fn remove_neighbor(&mut self, peer: &PeerId) -> bool {
        self.neighbors.remove(peer)
    }

    /// Swap one neighbor for another in place, as during a mesh repair.
    pub fn replace_neighbor(&mut self, old: &PeerId, new: PeerId) -> bool {
        if !self.neighbors.remove(old) {
            return false;
        }
        self.neighbors.insert(new);
        true
    }

    /// Originates a wave for `envelope` by self-casting the initial token.
    pub fn start_wave(&mut self, envelope: Envelope) -> Vec<WaveEffect> {
        let token = WaveToken {
            wave_id: envelope.stamp.clone(),
            from: self.peer.clone(),
            count: 0,
            envelope: Some(envelope),
        };
        self.on_token(token)
    }

    /// Handles one token from `token.from` (possibly ourselves).
    pub fn on_token(&mut self, token: WaveToken) -> Vec<WaveEffect> {
        let WaveToken {
            wave_id,
            from,
            count,
            envelope,
        } = token;
        let mut effects = Vec::new();

        if let Some(wave) = self.pending.get_mut(&wave_id) {
            // Echo returning, or a cast crossing a mesh cycle.
            wave.remaining.remove(&from);
            wave.count += count;
        } else {
            let Some(envelope) = envelope else {
                warn!(%from, "token for unknown wave carried no envelope, dropping");
                return effects;
            };
            effects.push(WaveEffect::Deliver(envelope.clone()));

            let children: BTreeSet<PeerId> = self
                .neighbors
                .iter()
                .filter(|n| **n != from)
                .cloned()
                .collect();
            for child in &children {
                effects.push(WaveEffect::Unicast {
                    to: child.clone(),
                    token: WaveToken {
                        wave_id: wave_id.clone(),
                        from: self.peer.clone(),
                        count: 0,
                        envelope: Some(envelope.clone()),
                    },
                });
            }
            self.pending.insert(
                wave_id.clone(),
                Wave {
                    parent: from,
                    remaining: children,
                    count: count + 1,
                },
            );
        }

        if self
            .pending
            .get(&wave_id)
            .is_some_and(|w| w.remaining.is_empty())
        {
            let wave = self.pending.remove(&wave_id).expect("checked above");
            if wave.parent == self.peer {
                effects.push(WaveEffect::Complete {
                    wave_id,
                    count: wave.count,
                });
            } else {
                effects.push(WaveEffect::Unicast {
                    to: wave.parent,
                    token: WaveToken {
                        wave_id,
                        from: self.peer.clone(),
                        count: wave.count,
                        envelope: None,
                    },
                });
            }
        }
        effects
    }
}
