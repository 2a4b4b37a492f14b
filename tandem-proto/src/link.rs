//! Reliable unicast state machine.
//!
//! Every outgoing payload gets a monotonic message id and stays pending
//! until the receiver acknowledges it; the runtime retransmits pending
//! frames on a fixed interval. Receivers remember recent ids in a bounded
//! window so retransmissions never reach the upper layers twice.

use std::collections::{BTreeMap, HashSet, VecDeque};

use tandem_core::PeerId;

use crate::types::{LinkFrame, MsgId, Payload};

/// How many delivered message ids the duplicate filter remembers. Retries
/// stop at the first ack, so a bounded window is safe.
pub const SEEN_WINDOW: usize = 4096;

/// What the runtime must do after a link transition.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEffect {
    /// Put a frame on the wire toward `to` (best effort; retries cover loss).
    Transmit { to: PeerId, frame: LinkFrame },
    /// Hand a payload to the component it targets.
    Dispatch { from: PeerId, payload: Payload },
    /// The peer acknowledged `msg_id`; stop its retry timer.
    Settled { msg_id: MsgId },
}

#[derive(Debug, Clone)]
struct PendingSend {
    to: PeerId,
    frame: LinkFrame,
}

/// Per-peer reliable unicast state.
pub struct LinkCore {
    peer: PeerId,
    next_seq: u64,
    pending: BTreeMap<MsgId, PendingSend>,
    seen_order: VecDeque<MsgId>,
    seen: HashSet<MsgId>,
}

impl LinkCore {
    #[must_use]
    pub fn new(peer: PeerId) -> Self {
        Self {
            peer,
            next_seq: 0,
            pending: BTreeMap::new(),
            seen_order: VecDeque::new(),
            seen: HashSet::new(),
        }
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Queues `payload` for `to`. Returns the message id (for the retry
    /// timer) and the first transmission.
    pub fn send(&mut self, to: PeerId, payload: Payload) -> (MsgId, LinkEffect) {
        self.next_seq += 1;
        let msg_id = MsgId {
            origin: self.peer.clone(),
            seq: self.next_seq,
        };
        let frame = LinkFrame::Deliver {
            msg_id: msg_id.clone(),
            from: self.peer.clone(),
            payload,
        };
        self.pending.insert(
            msg_id.clone(),
            PendingSend {
                to: to.clone(),
                frame: frame.clone(),
            },
        );
        (msg_id, LinkEffect::Transmit { to, frame })
    }

    /// Handles a frame from the wire.
    pub fn on_frame(&mut self, frame: LinkFrame) -> Vec<LinkEffect> {
        match frame {
            LinkFrame::Deliver {
                msg_id,
                from,
                payload,
            } => {
                let mut effects = Vec::new();
                if self.note_seen(msg_id.clone()) {
                    effects.push(LinkEffect::Dispatch { from: from.clone(), payload });
                }
                // Acknowledge duplicates too, in case the first ack was lost.
                effects.push(LinkEffect::Transmit {
                    to: from,
                    frame: LinkFrame::Ack { msg_id },
                });
                effects
            }
            LinkFrame::Ack { msg_id } => {
                if self.pending.remove(&msg_id).is_some() {
                    vec![LinkEffect::Settled { msg_id }]
                } else {
                    Vec::new()
                }
            }
        }
    }

    /// The retransmission for `msg_id`, if it is still unacknowledged.
    #[must_use]
    pub fn retransmit(&self, msg_id: &MsgId) -> Option<LinkEffect> {
        self.pending.get(msg_id).map(|p| LinkEffect::Transmit {
            to: p.to.clone(),
            frame: p.frame.clone(),
        })
    }

    /// Drops every pending send targeting `peer` (it left the mesh) and
    /// returns their ids so the runtime can cancel the timers.
    pub fn prune_peer(&mut self, peer: &PeerId) -> Vec<MsgId> {
        let doomed: Vec<MsgId> = self
            .pending
            .iter()
            .filter(|(_, p)| p.to == *peer)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &doomed {
            self.pending.remove(id);
        }
        doomed
    }

    /// Records `id` in the duplicate window. Returns `true` when new.
    fn note_seen(&mut self, id: MsgId) -> bool {
        if self.seen.contains(&id) {
            return false;
        }
        self.seen.insert(id.clone());
        self.seen_order.push_back(id);
        while self.seen_order.len() > SEEN_WINDOW {
            if let Some(evicted) = self.seen_order.pop_front() {
                self.seen.remove(&evicted);
            }
        }
        true
    }
}
