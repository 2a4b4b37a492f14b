//! In-memory peer runtime.
//!
//! A hub routes frames between registered peers over channels, with the
//! same connect/disconnect/send surface as the TCP transport. Tests can
//! script one-shot frame drops to exercise link retransmission; a dropped
//! frame still reports as sent, exactly like a datagram lost in flight.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tandem_core::PeerId;
use tandem_peer::{ConnectOutcome, PeerRuntime, RuntimeEvent};
use tandem_proto::LinkFrame;
use tokio::sync::mpsc;

#[derive(Default)]
struct HubInner {
    peers: HashMap<PeerId, mpsc::UnboundedSender<RuntimeEvent>>,
    links: HashSet<(PeerId, PeerId)>,
    /// Scripted loss: number of upcoming frames from `.0` to `.1` to drop.
    drops: HashMap<(PeerId, PeerId), u32>,
    dropped: u64,
}

fn pair(a: &PeerId, b: &PeerId) -> (PeerId, PeerId) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

/// The shared router all [`MemoryRuntime`]s of one test hang off.
#[derive(Clone, Default)]
pub struct MemoryHub {
    inner: Arc<Mutex<HubInner>>,
}

impl MemoryHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `peer` and returns its runtime plus the event stream to
    /// hand to `Peer::spawn`.
    pub fn register(&self, peer: PeerId) -> (MemoryRuntime, mpsc::UnboundedReceiver<RuntimeEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        self.inner
            .lock()
            .unwrap()
            .peers
            .insert(peer.clone(), events_tx);
        (
            MemoryRuntime {
                hub: self.inner.clone(),
                local: peer,
            },
            events_rx,
        )
    }

    /// The next `count` frames from `from` to `to` vanish in flight.
    pub fn drop_frames(&self, from: &PeerId, to: &PeerId, count: u32) {
        *self
            .inner
            .lock()
            .unwrap()
            .drops
            .entry((from.clone(), to.clone()))
            .or_insert(0) += count;
    }

    #[must_use]
    pub fn are_connected(&self, a: &PeerId, b: &PeerId) -> bool {
        self.inner.lock().unwrap().links.contains(&pair(a, b))
    }

    /// Total frames lost to scripted drops so far.
    #[must_use]
    pub fn dropped_frames(&self) -> u64 {
        self.inner.lock().unwrap().dropped
    }
}

/// One peer's view of the hub.
#[derive(Clone)]
pub struct MemoryRuntime {
    hub: Arc<Mutex<HubInner>>,
    local: PeerId,
}

impl PeerRuntime for MemoryRuntime {
    fn local_id(&self) -> &PeerId {
        &self.local
    }

    async fn connect(&self, peer: &PeerId) -> ConnectOutcome {
        let mut hub = self.hub.lock().unwrap();
        if *peer == self.local || !hub.peers.contains_key(peer) {
            return ConnectOutcome::Refused;
        }
        if !hub.links.insert(pair(&self.local, peer)) {
            return ConnectOutcome::AlreadyConnected;
        }
        if let Some(events) = hub.peers.get(peer) {
            let _ = events.send(RuntimeEvent::Connected(self.local.clone()));
        }
        ConnectOutcome::Connected
    }

    async fn disconnect(&self, peer: &PeerId) {
        let mut hub = self.hub.lock().unwrap();
        if hub.links.remove(&pair(&self.local, peer))
            && let Some(events) = hub.peers.get(peer)
        {
            let _ = events.send(RuntimeEvent::Disconnected(self.local.clone()));
        }
    }

    async fn send(&self, to: &PeerId, frame: LinkFrame) -> bool {
        let mut hub = self.hub.lock().unwrap();
        if !hub.links.contains(&pair(&self.local, to)) {
            return false;
        }
        let key = (self.local.clone(), to.clone());
        if let Some(remaining) = hub.drops.get_mut(&key)
            && *remaining > 0
        {
            *remaining -= 1;
            hub.dropped += 1;
            return true;
        }
        match hub.peers.get(to) {
            Some(events) => events
                .send(RuntimeEvent::Frame {
                    from: self.local.clone(),
                    frame,
                })
                .is_ok(),
            None => false,
        }
    }
}
