//! The reliable-link actor.
//!
//! Wraps [`LinkCore`] with the retry clock: every pending send sits in a
//! [`DelayQueue`] and is retransmitted on expiry until the ack arrives or
//! the mesh prunes the peer. Inbound frames are deduplicated by the core
//! and dispatched to the wave or mesh mailbox.

use std::collections::HashMap;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::time::delay_queue::{DelayQueue, Key};
use tracing::{debug, info, trace};

use tandem_core::PeerId;
use tandem_proto::{LinkCore, LinkEffect, LinkFrame, MsgId, Payload};

use crate::mesh::MeshRequest;
use crate::runtime::PeerRuntime;
use crate::wave::WaveRequest;

/// Default retransmission interval.
pub const DEFAULT_RETRY: Duration = Duration::from_secs(5);

pub enum LinkRequest {
    /// Reliable unicast of `payload` to `to`.
    Send { to: PeerId, payload: Payload },
    /// A frame arrived from the transport.
    Inbound { frame: LinkFrame },
    /// `peer` left the mesh; drop pending sends targeting it.
    PrunePeer { peer: PeerId },
    /// Barrier: replies once every previously queued send has had its
    /// first transmission.
    Flush { reply: tokio::sync::oneshot::Sender<()> },
}

/// Cloneable requester for the link mailbox.
#[derive(Clone)]
pub struct LinkHandle {
    tx: mpsc::Sender<LinkRequest>,
}

impl LinkHandle {
    #[must_use]
    pub fn new(tx: mpsc::Sender<LinkRequest>) -> Self {
        Self { tx }
    }

    pub async fn send(&self, to: PeerId, payload: Payload) {
        let _ = self.tx.send(LinkRequest::Send { to, payload }).await;
    }

    pub async fn inbound(&self, frame: LinkFrame) {
        let _ = self.tx.send(LinkRequest::Inbound { frame }).await;
    }

    pub async fn prune(&self, peer: PeerId) {
        let _ = self.tx.send(LinkRequest::PrunePeer { peer }).await;
    }

    /// Waits until every send queued before this call has been put on the
    /// wire once. Used by the mesh before tearing connections down.
    pub async fn flush(&self) {
        let (reply, rx) = tokio::sync::oneshot::channel();
        let _ = self.tx.send(LinkRequest::Flush { reply }).await;
        let _ = rx.await;
    }
}

pub struct LinkActor<R: PeerRuntime> {
    core: LinkCore,
    runtime: R,
    retry: Duration,
    timers: DelayQueue<MsgId>,
    timer_keys: HashMap<MsgId, Key>,
    request_rx: mpsc::Receiver<LinkRequest>,
    wave_tx: mpsc::Sender<WaveRequest>,
    mesh_tx: mpsc::Sender<MeshRequest>,
}

impl<R: PeerRuntime> LinkActor<R> {
    pub fn new(
        core: LinkCore,
        runtime: R,
        retry: Duration,
        request_rx: mpsc::Receiver<LinkRequest>,
        wave_tx: mpsc::Sender<WaveRequest>,
        mesh_tx: mpsc::Sender<MeshRequest>,
    ) -> Self {
        Self {
            core,
            runtime,
            retry,
            timers: DelayQueue::new(),
            timer_keys: HashMap::new(),
            request_rx,
            wave_tx,
            mesh_tx,
        }
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                request = self.request_rx.recv() => {
                    match request {
                        Some(request) => self.handle(request).await,
                        None => break,
                    }
                }
                Some(expired) = self.timers.next() => {
                    self.retransmit(expired.into_inner()).await;
                }
            }
        }
        info!("link actor shutting down");
    }

    async fn handle(&mut self, request: LinkRequest) {
        match request {
            LinkRequest::Send { to, payload } => {
                let (msg_id, effect) = self.core.send(to, payload);
                self.apply(effect).await;
                self.arm(msg_id);
            }
            LinkRequest::Inbound { frame } => {
                for effect in self.core.on_frame(frame) {
                    self.apply(effect).await;
                }
            }
            LinkRequest::PrunePeer { peer } => {
                for msg_id in self.core.prune_peer(&peer) {
                    self.disarm(&msg_id);
                }
            }
            LinkRequest::Flush { reply } => {
                // Mailbox order means everything queued earlier is out.
                let _ = reply.send(());
            }
        }
    }

    async fn apply(&mut self, effect: LinkEffect) {
        match effect {
            LinkEffect::Transmit { to, frame } => {
                if !self.runtime.send(&to, frame).await {
                    trace!(%to, "transmit failed, peer not connected");
                }
            }
            LinkEffect::Dispatch { from, payload } => match payload {
                Payload::Wave(token) => {
                    let _ = self.wave_tx.send(WaveRequest::Token(token)).await;
                }
                Payload::Mesh(command) => {
                    let _ = self
                        .mesh_tx
                        .send(MeshRequest::Command { from, command })
                        .await;
                }
            },
            LinkEffect::Settled { msg_id } => {
                self.disarm(&msg_id);
            }
        }
    }

    async fn retransmit(&mut self, msg_id: MsgId) {
        self.timer_keys.remove(&msg_id);
        if let Some(effect) = self.core.retransmit(&msg_id) {
            debug!(?msg_id, "retransmitting unacknowledged frame");
            self.apply(effect).await;
            self.arm(msg_id);
        }
    }

    fn arm(&mut self, msg_id: MsgId) {
        let key = self.timers.insert(msg_id.clone(), self.retry);
        self.timer_keys.insert(msg_id, key);
    }

    fn disarm(&mut self, msg_id: &MsgId) {
        if let Some(key) = self.timer_keys.remove(msg_id) {
            self.timers.try_remove(&key);
        }
    }
}
