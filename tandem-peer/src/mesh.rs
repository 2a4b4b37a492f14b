//! The neighbor-manager actor.
//!
//! Owns the neighbor set and the connection lifecycle: joins (with optional
//! state transfer for late joiners), leaves, and the pairwise stitch that
//! keeps the mesh connected when a peer departs gracefully. Publishes every
//! neighbor-set change to the wave actor and the session.

use std::fmt;

use error_stack::Report;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use tandem_core::PeerId;
use tandem_proto::{BusSnapshot, MeshCommand, MeshCore, Payload};

use crate::link::LinkHandle;
use crate::runtime::{ConnectOutcome, PeerRuntime};
use crate::session::{SessionHandle, SessionRequest};
use crate::wave::WaveRequest;

/// Whether a join should pull a full state transfer from the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinMode {
    /// Ask the target for the current document and bus counters.
    Ask,
    /// Just connect; used for stitch joins, where both sides already
    /// converged.
    NoAsk,
}

/// Mesh-level failure, reported through `error_stack`.
#[derive(Debug)]
pub enum MeshError {
    /// The target refused or could not be reached.
    Refused,
    /// A peer cannot join itself.
    SelfJoin,
}

impl fmt::Display for MeshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeshError::Refused => f.write_str("peer refused the connection"),
            MeshError::SelfJoin => f.write_str("cannot join self"),
        }
    }
}

impl std::error::Error for MeshError {}

pub enum MeshRequest {
    Join {
        peer: PeerId,
        mode: JoinMode,
        reply: Option<oneshot::Sender<Result<(), Report<MeshError>>>>,
    },
    Leave {
        peer: PeerId,
        reply: Option<oneshot::Sender<()>>,
    },
    LeaveAll {
        reply: Option<oneshot::Sender<()>>,
    },
    /// A command unicast by a remote mesh, dispatched through the link.
    Command { from: PeerId, command: MeshCommand },
    /// The transport reports an inbound connection.
    PeerConnected { peer: PeerId },
    /// The transport reports a connection loss.
    PeerDisconnected { peer: PeerId },
    Neighbors {
        reply: oneshot::Sender<Vec<PeerId>>,
    },
}

/// Cloneable requester for the mesh mailbox.
#[derive(Clone)]
pub struct MeshHandle {
    tx: mpsc::Sender<MeshRequest>,
}

impl MeshHandle {
    #[must_use]
    pub fn new(tx: mpsc::Sender<MeshRequest>) -> Self {
        Self { tx }
    }

    #[must_use]
    pub fn sender(&self) -> mpsc::Sender<MeshRequest> {
        self.tx.clone()
    }

    /// Connects to `peer` and, with [`JoinMode::Ask`], requests a state
    /// transfer.
    ///
    /// # Errors
    ///
    /// [`MeshError`] when the target refuses, or when the actor is gone.
    pub async fn join(&self, peer: PeerId, mode: JoinMode) -> Result<(), Report<MeshError>> {
        let (tx, rx) = oneshot::channel();
        let _ = self
            .tx
            .send(MeshRequest::Join {
                peer,
                mode,
                reply: Some(tx),
            })
            .await;
        rx.await
            .unwrap_or_else(|_| Err(Report::new(MeshError::Refused)))
    }

    pub async fn leave(&self, peer: PeerId) {
        let (tx, rx) = oneshot::channel();
        let _ = self
            .tx
            .send(MeshRequest::Leave {
                peer,
                reply: Some(tx),
            })
            .await;
        let _ = rx.await;
    }

    pub async fn leave_all(&self) {
        let (tx, rx) = oneshot::channel();
        let _ = self.tx.send(MeshRequest::LeaveAll { reply: Some(tx) }).await;
        let _ = rx.await;
    }

    pub async fn neighbors(&self) -> Vec<PeerId> {
        let (tx, rx) = oneshot::channel();
        let _ = self.tx.send(MeshRequest::Neighbors { reply: tx }).await;
        rx.await.unwrap_or_default()
    }
}

pub struct MeshActor<R: PeerRuntime> {
    core: MeshCore,
    runtime: R,
    request_rx: mpsc::Receiver<MeshRequest>,
    link: LinkHandle,
    wave_tx: mpsc::Sender<WaveRequest>,
    session: SessionHandle,
}

impl<R: PeerRuntime> MeshActor<R> {
    pub fn new(
        core: MeshCore,
        runtime: R,
        request_rx: mpsc::Receiver<MeshRequest>,
        link: LinkHandle,
        wave_tx: mpsc::Sender<WaveRequest>,
        session: SessionHandle,
    ) -> Self {
        Self {
            core,
            runtime,
            request_rx,
            link,
            wave_tx,
            session,
        }
    }

    pub async fn run(mut self) {
        while let Some(request) = self.request_rx.recv().await {
            self.handle(request).await;
        }
        info!(peer = %self.core.peer(), "mesh actor shutting down");
    }

    async fn handle(&mut self, request: MeshRequest) {
        match request {
            MeshRequest::Join { peer, mode, reply } => {
                let result = self.join(peer, mode).await;
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                } else if let Err(e) = result {
                    warn!(error = ?e, "stitch join failed");
                }
            }
            MeshRequest::Leave { peer, reply } => {
                self.leave(peer).await;
                if let Some(reply) = reply {
                    let _ = reply.send(());
                }
            }
            MeshRequest::LeaveAll { reply } => {
                self.leave_all().await;
                if let Some(reply) = reply {
                    let _ = reply.send(());
                }
            }
            MeshRequest::Command { from, command } => {
                self.on_command(from, command).await;
            }
            MeshRequest::PeerConnected { peer } => {
                info!(%peer, "inbound neighbor connected");
                self.add_neighbor(peer).await;
            }
            MeshRequest::PeerDisconnected { peer } => {
                info!(%peer, "neighbor disconnected");
                self.drop_neighbor(&peer).await;
            }
            MeshRequest::Neighbors { reply } => {
                let _ = reply.send(self.core.neighbors().iter().cloned().collect());
            }
        }
    }

    async fn join(&mut self, peer: PeerId, mode: JoinMode) -> Result<(), Report<MeshError>> {
        if peer == *self.core.peer() {
            return Err(Report::new(MeshError::SelfJoin));
        }
        match self.runtime.connect(&peer).await {
            ConnectOutcome::Refused => Err(Report::new(MeshError::Refused)
                .attach_printable(format!("connecting to {peer}"))),
            ConnectOutcome::Connected | ConnectOutcome::AlreadyConnected => {
                self.add_neighbor(peer.clone()).await;
                if mode == JoinMode::Ask {
                    self.link
                        .send(peer, Payload::Mesh(MeshCommand::StateRequest))
                        .await;
                }
                Ok(())
            }
        }
    }

    async fn leave(&mut self, peer: PeerId) {
        self.runtime.disconnect(&peer).await;
        self.drop_neighbor(&peer).await;
    }

    /// Graceful exit: stitch every neighbor pair together, then leave.
    async fn leave_all(&mut self) {
        for (n1, n2) in self.core.stitch_plan() {
            self.link
                .send(n1.clone(), Payload::Mesh(MeshCommand::Join { peer: n2.clone() }))
                .await;
            self.link
                .send(n2, Payload::Mesh(MeshCommand::Join { peer: n1 }))
                .await;
        }
        // Get the stitch commands onto the wire before tearing links down.
        self.link.flush().await;
        for peer in self.core.neighbors().clone() {
            self.leave(peer).await;
        }
    }

    async fn on_command(&mut self, from: PeerId, command: MeshCommand) {
        match command {
            MeshCommand::StateRequest => {
                let Some((doc, bus)) = self.session.state().await else {
                    warn!("session unavailable for state transfer");
                    return;
                };
                info!(%from, chars = doc.chars.len(), "serving state transfer");
                self.link
                    .send(from.clone(), Payload::Mesh(MeshCommand::InstallDoc(doc)))
                    .await;
                self.link
                    .send(
                        from,
                        Payload::Mesh(MeshCommand::InstallClocks {
                            stamp: bus.stamp,
                            delivered: bus.delivered,
                        }),
                    )
                    .await;
            }
            MeshCommand::InstallDoc(snapshot) => {
                let _ = self
                    .session
                    .sender()
                    .send(SessionRequest::InstallDoc { snapshot })
                    .await;
            }
            MeshCommand::InstallClocks { stamp, delivered } => {
                let _ = self
                    .session
                    .sender()
                    .send(SessionRequest::InstallClocks {
                        snapshot: BusSnapshot { stamp, delivered },
                    })
                    .await;
            }
            MeshCommand::Join { peer } => {
                if let Err(e) = self.join(peer, JoinMode::NoAsk).await {
                    warn!(error = ?e, "stitch join failed");
                }
            }
        }
    }

    async fn add_neighbor(&mut self, peer: PeerId) {
        if self.core.add(peer) {
            self.publish_neighbors().await;
        }
    }

    async fn drop_neighbor(&mut self, peer: &PeerId) {
        if self.core.remove(peer) {
            self.link.prune(peer.clone()).await;
            self.publish_neighbors().await;
        }
    }

    async fn publish_neighbors(&mut self) {
        let neighbors = self.core.neighbors().clone();
        let _ = self
            .wave_tx
            .send(WaveRequest::SetNeighbors {
                neighbors: neighbors.clone(),
            })
            .await;
        let _ = self
            .session
            .sender()
            .send(SessionRequest::NeighborsChanged {
                neighbors: neighbors.into_iter().collect(),
            })
            .await;
    }
}
