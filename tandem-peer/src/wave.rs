//! The echo-wave actor.
//!
//! Wraps [`EchoWaveCore`]: wave starts come from the session, tokens come
//! from the link, neighbor updates come from the mesh. Effects fan back out
//! to the link (unicasts) and the session (deliveries).

use std::collections::BTreeSet;

use tokio::sync::mpsc;
use tracing::{debug, info};

use tandem_core::{Envelope, PeerId, WaveId};
use tandem_proto::{EchoWaveCore, Payload, WaveEffect, WaveToken};

use crate::link::LinkHandle;
use crate::session::SessionRequest;

pub enum WaveRequest {
    /// Originate a wave for a freshly stamped envelope.
    Start { envelope: Envelope },
    /// A token dispatched by the link layer.
    Token(WaveToken),
    /// The mesh's neighbor set changed.
    SetNeighbors { neighbors: BTreeSet<PeerId> },
}

/// Completion notice surfaced to whoever is watching (tests, logs).
#[derive(Debug, Clone, PartialEq)]
pub struct WaveComplete {
    pub wave_id: WaveId,
    pub count: u32,
}

pub struct WaveActor {
    core: EchoWaveCore,
    request_rx: mpsc::Receiver<WaveRequest>,
    link: LinkHandle,
    session_tx: mpsc::Sender<SessionRequest>,
    completions: Option<mpsc::UnboundedSender<WaveComplete>>,
}

impl WaveActor {
    pub fn new(
        core: EchoWaveCore,
        request_rx: mpsc::Receiver<WaveRequest>,
        link: LinkHandle,
        session_tx: mpsc::Sender<SessionRequest>,
        completions: Option<mpsc::UnboundedSender<WaveComplete>>,
    ) -> Self {
        Self {
            core,
            request_rx,
            link,
            session_tx,
            completions,
        }
    }

    pub async fn run(mut self) {
        while let Some(request) = self.request_rx.recv().await {
            match request {
                WaveRequest::Start { envelope } => {
                    let effects = self.core.start_wave(envelope);
                    self.apply(effects).await;
                }
                WaveRequest::Token(token) => {
                    let effects = self.core.on_token(token);
                    self.apply(effects).await;
                }
                WaveRequest::SetNeighbors { neighbors } => {
                    self.core.set_neighbors(neighbors);
                }
            }
        }
        info!("wave actor shutting down");
    }

    async fn apply(&mut self, effects: Vec<WaveEffect>) {
        for effect in effects {
            match effect {
                WaveEffect::Deliver(envelope) => {
                    let _ = self
                        .session_tx
                        .send(SessionRequest::Deliver { envelope })
                        .await;
                }
                WaveEffect::Unicast { to, token } => {
                    self.link.send(to, Payload::Wave(token)).await;
                }
                WaveEffect::Complete { wave_id, count } => {
                    debug!(%wave_id, count, "wave complete");
                    if let Some(tx) = &self.completions {
                        let _ = tx.send(WaveComplete { wave_id, count });
                    }
                }
            }
        }
    }
}
