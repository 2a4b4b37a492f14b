//! Peer assembly.
//!
//! Wires the four actors of one peer together: channels first, then tasks.
//! The returned [`Peer`] carries the handles the front-end needs; everything
//! else lives inside the spawned tasks.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::info;

use tandem_core::{DocCrdt, PeerId};
use tandem_proto::{CausalBusCore, EchoWaveCore, LinkCore, MeshCore};

use crate::autosave::Autosave;
use crate::emitter::EventEmitter;
use crate::link::{DEFAULT_RETRY, LinkActor, LinkHandle, LinkRequest};
use crate::mesh::{MeshActor, MeshHandle, MeshRequest};
use crate::runtime::{PeerRuntime, RuntimeEvent};
use crate::session::{SessionActor, SessionHandle, SessionRequest};
use crate::store::SnapshotStore;
use crate::wave::{WaveActor, WaveComplete, WaveRequest};

const MAILBOX: usize = 256;

/// Everything configurable about one peer's actor stack.
pub struct PeerConfig {
    /// Link retransmission interval.
    pub retry_interval: Duration,
    /// Plain-text autosave, when enabled.
    pub autosave: Option<Autosave>,
    /// Crash-recovery snapshot store, when enabled. Existing snapshots for
    /// this peer are restored before the actors start.
    pub store: Option<SnapshotStore>,
    /// Receives a notice when a wave this peer originated closes.
    pub completions: Option<mpsc::UnboundedSender<WaveComplete>>,
    /// Seed for the position allocator (deterministic tests).
    pub seed: Option<u64>,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            retry_interval: DEFAULT_RETRY,
            autosave: None,
            store: None,
            completions: None,
            seed: None,
        }
    }
}

/// Handles to a running peer.
pub struct Peer {
    pub id: PeerId,
    pub session: SessionHandle,
    pub mesh: MeshHandle,
    pub link: LinkHandle,
}

impl Peer {
    /// Spawns the session, wave, link, and mesh actors over `runtime`,
    /// restoring state from the snapshot store when present.
    pub fn spawn<R: PeerRuntime, E: EventEmitter>(
        runtime: R,
        events: mpsc::UnboundedReceiver<RuntimeEvent>,
        emitter: E,
        config: PeerConfig,
    ) -> Self {
        let id = runtime.local_id().clone();

        let (session_tx, session_rx) = mpsc::channel::<SessionRequest>(MAILBOX);
        let (wave_tx, wave_rx) = mpsc::channel::<WaveRequest>(MAILBOX);
        let (link_tx, link_rx) = mpsc::channel::<LinkRequest>(MAILBOX);
        let (mesh_tx, mesh_rx) = mpsc::channel::<MeshRequest>(MAILBOX);

        let session = SessionHandle::new(session_tx.clone());
        let link = LinkHandle::new(link_tx.clone());
        let mesh = MeshHandle::new(mesh_tx.clone());

        let (doc, bus) = restore_state(&id, config.seed, config.store.as_ref());

        tokio::spawn(
            SessionActor::new(
                doc,
                bus,
                session_rx,
                wave_tx.clone(),
                emitter,
                config.autosave,
                config.store,
            )
            .run(),
        );
        tokio::spawn(
            WaveActor::new(
                EchoWaveCore::new(id.clone()),
                wave_rx,
                link.clone(),
                session_tx,
                config.completions,
            )
            .run(),
        );
        tokio::spawn(
            LinkActor::new(
                LinkCore::new(id.clone()),
                runtime.clone(),
                config.retry_interval,
                link_rx,
                wave_tx.clone(),
                mesh_tx.clone(),
            )
            .run(),
        );
        tokio::spawn(
            MeshActor::new(
                MeshCore::new(id.clone()),
                runtime,
                mesh_rx,
                link.clone(),
                wave_tx,
                session.clone(),
            )
            .run(),
        );
        tokio::spawn(dispatch_events(events, link_tx, mesh_tx));

        info!(peer = %id, "peer actors started");
        Self {
            id,
            session,
            mesh,
            link,
        }
    }
}

fn restore_state(
    id: &PeerId,
    seed: Option<u64>,
    store: Option<&SnapshotStore>,
) -> (DocCrdt, CausalBusCore) {
    let doc = match store.and_then(|s| s.get_doc(id).ok().flatten()) {
        Some(snapshot) => {
            info!(peer = %id, chars = snapshot.chars.len(), "restoring document from snapshot store");
            DocCrdt::restore(id.clone(), snapshot)
        }
        None => match seed {
            Some(seed) => DocCrdt::with_seed(id.clone(), seed),
            None => DocCrdt::new(id.clone()),
        },
    };
    let mut bus = CausalBusCore::new(id.clone());
    if let Some(snapshot) = store.and_then(|s| s.get_bus(id).ok().flatten()) {
        let _ = bus.install(snapshot);
    }
    (doc, bus)
}

/// Routes transport events to the owning actors: frames to the link,
/// connectivity changes to the mesh.
async fn dispatch_events(
    mut events: mpsc::UnboundedReceiver<RuntimeEvent>,
    link_tx: mpsc::Sender<LinkRequest>,
    mesh_tx: mpsc::Sender<MeshRequest>,
) {
    while let Some(event) = events.recv().await {
        match event {
            RuntimeEvent::Frame { frame, .. } => {
                let _ = link_tx.send(LinkRequest::Inbound { frame }).await;
            }
            RuntimeEvent::Connected(peer) => {
                let _ = mesh_tx.send(MeshRequest::PeerConnected { peer }).await;
            }
            RuntimeEvent::Disconnected(peer) => {
                let _ = mesh_tx.send(MeshRequest::PeerDisconnected { peer }).await;
            }
        }
    }
}
