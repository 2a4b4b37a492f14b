//! Test tooling shared across the Tandem workspace.

#![warn(clippy::pedantic)]

pub mod memory;

use std::future::Future;
use std::time::Duration;

use tandem_core::PeerId;
use tandem_peer::{
    EventEmitter, InitPayload, Peer, PeerConfig, SessionHandle, WaveComplete,
};
use tokio::sync::mpsc;

pub use memory::{MemoryHub, MemoryRuntime};

/// Initialize tracing for tests, scoped to the current thread.
/// Uses `RUST_LOG` for filtering, defaulting to debug for the workspace.
pub fn init_tracing() -> impl Sized {
    use tracing::Dispatch;
    use tracing_subscriber::{EnvFilter, fmt};

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("tandem_peer=debug,tandem_proto=debug,tandem_core=debug")
        }))
        .with_test_writer()
        .finish();

    let dispatch = Dispatch::new(subscriber);
    tracing::dispatcher::set_default(&dispatch)
}

/// Everything the session emits toward the editor, captured for assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum EditorEvent {
    Init(InitPayload),
    RemoteInsert { index: usize, value: char },
    RemoteDelete { index: usize },
    Error(String),
}

#[derive(Clone)]
pub struct CapturingEmitter {
    tx: mpsc::UnboundedSender<EditorEvent>,
}

#[must_use]
pub fn capturing_emitter() -> (CapturingEmitter, mpsc::UnboundedReceiver<EditorEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (CapturingEmitter { tx }, rx)
}

impl EventEmitter for CapturingEmitter {
    fn emit_init(&self, payload: &InitPayload) {
        let _ = self.tx.send(EditorEvent::Init(payload.clone()));
    }
    fn emit_remote_insert(&self, index: usize, value: char) {
        let _ = self.tx.send(EditorEvent::RemoteInsert { index, value });
    }
    fn emit_remote_delete(&self, index: usize) {
        let _ = self.tx.send(EditorEvent::RemoteDelete { index });
    }
    fn emit_error(&self, message: &str) {
        let _ = self.tx.send(EditorEvent::Error(message.to_owned()));
    }
}

/// A spawned peer plus the capture ends of its notification streams.
pub struct TestPeer {
    pub peer: Peer,
    pub editor_events: mpsc::UnboundedReceiver<EditorEvent>,
    pub completions: mpsc::UnboundedReceiver<WaveComplete>,
}

/// Spawns a peer on `hub` with a deterministic allocator seed derived from
/// its id.
///
/// # Panics
///
/// Panics when `id` is not a valid peer address.
#[must_use]
pub fn spawn_peer(hub: &MemoryHub, id: &str) -> TestPeer {
    spawn_peer_with(hub, id, PeerConfig::default())
}

/// [`spawn_peer`] with an explicit config; the allocator seed is still
/// derived from the id unless the config sets one.
///
/// # Panics
///
/// Panics when `id` is not a valid peer address.
#[must_use]
pub fn spawn_peer_with(hub: &MemoryHub, id: &str, mut config: PeerConfig) -> TestPeer {
    let peer_id = PeerId::parse(id).expect("valid test peer id");
    let (runtime, runtime_events) = hub.register(peer_id);
    let (emitter, editor_events) = capturing_emitter();
    let (done_tx, completions) = mpsc::unbounded_channel();

    if config.seed.is_none() {
        config.seed = Some(id.bytes().map(u64::from).sum());
    }
    config.completions = Some(done_tx);

    let peer = Peer::spawn(runtime, runtime_events, emitter, config);
    TestPeer {
        peer,
        editor_events,
        completions,
    }
}

/// Polls `probe` until it reports true or ~2 simulated seconds pass.
pub async fn eventually<F, Fut>(mut probe: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if probe().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Waits until the session's text equals `expected`, panicking with a
/// helpful message otherwise.
pub async fn wait_for_text(session: &SessionHandle, expected: &str) {
    if eventually(|| async { session.text().await == expected }).await {
        return;
    }
    panic!(
        "document never converged: expected {expected:?}, last saw {:?}",
        session.text().await
    );
}
