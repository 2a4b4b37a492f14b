//! The process-wide peer runtime.
//!
//! Actors talk to the network only through [`PeerRuntime`]: low-level
//! connect/disconnect plus a best-effort frame channel between connected
//! peers. The TCP implementation lives in [`crate::tcp`]; tests use the
//! in-memory hub from `tandem-testing`. Implementations deliver inbound
//! traffic through a [`RuntimeEvent`] stream handed out at construction.

use std::future::Future;

use tandem_core::PeerId;
use tandem_proto::LinkFrame;

/// Result of a low-level connect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected,
    Refused,
    AlreadyConnected,
}

/// Inbound traffic and connectivity changes, in arrival order.
#[derive(Debug)]
pub enum RuntimeEvent {
    /// A remote peer connected to us.
    Connected(PeerId),
    /// A connected peer went away (either side closed).
    Disconnected(PeerId),
    /// A frame arrived from a connected peer.
    Frame { from: PeerId, frame: LinkFrame },
}

/// Connectivity primitives every transport provides. Cloned freely between
/// actors; implementations share state internally.
pub trait PeerRuntime: Clone + Send + Sync + 'static {
    fn local_id(&self) -> &PeerId;

    fn connect(&self, peer: &PeerId) -> impl Future<Output = ConnectOutcome> + Send;

    fn disconnect(&self, peer: &PeerId) -> impl Future<Output = ()> + Send;

    /// Best-effort send; `false` means the peer is not connected. A `true`
    /// return does not imply delivery - the link layer retries until acked.
    fn send(&self, to: &PeerId, frame: LinkFrame) -> impl Future<Output = bool> + Send;
}
