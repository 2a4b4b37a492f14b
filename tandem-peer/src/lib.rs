//! Tandem peer runtime.
//!
//! Each protocol core from `tandem-proto` is wrapped in a single-owner tokio
//! task with an `mpsc` mailbox: the session (document + causal bus), the
//! echo wave, the reliable link, and the mesh. No mutexes anywhere - actors
//! exchange messages and reply over `oneshot` channels, and suspend only
//! between handlers.

#![warn(clippy::pedantic)]

pub mod autosave;
pub mod emitter;
pub mod link;
pub mod mesh;
pub mod peer;
pub mod runtime;
pub mod session;
pub mod store;
pub mod tcp;
pub mod wave;

pub use autosave::Autosave;
pub use emitter::{EventEmitter, InitPayload, NullEmitter};
pub use link::{LinkActor, LinkHandle, LinkRequest};
pub use mesh::{JoinMode, MeshActor, MeshError, MeshHandle, MeshRequest};
pub use peer::{Peer, PeerConfig};
pub use runtime::{ConnectOutcome, PeerRuntime, RuntimeEvent};
pub use session::{SessionActor, SessionHandle, SessionRequest};
pub use store::SnapshotStore;
pub use tcp::TcpRuntime;
pub use wave::{WaveActor, WaveComplete, WaveRequest};
