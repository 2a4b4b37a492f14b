//! Pure state machine cores for the Tandem protocols - no I/O, no async
//!
//! Every protocol layer (causal bus, echo wave, reliable link, mesh) is a
//! plain struct whose transitions take a message and return the effects the
//! runtime must execute: frames to transmit, payloads to dispatch, envelopes
//! to deliver. The actor layer in `tandem-peer` owns the channels and timers;
//! everything that can be unit-tested without a runtime lives here.

#![warn(clippy::pedantic)]

pub mod bus;
pub mod link;
pub mod mesh;
pub mod types;
pub mod wave;

pub use bus::{BusSnapshot, CausalBusCore};
pub use link::{LinkCore, LinkEffect, SEEN_WINDOW};
pub use mesh::MeshCore;
pub use types::{LinkFrame, MeshCommand, MsgId, Payload, WaveToken};
pub use wave::{EchoWaveCore, WaveEffect};
