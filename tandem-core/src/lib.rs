//! Tandem Core - shared types for the collaboration engine
//!
//! This crate provides the pure data model used by every peer: identities,
//! dense position identifiers, the sequence CRDT and its order-statistics
//! tree, vector clocks, and the wire codec. Nothing here performs I/O.

#![warn(clippy::pedantic)]

pub mod alloc;
pub mod clock;
pub mod codec;
pub mod doc;
pub mod error;
pub mod op;
pub mod ostree;
pub mod peer;
pub mod position;

pub use alloc::{Allocator, BOUNDARY, Strategy};
pub use clock::{Causality, VectorClock};
pub use codec::PostcardCodec;
pub use doc::{DocCrdt, DocSnapshot};
pub use error::{AddrError, DocError};
pub use op::{Char, CharId, Envelope, Op, WaveId};
pub use ostree::OrderStatTree;
pub use peer::PeerId;
pub use position::{Digit, INITIAL_BASE, Position};
