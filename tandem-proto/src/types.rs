//! Wire messages exchanged between peers.

use serde::{Deserialize, Serialize};
use tandem_core::{DocSnapshot, Envelope, PeerId, VectorClock, WaveId};

/// Link message identifier: monotonic per source across all destinations.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MsgId {
    pub origin: PeerId,
    pub seq: u64,
}

/// One hop of an echo wave.
///
/// Outbound casts carry the envelope; echoes back toward the originator
/// carry only the accumulated peer count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveToken {
    pub wave_id: WaveId,
    pub from: PeerId,
    pub count: u32,
    pub envelope: Option<Envelope>,
}

/// Mesh-level commands, unicast between neighbor managers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MeshCommand {
    /// A new joiner asking this peer for a full state transfer.
    StateRequest,
    /// Full document state for a joiner.
    InstallDoc(DocSnapshot),
    /// Broadcast-bus counters for a joiner.
    InstallClocks {
        stamp: VectorClock,
        delivered: VectorClock,
    },
    /// Stitch instruction during a graceful exit: connect to `peer`
    /// without requesting state.
    Join { peer: PeerId },
}

/// Payload routed by the link to one peer-local component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Wave(WaveToken),
    Mesh(MeshCommand),
}

/// Frames exchanged between two links.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LinkFrame {
    Deliver {
        msg_id: MsgId,
        from: PeerId,
        payload: Payload,
    },
    Ack {
        msg_id: MsgId,
    },
}
