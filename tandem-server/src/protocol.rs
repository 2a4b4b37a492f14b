//! The JSON editor protocol, both directions.
//!
//! Messages are tagged with a `type` field. Indices are 1-based on the
//! wire; the session layer keeps that convention for deletes, while
//! inserts name the index the character ends up at.

use serde::{Deserialize, Serialize};

/// A delete index from the front-end: a number, or the placeholder string
/// the editor sends while a selection marker is active (ignored).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndexField {
    Index(u64),
    Marker(String),
}

/// Client-to-server messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping,
    GetClientId,
    Connect {
        peer_address: String,
    },
    Disconnect {
        #[serde(default)]
        peer_id: Option<String>,
    },
    Insert {
        index: u64,
        char: char,
        #[serde(default)]
        client_id: Option<String>,
    },
    Delete {
        index: IndexField,
        #[serde(default)]
        client_id: Option<String>,
    },
}

/// One positional effect pushed to the editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EditorOp {
    Insert { index: u64, char: char },
    Delete { index: u64 },
}

/// Server-to-client messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Ping,
    Pong,
    Init {
        client_id: String,
        content: String,
        neighbors: Vec<String>,
    },
    Operations {
        operations: Vec<EditorOp>,
    },
    Error {
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_parses_from_frontend_json() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"insert","index":3,"char":"k","client_id":"a@1.2.3.4"}"#)
                .unwrap();
        assert_eq!(
            msg,
            ClientMessage::Insert {
                index: 3,
                char: 'k',
                client_id: Some("a@1.2.3.4".into())
            }
        );
    }

    #[test]
    fn delete_accepts_numeric_index() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"delete","index":7}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Delete {
                index: IndexField::Index(7),
                client_id: None
            }
        );
    }

    #[test]
    fn delete_accepts_marker_placeholder() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"delete","index":"marker"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Delete {
                index: IndexField::Marker("marker".into()),
                client_id: None
            }
        );
    }

    #[test]
    fn connect_and_ping_parse() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"connect","peer_address":"bob@10.0.0.2"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Connect {
                peer_address: "bob@10.0.0.2".into()
            }
        );
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Ping);
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"teleport"}"#).is_err());
    }

    #[test]
    fn init_serializes_with_type_tag() {
        let msg = ServerMessage::Init {
            client_id: "a@1.2.3.4".into(),
            content: "hi".into(),
            neighbors: vec!["b@1.2.3.5".into()],
        };
        let value: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "init");
        assert_eq!(value["client_id"], "a@1.2.3.4");
        assert_eq!(value["content"], "hi");
        assert_eq!(value["neighbors"][0], "b@1.2.3.5");
    }

    #[test]
    fn operations_wrap_single_ops() {
        let msg = ServerMessage::Operations {
            operations: vec![EditorOp::Insert { index: 2, char: 'x' }],
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(
            json,
            r#"{"type":"operations","operations":[{"type":"insert","index":2,"char":"x"}]}"#
        );
    }

    #[test]
    fn error_round_trips() {
        let msg = ServerMessage::Error {
            message: "invalid_peer_address".into(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        let back: ServerMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }
}
