//! Editor-facing notifications.

use serde::Serialize;

/// Snapshot pushed to the editor after membership changes or an install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitPayload {
    pub client_id: String,
    pub content: String,
    pub neighbors: Vec<String>,
}

/// Abstracts notification delivery so actors can be tested without a
/// front-end attached.
pub trait EventEmitter: Clone + Send + 'static {
    fn emit_init(&self, payload: &InitPayload);
    /// A remote insert took effect at the 1-based live index.
    fn emit_remote_insert(&self, index: usize, value: char);
    /// A remote delete removed the character at the 1-based live index.
    fn emit_remote_delete(&self, index: usize);
    fn emit_error(&self, message: &str);
}

/// Emitter for headless peers: drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEmitter;

impl EventEmitter for NullEmitter {
    fn emit_init(&self, _payload: &InitPayload) {}
    fn emit_remote_insert(&self, _index: usize, _value: char) {}
    fn emit_remote_delete(&self, _index: usize) {}
    fn emit_error(&self, _message: &str) {}
}
