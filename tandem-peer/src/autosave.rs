//! Plain-text autosave.
//!
//! Overwrites one UTF-8 file per peer with the current text projection:
//! after a configured number of local edits, and unconditionally on every
//! state install. Write failures are logged and editing continues in
//! memory.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

pub struct Autosave {
    path: PathBuf,
    threshold: u32,
    edits_since_write: u32,
}

impl Autosave {
    /// Saves to `<dir>/<peer_name>.txt`, writing after every `threshold`
    /// local edits (a threshold of 1 writes on each edit).
    #[must_use]
    pub fn new(dir: &Path, peer_name: &str, threshold: u32) -> Self {
        Self {
            path: dir.join(format!("{peer_name}.txt")),
            threshold: threshold.max(1),
            edits_since_write: 0,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Counts one local edit, writing when the threshold is reached.
    pub async fn note_edit(&mut self, text: &str) {
        self.edits_since_write += 1;
        if self.edits_since_write >= self.threshold {
            self.write(text).await;
        }
    }

    /// Unconditional write (state install, shutdown).
    pub async fn flush(&mut self, text: &str) {
        self.write(text).await;
    }

    async fn write(&mut self, text: &str) {
        self.edits_since_write = 0;
        match tokio::fs::write(&self.path, text).await {
            Ok(()) => debug!(path = %self.path.display(), "autosaved"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "autosave failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_only_at_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let mut autosave = Autosave::new(dir.path(), "alice", 3);

        autosave.note_edit("a").await;
        autosave.note_edit("ab").await;
        assert!(!autosave.path().exists());

        autosave.note_edit("abc").await;
        assert_eq!(tokio::fs::read_to_string(autosave.path()).await.unwrap(), "abc");

        // Counter reset: two more edits stay in memory.
        autosave.note_edit("abcd").await;
        autosave.note_edit("abcde").await;
        assert_eq!(tokio::fs::read_to_string(autosave.path()).await.unwrap(), "abc");
    }

    #[tokio::test]
    async fn flush_writes_unconditionally() {
        let dir = tempfile::tempdir().unwrap();
        let mut autosave = Autosave::new(dir.path(), "bob", 100);
        autosave.flush("installed").await;
        assert_eq!(
            tokio::fs::read_to_string(autosave.path()).await.unwrap(),
            "installed"
        );
    }

    #[tokio::test]
    async fn overwrites_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let mut autosave = Autosave::new(dir.path(), "carol", 1);
        autosave.note_edit("long first version").await;
        autosave.note_edit("short").await;
        assert_eq!(
            tokio::fs::read_to_string(autosave.path()).await.unwrap(),
            "short"
        );
    }

    #[tokio::test]
    async fn write_failure_is_non_fatal() {
        let missing = Path::new("/nonexistent-tandem-dir");
        let mut autosave = Autosave::new(missing, "dave", 1);
        // Must not panic.
        autosave.note_edit("text").await;
    }
}
