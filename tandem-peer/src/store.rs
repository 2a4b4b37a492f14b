//! Crash-recovery snapshot store.
//!
//! A fjall database with one keyspace per actor kind: the session upserts
//! its document snapshot and bus counters after every mutation, and a
//! restarting peer restores from here before touching the network. Values
//! are postcard-encoded; undecodable entries read as absent.

use std::path::Path;

use fjall::{Database, Keyspace, KeyspaceCreateOptions, PersistMode};
use tandem_core::{DocSnapshot, PeerId};
use tandem_proto::BusSnapshot;

pub struct SnapshotStore {
    db: Database,
    doc: Keyspace,
    bus: Keyspace,
}

impl SnapshotStore {
    /// Opens (or creates) the store under `path`.
    ///
    /// # Errors
    ///
    /// Any fjall error opening the database.
    ///
    /// # Panics
    ///
    /// Panics if the blocking open task is cancelled, which does not happen
    /// outside runtime shutdown.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, fjall::Error> {
        let path = path.as_ref().to_owned();
        tokio::task::spawn_blocking(move || Self::open_sync(&path))
            .await
            .expect("spawn_blocking panicked")
    }

    fn open_sync(path: &Path) -> Result<Self, fjall::Error> {
        let db = Database::builder(path).open()?;
        let doc = db.keyspace("doc", KeyspaceCreateOptions::default)?;
        let bus = db.keyspace("bus", KeyspaceCreateOptions::default)?;
        Ok(Self { db, doc, bus })
    }

    /// # Errors
    ///
    /// Any fjall error writing or syncing.
    pub fn put_doc(&self, peer: &PeerId, snapshot: &DocSnapshot) -> Result<(), fjall::Error> {
        let bytes = postcard::to_allocvec(snapshot).expect("serialization should not fail");
        self.doc.insert(peer.as_str(), &bytes)?;
        self.db.persist(PersistMode::SyncAll)
    }

    /// # Errors
    ///
    /// Any fjall error reading.
    pub fn get_doc(&self, peer: &PeerId) -> Result<Option<DocSnapshot>, fjall::Error> {
        Ok(self
            .doc
            .get(peer.as_str())?
            .and_then(|bytes| postcard::from_bytes(&bytes).ok()))
    }

    /// # Errors
    ///
    /// Any fjall error writing or syncing.
    pub fn put_bus(&self, peer: &PeerId, snapshot: &BusSnapshot) -> Result<(), fjall::Error> {
        let bytes = postcard::to_allocvec(snapshot).expect("serialization should not fail");
        self.bus.insert(peer.as_str(), &bytes)?;
        self.db.persist(PersistMode::SyncAll)
    }

    /// # Errors
    ///
    /// Any fjall error reading.
    pub fn get_bus(&self, peer: &PeerId) -> Result<Option<BusSnapshot>, fjall::Error> {
        Ok(self
            .bus
            .get(peer.as_str())?
            .and_then(|bytes| postcard::from_bytes(&bytes).ok()))
    }
}
