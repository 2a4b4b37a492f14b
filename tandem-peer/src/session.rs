//! The document session actor.
//!
//! Sole owner of the [`DocCrdt`] and the [`CausalBusCore`]. Local edits
//! apply immediately, get stamped by the bus, and start a wave; envelopes
//! delivered by the wave layer come back in through [`SessionRequest::Deliver`]
//! and are released to the document in causal order. The session also serves
//! state transfers for joiners and keeps the snapshot store and autosave
//! file current.

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use tandem_core::{DocCrdt, DocError, DocSnapshot, Envelope, Op, PeerId};
use tandem_proto::{BusSnapshot, CausalBusCore};

use crate::autosave::Autosave;
use crate::emitter::{EventEmitter, InitPayload};
use crate::store::SnapshotStore;
use crate::wave::WaveRequest;

pub enum SessionRequest {
    LocalInsert {
        index: usize,
        value: char,
        reply: oneshot::Sender<Result<(), DocError>>,
    },
    LocalDelete {
        index: usize,
        reply: oneshot::Sender<Result<(), DocError>>,
    },
    Text {
        reply: oneshot::Sender<String>,
    },
    ClientId {
        reply: oneshot::Sender<PeerId>,
    },
    /// The full editor bootstrap payload (id, content, neighbor list).
    Init {
        reply: oneshot::Sender<InitPayload>,
    },
    /// An envelope surfaced by the wave layer.
    Deliver {
        envelope: Envelope,
    },
    /// Full state for a joiner, served to the mesh actor.
    State {
        reply: oneshot::Sender<(DocSnapshot, BusSnapshot)>,
    },
    InstallDoc {
        snapshot: DocSnapshot,
    },
    InstallClocks {
        snapshot: BusSnapshot,
    },
    /// The mesh's neighbor set changed; re-announce to the editor.
    NeighborsChanged {
        neighbors: Vec<PeerId>,
    },
}

/// Cloneable requester for the session mailbox.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionRequest>,
}

impl SessionHandle {
    #[must_use]
    pub fn new(tx: mpsc::Sender<SessionRequest>) -> Self {
        Self { tx }
    }

    #[must_use]
    pub fn sender(&self) -> mpsc::Sender<SessionRequest> {
        self.tx.clone()
    }

    /// Inserts `value` after the `index`-th live character (0 = front).
    ///
    /// # Errors
    ///
    /// [`DocError::IndexOutOfRange`] from the document contract, or when the
    /// session is gone.
    pub async fn local_insert(&self, index: usize, value: char) -> Result<(), DocError> {
        let (reply, rx) = oneshot::channel();
        let _ = self
            .tx
            .send(SessionRequest::LocalInsert {
                index,
                value,
                reply,
            })
            .await;
        rx.await
            .unwrap_or(Err(DocError::IndexOutOfRange { index, len: 0 }))
    }

    /// Deletes the `index`-th live character (1-based).
    ///
    /// # Errors
    ///
    /// [`DocError::IndexOutOfRange`] from the document contract, or when the
    /// session is gone.
    pub async fn local_delete(&self, index: usize) -> Result<(), DocError> {
        let (reply, rx) = oneshot::channel();
        let _ = self
            .tx
            .send(SessionRequest::LocalDelete { index, reply })
            .await;
        rx.await
            .unwrap_or(Err(DocError::IndexOutOfRange { index, len: 0 }))
    }

    pub async fn text(&self) -> String {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(SessionRequest::Text { reply }).await;
        rx.await.unwrap_or_default()
    }

    pub async fn client_id(&self) -> Option<PeerId> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(SessionRequest::ClientId { reply }).await;
        rx.await.ok()
    }

    pub async fn init_payload(&self) -> Option<InitPayload> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(SessionRequest::Init { reply }).await;
        rx.await.ok()
    }

    pub async fn state(&self) -> Option<(DocSnapshot, BusSnapshot)> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(SessionRequest::State { reply }).await;
        rx.await.ok()
    }
}

/// Actor owning one replica and its causal bus.
pub struct SessionActor<E: EventEmitter> {
    doc: DocCrdt,
    bus: CausalBusCore,
    request_rx: mpsc::Receiver<SessionRequest>,
    wave_tx: mpsc::Sender<WaveRequest>,
    emitter: E,
    autosave: Option<Autosave>,
    store: Option<SnapshotStore>,
    neighbors: Vec<PeerId>,
}

impl<E: EventEmitter> SessionActor<E> {
    pub fn new(
        doc: DocCrdt,
        bus: CausalBusCore,
        request_rx: mpsc::Receiver<SessionRequest>,
        wave_tx: mpsc::Sender<WaveRequest>,
        emitter: E,
        autosave: Option<Autosave>,
        store: Option<SnapshotStore>,
    ) -> Self {
        Self {
            doc,
            bus,
            request_rx,
            wave_tx,
            emitter,
            autosave,
            store,
            neighbors: Vec::new(),
        }
    }

    pub async fn run(mut self) {
        while let Some(request) = self.request_rx.recv().await {
            self.handle(request).await;
        }
        if let Some(autosave) = &mut self.autosave {
            autosave.flush(&self.doc.to_text()).await;
        }
        info!(peer = %self.doc.peer(), "session shutting down");
    }

    async fn handle(&mut self, request: SessionRequest) {
        match request {
            SessionRequest::LocalInsert {
                index,
                value,
                reply,
            } => {
                let result = self.local_insert(index, value).await;
                let _ = reply.send(result);
            }
            SessionRequest::LocalDelete { index, reply } => {
                let result = self.local_delete(index).await;
                let _ = reply.send(result);
            }
            SessionRequest::Text { reply } => {
                let _ = reply.send(self.doc.to_text());
            }
            SessionRequest::ClientId { reply } => {
                let _ = reply.send(self.doc.peer().clone());
            }
            SessionRequest::Init { reply } => {
                let _ = reply.send(self.init_payload());
            }
            SessionRequest::Deliver { envelope } => {
                let released = self.bus.receive(envelope);
                self.apply_released(released);
            }
            SessionRequest::State { reply } => {
                let _ = reply.send((self.doc.snapshot(), self.bus.snapshot()));
            }
            SessionRequest::InstallDoc { snapshot } => {
                self.install_doc(snapshot).await;
            }
            SessionRequest::InstallClocks { snapshot } => {
                let released = self.bus.install(snapshot);
                self.apply_released(released);
                self.persist();
            }
            SessionRequest::NeighborsChanged { neighbors } => {
                self.neighbors = neighbors;
                self.emitter.emit_init(&self.init_payload());
            }
        }
    }

    async fn local_insert(&mut self, index: usize, value: char) -> Result<(), DocError> {
        let ch = self.doc.insert_local(index, value).inspect_err(|e| {
            self.emitter.emit_error(&e.to_string());
        })?;
        let envelope = self.bus.broadcast(Op::Insert(ch));
        let _ = self.wave_tx.send(WaveRequest::Start { envelope }).await;
        self.after_local_edit().await;
        Ok(())
    }

    async fn local_delete(&mut self, index: usize) -> Result<(), DocError> {
        let id = self.doc.delete_local(index).inspect_err(|e| {
            self.emitter.emit_error(&e.to_string());
        })?;
        let envelope = self.bus.broadcast(Op::Delete(id));
        let _ = self.wave_tx.send(WaveRequest::Start { envelope }).await;
        self.after_local_edit().await;
        Ok(())
    }

    async fn after_local_edit(&mut self) {
        self.persist();
        if let Some(autosave) = &mut self.autosave {
            autosave.note_edit(&self.doc.to_text()).await;
        }
    }

    fn apply_released(&mut self, released: Vec<Envelope>) {
        if released.is_empty() {
            return;
        }
        for envelope in released {
            match envelope.payload {
                Op::Insert(ch) => {
                    let value = ch.value;
                    if let Some(index) = self.doc.apply_remote_insert(ch)
                        && let Some(value) = value
                    {
                        self.emitter.emit_remote_insert(index, value);
                    }
                }
                Op::Delete(id) => {
                    if let Some(index) = self.doc.apply_remote_delete(&id) {
                        self.emitter.emit_remote_delete(index);
                    }
                }
            }
        }
        self.persist();
    }

    async fn install_doc(&mut self, snapshot: DocSnapshot) {
        debug!(chars = snapshot.chars.len(), "installing document snapshot");
        self.doc = DocCrdt::restore(self.doc.peer().clone(), snapshot);
        self.persist();
        let text = self.doc.to_text();
        if let Some(autosave) = &mut self.autosave {
            autosave.flush(&text).await;
        }
        self.emitter.emit_init(&self.init_payload());
    }

    fn init_payload(&self) -> InitPayload {
        InitPayload {
            client_id: self.doc.peer().to_string(),
            content: self.doc.to_text(),
            neighbors: self.neighbors.iter().map(ToString::to_string).collect(),
        }
    }

    fn persist(&self) {
        let Some(store) = &self.store else { return };
        if let Err(e) = store.put_doc(self.doc.peer(), &self.doc.snapshot()) {
            warn!(error = %e, "failed to persist document snapshot");
        }
        if let Err(e) = store.put_bus(self.doc.peer(), &self.bus.snapshot()) {
            warn!(error = %e, "failed to persist bus counters");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct RecordingEmitter {
        events: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingEmitter {
        fn drain(&self) -> Vec<String> {
            std::mem::take(&mut *self.events.lock().unwrap())
        }
    }

    impl EventEmitter for RecordingEmitter {
        fn emit_init(&self, payload: &InitPayload) {
            self.events
                .lock()
                .unwrap()
                .push(format!("init:{}", payload.content));
        }
        fn emit_remote_insert(&self, index: usize, value: char) {
            self.events
                .lock()
                .unwrap()
                .push(format!("ins:{index}:{value}"));
        }
        fn emit_remote_delete(&self, index: usize) {
            self.events.lock().unwrap().push(format!("del:{index}"));
        }
        fn emit_error(&self, message: &str) {
            self.events.lock().unwrap().push(format!("err:{message}"));
        }
    }

    fn peer(s: &str) -> PeerId {
        PeerId::parse(s).unwrap()
    }

    fn spawn_session(
        id: &str,
    ) -> (
        SessionHandle,
        mpsc::Receiver<WaveRequest>,
        RecordingEmitter,
    ) {
        let p = peer(id);
        let (session_tx, session_rx) = mpsc::channel(64);
        let (wave_tx, wave_rx) = mpsc::channel(64);
        let emitter = RecordingEmitter::default();
        let actor = SessionActor::new(
            DocCrdt::with_seed(p.clone(), 42),
            CausalBusCore::new(p),
            session_rx,
            wave_tx,
            emitter.clone(),
            None,
            None,
        );
        tokio::spawn(actor.run());
        (SessionHandle::new(session_tx), wave_rx, emitter)
    }

    #[tokio::test]
    async fn local_edits_start_waves() {
        let (session, mut waves, _emitter) = spawn_session("a@1.1.1.1");
        session.local_insert(0, 'h').await.unwrap();
        session.local_insert(1, 'i').await.unwrap();
        assert_eq!(session.text().await, "hi");

        let Some(WaveRequest::Start { envelope }) = waves.recv().await else {
            panic!("expected a wave start");
        };
        assert!(matches!(envelope.payload, Op::Insert(_)));
        assert!(waves.recv().await.is_some());
    }

    #[tokio::test]
    async fn out_of_range_edit_reports_and_leaves_state() {
        let (session, _waves, _emitter) = spawn_session("a@1.1.1.1");
        session.local_insert(0, 'x').await.unwrap();
        assert!(session.local_insert(5, 'y').await.is_err());
        assert!(session.local_delete(2).await.is_err());
        assert_eq!(session.text().await, "x");
    }

    #[tokio::test]
    async fn delivered_envelopes_apply_and_notify() {
        let (session, _waves, emitter) = spawn_session("b@1.1.1.1");

        let a = peer("a@1.1.1.1");
        let mut doc_a = DocCrdt::with_seed(a.clone(), 7);
        let mut bus_a = CausalBusCore::new(a);
        let ch = doc_a.insert_local(0, 'z').unwrap();
        let envelope = bus_a.broadcast(Op::Insert(ch));

        session
            .sender()
            .send(SessionRequest::Deliver { envelope })
            .await
            .unwrap();
        assert_eq!(session.text().await, "z");
        assert_eq!(emitter.drain(), vec!["ins:1:z".to_string()]);
    }

    #[tokio::test]
    async fn install_doc_replaces_content_and_emits_init() {
        let (session, _waves, emitter) = spawn_session("c@1.1.1.1");
        session.local_insert(0, 'q').await.unwrap();

        let a = peer("a@1.1.1.1");
        let mut donor = DocCrdt::with_seed(a, 3);
        for (i, ch) in "hello".chars().enumerate() {
            donor.insert_local(i, ch).unwrap();
        }
        session
            .sender()
            .send(SessionRequest::InstallDoc {
                snapshot: donor.snapshot(),
            })
            .await
            .unwrap();
        assert_eq!(session.text().await, "hello");
        assert!(emitter.drain().contains(&"init:hello".to_string()));
    }

    #[tokio::test]
    async fn neighbor_updates_reannounce() {
        let (session, _waves, emitter) = spawn_session("a@1.1.1.1");
        session
            .sender()
            .send(SessionRequest::NeighborsChanged {
                neighbors: vec![peer("b@1.1.1.1")],
            })
            .await
            .unwrap();
        let payload = session.init_payload().await.unwrap();
        assert_eq!(payload.neighbors, vec!["b@1.1.1.1".to_string()]);
        assert_eq!(emitter.drain(), vec!["init:".to_string()]);
    }
}
