//! TCP peer runtime.
//!
//! Every peer listens on the shared API port; the host part of a [`PeerId`]
//! addresses its machine. Connections are length-delimited postcard frames,
//! opened with a `Hello` exchange so each side learns the other's id before
//! any link traffic flows.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use tandem_core::{PeerId, PostcardCodec};
use tandem_proto::LinkFrame;

use crate::runtime::{ConnectOutcome, PeerRuntime, RuntimeEvent};

/// First frame each way identifies the sender; everything after is link
/// traffic.
#[derive(Debug, Clone, Serialize, Deserialize)]
enum WireFrame {
    Hello { peer: PeerId },
    Link(LinkFrame),
}

type Conn = Framed<TcpStream, PostcardCodec<WireFrame>>;
type ConnSink = SplitSink<Conn, WireFrame>;
type ConnStream = SplitStream<Conn>;

struct Inner {
    local: PeerId,
    port: u16,
    conns: Mutex<HashMap<PeerId, mpsc::Sender<LinkFrame>>>,
    events: mpsc::UnboundedSender<RuntimeEvent>,
}

/// TCP implementation of the peer runtime.
#[derive(Clone)]
pub struct TcpRuntime {
    inner: Arc<Inner>,
}

impl TcpRuntime {
    /// Binds the listener on the host address embedded in `local` and
    /// starts accepting inbound peers. Every peer of a mesh shares the
    /// same port; the id's host part tells them apart.
    ///
    /// # Errors
    ///
    /// Any I/O error binding the listener, or a peer id whose host part is
    /// not a routable IPv4 address.
    pub async fn bind(
        local: PeerId,
        port: u16,
    ) -> io::Result<(Self, mpsc::UnboundedReceiver<RuntimeEvent>)> {
        let Some(host) = local.host() else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "peer id host is not a routable IPv4 address",
            ));
        };
        let listener = TcpListener::bind((host, port)).await?;
        info!(peer = %local, port, "peer transport listening");
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let runtime = Self {
            inner: Arc::new(Inner {
                local,
                port,
                conns: Mutex::new(HashMap::new()),
                events: events_tx,
            }),
        };
        let acceptor = runtime.clone();
        tokio::spawn(acceptor.accept_loop(listener));
        Ok((runtime, events_rx))
    }

    async fn accept_loop(self, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let runtime = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = runtime.handle_incoming(stream).await {
                            debug!(%addr, error = %e, "inbound connection failed");
                        }
                    });
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                }
            }
        }
    }

    async fn handle_incoming(self, stream: TcpStream) -> io::Result<()> {
        let mut framed = Framed::new(stream, PostcardCodec::<WireFrame>::new());
        let Some(first) = framed.next().await else {
            return Ok(());
        };
        let WireFrame::Hello { peer } = first? else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "expected hello frame",
            ));
        };
        framed
            .send(WireFrame::Hello {
                peer: self.inner.local.clone(),
            })
            .await?;
        self.register(peer, framed, true).await;
        Ok(())
    }

    /// Installs a handshaken connection: a writer task draining an outbound
    /// queue, and a reader task feeding the event stream.
    async fn register(&self, peer: PeerId, framed: Conn, inbound: bool) {
        let (sink, stream) = framed.split();
        let (frame_tx, frame_rx) = mpsc::channel::<LinkFrame>(256);
        // A reconnect replaces the previous entry; dropping the old sender
        // shuts its writer down.
        self.inner.conns.lock().await.insert(peer.clone(), frame_tx);

        tokio::spawn(write_loop(sink, frame_rx));
        let runtime = self.clone();
        tokio::spawn(runtime.read_loop(peer.clone(), stream));

        if inbound {
            let _ = self.inner.events.send(RuntimeEvent::Connected(peer));
        }
    }

    async fn read_loop(self, peer: PeerId, mut stream: ConnStream) {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(WireFrame::Link(frame)) => {
                    let _ = self.inner.events.send(RuntimeEvent::Frame {
                        from: peer.clone(),
                        frame,
                    });
                }
                Ok(WireFrame::Hello { .. }) => {
                    debug!(%peer, "unexpected mid-stream hello, ignoring");
                }
                Err(e) => {
                    debug!(%peer, error = %e, "read failed, closing");
                    break;
                }
            }
        }
        if self.inner.conns.lock().await.remove(&peer).is_some() {
            let _ = self.inner.events.send(RuntimeEvent::Disconnected(peer));
        }
    }
}

async fn write_loop(mut sink: ConnSink, mut frames: mpsc::Receiver<LinkFrame>) {
    while let Some(frame) = frames.recv().await {
        if sink.send(WireFrame::Link(frame)).await.is_err() {
            break;
        }
    }
    let _ = sink.close().await;
}

impl PeerRuntime for TcpRuntime {
    fn local_id(&self) -> &PeerId {
        &self.inner.local
    }

    async fn connect(&self, peer: &PeerId) -> ConnectOutcome {
        if self.inner.conns.lock().await.contains_key(peer) {
            return ConnectOutcome::AlreadyConnected;
        }
        let Some(host) = peer.host() else {
            return ConnectOutcome::Refused;
        };
        let stream = match TcpStream::connect((host, self.inner.port)).await {
            Ok(stream) => stream,
            Err(e) => {
                debug!(%peer, error = %e, "connect failed");
                return ConnectOutcome::Refused;
            }
        };
        let mut framed = Framed::new(stream, PostcardCodec::<WireFrame>::new());
        if framed
            .send(WireFrame::Hello {
                peer: self.inner.local.clone(),
            })
            .await
            .is_err()
        {
            return ConnectOutcome::Refused;
        }
        match framed.next().await {
            Some(Ok(WireFrame::Hello { .. })) => {}
            _ => return ConnectOutcome::Refused,
        }
        self.register(peer.clone(), framed, false).await;
        ConnectOutcome::Connected
    }

    async fn disconnect(&self, peer: &PeerId) {
        // Dropping the sender ends the writer, which closes the socket; the
        // remote side notices through its reader.
        self.inner.conns.lock().await.remove(peer);
    }

    async fn send(&self, to: &PeerId, frame: LinkFrame) -> bool {
        let sender = self.inner.conns.lock().await.get(to).cloned();
        match sender {
            Some(sender) => sender.send(frame).await.is_ok(),
            None => false,
        }
    }
}
