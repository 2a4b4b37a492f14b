//! Convergence over the real TCP transport.
//!
//! Peers share one port and are told apart by distinct loopback addresses,
//! so this exercises the handshake, framing, and connection lifecycle end
//! to end on one machine.

use tandem_core::PeerId;
use tandem_peer::{JoinMode, Peer, PeerConfig, TcpRuntime};
use tandem_testing::{capturing_emitter, eventually, init_tracing, wait_for_text};

const PORT: u16 = 4719;

async fn spawn_tcp_peer(id: &str) -> Peer {
    let peer_id = PeerId::parse(id).expect("valid test peer id");
    let (runtime, events) = TcpRuntime::bind(peer_id, PORT)
        .await
        .expect("bind loopback alias");
    let (emitter, _editor_events) = capturing_emitter();
    Peer::spawn(runtime, events, emitter, PeerConfig::default())
}

#[tokio::test(flavor = "multi_thread")]
async fn two_peers_converge_over_tcp() {
    let _guard = init_tracing();
    let a = spawn_tcp_peer("a@127.0.0.2").await;
    let b = spawn_tcp_peer("b@127.0.0.3").await;

    a.mesh.join(b.id.clone(), JoinMode::NoAsk).await.unwrap();

    a.session.local_insert(0, 't').await.unwrap();
    a.session.local_insert(1, 'c').await.unwrap();
    a.session.local_insert(2, 'p').await.unwrap();

    wait_for_text(&a.session, "tcp").await;
    wait_for_text(&b.session, "tcp").await;

    // And back the other way.
    assert!(eventually(|| async { b.mesh.neighbors().await.contains(&a.id) }).await);
    b.session.local_insert(0, '>').await.unwrap();
    wait_for_text(&a.session, ">tcp").await;
}

#[tokio::test(flavor = "multi_thread")]
async fn connect_to_absent_peer_is_refused() {
    let _guard = init_tracing();
    let a = spawn_tcp_peer("lone@127.0.0.4").await;
    let ghost = PeerId::parse("ghost@127.0.0.5").unwrap();
    assert!(a.mesh.join(ghost, JoinMode::Ask).await.is_err());
}
