//! Multi-peer scenarios over the in-memory transport.
//!
//! These drive whole peers (session, wave, link, mesh) through the public
//! handles, the way the editor adapter does, and assert on converged text,
//! notification streams, and wave completions. Neighbor updates propagate
//! asynchronously, so tests wait for the mesh to stabilize before editing.

use std::time::Duration;

use tandem_core::{Causality, PeerId};
use tandem_peer::{JoinMode, MeshHandle, PeerConfig};
use tandem_testing::{
    EditorEvent, MemoryHub, TestPeer, eventually, init_tracing, spawn_peer, spawn_peer_with,
    wait_for_text,
};

async fn wait_for_neighbors(mesh: &MeshHandle, expected: &[&PeerId]) {
    let ok = eventually(|| async {
        let neighbors = mesh.neighbors().await;
        expected.iter().all(|p| neighbors.contains(*p))
    })
    .await;
    assert!(ok, "mesh never stabilized to {expected:?}");
}

fn remote_events(peer: &mut TestPeer) -> Vec<EditorEvent> {
    let mut events = Vec::new();
    while let Ok(event) = peer.editor_events.try_recv() {
        match event {
            EditorEvent::RemoteInsert { .. } | EditorEvent::RemoteDelete { .. } => {
                events.push(event);
            }
            _ => {}
        }
    }
    events
}

/// Collects remote-op events until `count` arrived or the wait gives up.
async fn collect_remote_events(peer: &mut TestPeer, count: usize) -> Vec<EditorEvent> {
    let mut events = Vec::new();
    for _ in 0..200 {
        events.extend(remote_events(peer));
        if events.len() >= count {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    events
}

#[tokio::test(start_paused = true)]
async fn sequential_edits_converge() {
    let _guard = init_tracing();
    let hub = MemoryHub::new();
    let a = spawn_peer(&hub, "a@10.0.0.1");
    let b = spawn_peer(&hub, "b@10.0.0.2");

    a.peer
        .mesh
        .join(b.peer.id.clone(), JoinMode::NoAsk)
        .await
        .unwrap();

    a.peer.session.local_insert(0, 'H').await.unwrap();
    a.peer.session.local_insert(1, 'i').await.unwrap();

    wait_for_text(&a.peer.session, "Hi").await;
    wait_for_text(&b.peer.session, "Hi").await;
}

#[tokio::test(start_paused = true)]
async fn concurrent_inserts_at_same_slot_converge_deterministically() {
    let _guard = init_tracing();
    let hub = MemoryHub::new();
    let a = spawn_peer(&hub, "a@10.0.0.1");
    let b = spawn_peer(&hub, "b@10.0.0.2");

    a.peer
        .mesh
        .join(b.peer.id.clone(), JoinMode::NoAsk)
        .await
        .unwrap();
    wait_for_neighbors(&b.peer.mesh, &[&a.peer.id]).await;

    // Both peers insert into the empty document before seeing each other's
    // envelope.
    a.peer.session.local_insert(0, 'X').await.unwrap();
    b.peer.session.local_insert(0, 'Y').await.unwrap();

    assert!(
        eventually(|| async {
            let ta = a.peer.session.text().await;
            let tb = b.peer.session.text().await;
            ta.len() == 2 && ta == tb
        })
        .await,
        "peers never converged"
    );
    let text = a.peer.session.text().await;
    assert!(text == "XY" || text == "YX", "unexpected order {text:?}");
}

#[tokio::test(start_paused = true)]
async fn insert_then_delete_arrives_in_causal_order() {
    let _guard = init_tracing();
    let hub = MemoryHub::new();
    let a = spawn_peer(&hub, "a@10.0.0.1");
    let mut b = spawn_peer(&hub, "b@10.0.0.2");

    a.peer
        .mesh
        .join(b.peer.id.clone(), JoinMode::NoAsk)
        .await
        .unwrap();

    a.peer.session.local_insert(0, 'x').await.unwrap();
    a.peer.session.local_delete(1).await.unwrap();

    let events = collect_remote_events(&mut b, 2).await;
    assert_eq!(
        events,
        vec![
            EditorEvent::RemoteInsert { index: 1, value: 'x' },
            EditorEvent::RemoteDelete { index: 1 },
        ],
        "delete must apply after its insert"
    );
    wait_for_text(&a.peer.session, "").await;
    wait_for_text(&b.peer.session, "").await;
}

#[tokio::test(start_paused = true)]
async fn late_joiner_receives_full_state() {
    let _guard = init_tracing();
    let hub = MemoryHub::new();
    let a = spawn_peer(&hub, "a@10.0.0.1");
    let c = spawn_peer(&hub, "c@10.0.0.3");

    for (i, ch) in "hello".chars().enumerate() {
        a.peer.session.local_insert(i, ch).await.unwrap();
    }

    c.peer
        .mesh
        .join(a.peer.id.clone(), JoinMode::Ask)
        .await
        .unwrap();
    wait_for_text(&c.peer.session, "hello").await;

    let (_, bus_a) = a.peer.session.state().await.unwrap();
    let (_, bus_c) = c.peer.session.state().await.unwrap();
    assert!(
        bus_c.stamp.compare(&bus_a.stamp) == Causality::Equal,
        "joiner stamp {} != donor stamp {}",
        bus_c.stamp,
        bus_a.stamp
    );
    assert!(
        bus_c.delivered.compare(&bus_a.delivered) == Causality::Equal,
        "joiner delivered {} != donor delivered {}",
        bus_c.delivered,
        bus_a.delivered
    );

    // Edits after the handoff flow both ways.
    wait_for_neighbors(&a.peer.mesh, &[&c.peer.id]).await;
    c.peer.session.local_insert(5, '!').await.unwrap();
    wait_for_text(&a.peer.session, "hello!").await;
}

#[tokio::test(start_paused = true)]
async fn dropped_frame_is_retransmitted_and_applied_once() {
    let _guard = init_tracing();
    let hub = MemoryHub::new();
    let mut a = spawn_peer_with(
        &hub,
        "a@10.0.0.1",
        PeerConfig {
            retry_interval: Duration::from_millis(500),
            ..PeerConfig::default()
        },
    );
    let mut b = spawn_peer(&hub, "b@10.0.0.2");

    a.peer
        .mesh
        .join(b.peer.id.clone(), JoinMode::NoAsk)
        .await
        .unwrap();

    // The next frame from a to b (the wave token) vanishes in flight.
    hub.drop_frames(&a.peer.id, &b.peer.id, 1);
    a.peer.session.local_insert(0, 'm').await.unwrap();

    wait_for_text(&b.peer.session, "m").await;
    assert_eq!(hub.dropped_frames(), 1);

    // b's upper layer saw the insert exactly once despite the retry.
    let events = collect_remote_events(&mut b, 1).await;
    assert_eq!(
        events,
        vec![EditorEvent::RemoteInsert { index: 1, value: 'm' }]
    );

    // The wave still closed at the originator, counting both peers.
    let done = a.completions.recv().await.unwrap();
    assert_eq!(done.count, 2);
}

#[tokio::test(start_paused = true)]
async fn flood_reaches_every_peer_exactly_once() {
    let _guard = init_tracing();
    let hub = MemoryHub::new();
    let mut a = spawn_peer(&hub, "a@10.0.0.1");
    let mut b = spawn_peer(&hub, "b@10.0.0.2");
    let mut c = spawn_peer(&hub, "c@10.0.0.3");

    // Full triangle: the wave must suppress the duplicate via the cross edge.
    a.peer
        .mesh
        .join(b.peer.id.clone(), JoinMode::NoAsk)
        .await
        .unwrap();
    a.peer
        .mesh
        .join(c.peer.id.clone(), JoinMode::NoAsk)
        .await
        .unwrap();
    b.peer
        .mesh
        .join(c.peer.id.clone(), JoinMode::NoAsk)
        .await
        .unwrap();
    wait_for_neighbors(&a.peer.mesh, &[&b.peer.id, &c.peer.id]).await;
    wait_for_neighbors(&b.peer.mesh, &[&a.peer.id, &c.peer.id]).await;
    wait_for_neighbors(&c.peer.mesh, &[&a.peer.id, &b.peer.id]).await;

    a.peer.session.local_insert(0, 'z').await.unwrap();
    wait_for_text(&b.peer.session, "z").await;
    wait_for_text(&c.peer.session, "z").await;

    let done = a.completions.recv().await.unwrap();
    assert_eq!(done.count, 3, "wave must count every reached peer");

    for peer in [&mut b, &mut c] {
        let events = collect_remote_events(peer, 1).await;
        assert_eq!(
            events,
            vec![EditorEvent::RemoteInsert { index: 1, value: 'z' }],
            "each peer applies the envelope exactly once"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn graceful_leave_stitches_neighbors() {
    let _guard = init_tracing();
    let hub = MemoryHub::new();
    let a = spawn_peer(&hub, "a@10.0.0.1");
    let b = spawn_peer(&hub, "b@10.0.0.2");
    let c = spawn_peer(&hub, "c@10.0.0.3");

    // Line topology a - b - c; b is a cut vertex.
    a.peer
        .mesh
        .join(b.peer.id.clone(), JoinMode::NoAsk)
        .await
        .unwrap();
    c.peer
        .mesh
        .join(b.peer.id.clone(), JoinMode::NoAsk)
        .await
        .unwrap();
    wait_for_neighbors(&b.peer.mesh, &[&a.peer.id, &c.peer.id]).await;

    b.peer.mesh.leave_all().await;

    assert!(
        eventually(|| async { hub.are_connected(&a.peer.id, &c.peer.id) }).await,
        "stitch never connected a and c"
    );
    assert!(
        eventually(|| async {
            let neighbors = a.peer.mesh.neighbors().await;
            neighbors.contains(&c.peer.id) && !neighbors.contains(&b.peer.id)
        })
        .await,
        "a's neighbor set was not repaired"
    );

    // A broadcast from a now reaches c directly.
    a.peer.session.local_insert(0, 'q').await.unwrap();
    wait_for_text(&c.peer.session, "q").await;
}

#[tokio::test(start_paused = true)]
async fn interleaved_editing_sessions_converge() {
    let _guard = init_tracing();
    let hub = MemoryHub::new();
    let a = spawn_peer(&hub, "a@10.0.0.1");
    let b = spawn_peer(&hub, "b@10.0.0.2");

    a.peer
        .mesh
        .join(b.peer.id.clone(), JoinMode::NoAsk)
        .await
        .unwrap();
    wait_for_neighbors(&b.peer.mesh, &[&a.peer.id]).await;

    for (i, ch) in "abc".chars().enumerate() {
        a.peer.session.local_insert(i, ch).await.unwrap();
    }
    for (i, ch) in "xyz".chars().enumerate() {
        b.peer.session.local_insert(i, ch).await.unwrap();
    }

    assert!(
        eventually(|| async {
            let ta = a.peer.session.text().await;
            let tb = b.peer.session.text().await;
            ta.len() == 6 && ta == tb
        })
        .await,
        "six-character merge never converged"
    );

    // Concurrent deletes of the same converged index target the same
    // character; idempotence keeps the replicas identical.
    a.peer.session.local_delete(3).await.unwrap();
    b.peer.session.local_delete(3).await.unwrap();

    assert!(
        eventually(|| async {
            let ta = a.peer.session.text().await;
            let tb = b.peer.session.text().await;
            ta.len() == 5 && ta == tb
        })
        .await,
        "deletes never converged"
    );
}

#[tokio::test(start_paused = true)]
async fn join_refused_for_unknown_peer() {
    let _guard = init_tracing();
    let hub = MemoryHub::new();
    let a = spawn_peer(&hub, "a@10.0.0.1");
    let ghost = PeerId::parse("ghost@10.0.0.9").unwrap();
    assert!(a.peer.mesh.join(ghost, JoinMode::Ask).await.is_err());
    assert!(a.peer.mesh.neighbors().await.is_empty());
}
