//! Tandem peer process
//!
//! Boots one collaboration peer: restores state from the snapshot store,
//! binds the TCP peer transport, spawns the actor stack, and serves the
//! editor front-end (WebSocket + HTTP API) until interrupted. On Ctrl-C
//! the peer leaves the mesh gracefully, stitching its neighbors together.

mod api;
mod config;
mod protocol;
mod ws;

use std::time::Duration;

use clap::Parser;
use tokio::sync::broadcast;
use tracing::{error, info};

use tandem_core::PeerId;
use tandem_peer::{Autosave, MeshHandle, Peer, PeerConfig, SnapshotStore, TcpRuntime};

use crate::config::Args;
use crate::ws::{AppState, WsEmitter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let peer_id = PeerId::parse(&format!("{}@{}", args.name, args.host))?;
    info!(%peer_id, "starting peer");

    std::fs::create_dir_all(&args.save_dir)?;
    let store = match SnapshotStore::open(args.save_dir.join("snapshots")).await {
        Ok(store) => Some(store),
        Err(e) => {
            error!(error = %e, "snapshot store unavailable, continuing in memory");
            None
        }
    };
    let autosave = Autosave::new(&args.save_dir, &args.name, args.autosave_threshold);

    let (runtime, events) = TcpRuntime::bind(peer_id.clone(), args.api_port).await?;

    let (updates, _) = broadcast::channel(256);
    let emitter = WsEmitter::new(updates.clone());
    let peer = Peer::spawn(
        runtime,
        events,
        emitter,
        PeerConfig {
            retry_interval: Duration::from_secs(args.retry_interval_secs),
            autosave: Some(autosave),
            store,
            ..PeerConfig::default()
        },
    );

    let state = AppState {
        session: peer.session.clone(),
        mesh: peer.mesh.clone(),
        updates,
    };
    let app = ws::router(state.clone()).merge(api::router(state));

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", args.frontend_port)).await?;
    info!(port = args.frontend_port, "front-end listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown(peer.mesh.clone()))
        .await?;
    Ok(())
}

/// Waits for Ctrl-C, then repairs the mesh around this peer before the
/// process exits.
async fn shutdown(mesh: MeshHandle) {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    info!("interrupt received, leaving mesh gracefully");
    mesh.leave_all().await;
}
