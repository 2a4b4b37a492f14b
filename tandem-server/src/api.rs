//! HTTP API and health check endpoints for the peer process.

use axum::Router;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;

use crate::ws::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/peer-id", get(peer_id))
        .route("/api/v1/neighbors", get(neighbors))
        .route("/api/v1/text", get(text))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn peer_id(State(state): State<AppState>) -> impl IntoResponse {
    let id = state
        .session
        .client_id()
        .await
        .map(|p| p.to_string())
        .unwrap_or_default();
    axum::Json(serde_json::json!({ "peer_id": id }))
}

async fn neighbors(State(state): State<AppState>) -> impl IntoResponse {
    let neighbors: Vec<String> = state
        .mesh
        .neighbors()
        .await
        .iter()
        .map(ToString::to_string)
        .collect();
    axum::Json(neighbors)
}

async fn text(State(state): State<AppState>) -> String {
    state.session.text().await
}
