//! Operator endpoint. `GET /status` lists the seated players, the board and the number of open
//! connections.

use crate::server_state::ServerState;
use crate::session::SessionSnapshot;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;

/// What `/status` answers.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub connections: usize,
    pub session: SessionSnapshot,
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/status", get(status_handler))
        .with_state(state)
}

/// Copies the session under its lock, the lock is released before the registry is asked.
pub async fn status_report(state: &ServerState) -> StatusReport {
    let session = state.session.lock().await.snapshot();
    StatusReport {
        connections: state.registry.len().await,
        session,
    }
}

async fn status_handler(State(state): State<Arc<ServerState>>) -> Json<StatusReport> {
    Json(status_report(&state).await)
}
