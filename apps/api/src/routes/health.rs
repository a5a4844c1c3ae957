use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// GET /health
/// Returns service status, version, storage backend and resumes in flight.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": env!("CARGO_PKG_NAME"),
        "storage": if state.config.database_url.is_some() { "postgres" } else { "memory" },
        "jobs_in_flight": state.jobs.len(),
    }))
}
