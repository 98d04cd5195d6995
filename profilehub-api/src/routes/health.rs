/// Health check endpoint
///
/// ```text
/// GET /health
/// ```
///
/// ```json
/// { "status": "healthy", "version": "0.1.0", "database": "connected" }
/// ```
///
/// `status` becomes `degraded` and `database` becomes `disconnected` when the
/// database does not answer. The endpoint itself always returns 200.

use crate::app::AppState;
use axum::{extract::State, Json};
use profilehub_shared::db::pool::health_check as ping_database;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: String,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let connected = match ping_database(&state.db).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Database health check failed");
            false
        }
    };

    Json(HealthResponse {
        status: if connected { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: if connected { "connected" } else { "disconnected" }.to_string(),
    })
}
