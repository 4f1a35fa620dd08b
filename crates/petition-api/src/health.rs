use axum::{Json, extract::State};
use serde_json::{Value, json};
use tracing::error;

use crate::state::AppState;

/// Reports whether the store answers, plus the running version.
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let database = match state.run_db(|db| db.ping()).await {
        Ok(()) => "connected",
        Err(e) => {
            error!("Database health check failed: {:#}", e);
            "disconnected"
        }
    };

    Json(json!({
        "status": if database == "connected" { "healthy" } else { "unhealthy" },
        "database": database,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
