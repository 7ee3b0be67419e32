use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// GET /healthz - Liveness
pub async fn healthz(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime": state.started_at.elapsed().as_secs(),
    }))
}

/// GET /readyz - Readiness with per-dependency state
pub async fn readyz(State(state): State<AppState>) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let db_ok = sqlx::query("SELECT 1").fetch_one(&state.db).await.is_ok();
    let queue_ok = state.queue.healthy().await;

    let dependencies = json!({
        "database": if db_ok { "connected" } else { "unavailable" },
        "queue": if queue_ok { "connected" } else { "unavailable" },
    });

    if db_ok && queue_ok {
        Ok(Json(json!({ "status": "ready", "dependencies": dependencies })))
    } else {
        Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "not_ready", "dependencies": dependencies })),
        ))
    }
}
