use crate::AppState;
use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

/// GET /health - store reachability and background work in flight
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    let mut status = json!({
        "status": "ok",
        "checks": {}
    });

    match &state.db_pool {
        Some(pool) => match sqlx::query("SELECT 1").fetch_one(pool).await {
            Ok(_) => {
                status["checks"]["database"] = json!("ok");
            }
            Err(e) => {
                tracing::error!("Health check database error: {}", e);
                status["checks"]["database"] = json!("unreachable");
                status["status"] = json!("error");
            }
        },
        None => {
            status["checks"]["database"] = json!("memory");
        }
    }

    status["checks"]["background_tasks"] = json!(state.tasks.in_flight());
    status["checks"]["matcher"] = json!(state.matcher.is_some());

    Json(status)
}
