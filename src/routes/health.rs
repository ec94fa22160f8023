use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(health_check))
        .route("/live", get(liveness))
        .route("/ready", get(readiness))
}

pub async fn health_check(State(state): State<AppState>) -> impl axum::response::IntoResponse {
    let status = state.detection().status();
    let store_healthy = state.store().load_calibration().is_ok();
    Json(serde_json::json!({
        "status": "ok",
        "uptimeSecs": state.uptime_secs(),
        "detector": {
            "isReady": status.is_ready,
            "isRunning": state.detection().is_running(),
            "error": status.error,
        },
        "spamActive": state.controller().is_active(),
        "store": {
            "healthy": store_healthy,
        }
    }))
}

pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// Ready once the frame scorer initialised and the loop is polling.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    if state.detection().status().is_ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
