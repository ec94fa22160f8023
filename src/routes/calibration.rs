use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::detection::{default_calibration, CalibrationData};
use crate::extractors::JsonBody;
use crate::response::{ok, AppError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/",
        get(get_calibration)
            .put(put_calibration)
            .delete(delete_calibration),
    )
}

/// Either a complete calibration run or a manual threshold override.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CalibrationUpdate {
    Full(CalibrationData),
    Manual { threshold: f64 },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CalibrationView {
    calibrated: bool,
    calibration: CalibrationData,
    active_threshold: f64,
}

async fn get_calibration(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let stored = state.store().load_calibration()?;
    Ok(ok(CalibrationView {
        calibrated: stored.is_some(),
        calibration: stored.unwrap_or_else(default_calibration),
        active_threshold: state.detection().threshold(),
    }))
}

async fn put_calibration(
    State(state): State<AppState>,
    JsonBody(update): JsonBody<CalibrationUpdate>,
) -> Result<impl IntoResponse, AppError> {
    let data = match update {
        CalibrationUpdate::Full(data) => data,
        CalibrationUpdate::Manual { threshold } => CalibrationData::manual(threshold),
    };
    // 先持久化再生效：保存失败时检测阈值保持不变
    state.store().save_calibration(&data)?;
    state.detection().calibrate(&data);
    Ok(ok(CalibrationView {
        calibrated: true,
        calibration: data,
        active_threshold: state.detection().threshold(),
    }))
}

/// Forget the stored record and fall back to the configured threshold.
async fn delete_calibration(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    state.store().clear_calibration()?;
    let fallback = CalibrationData {
        threshold: state.config().detection.threshold,
        ..default_calibration()
    };
    state.detection().calibrate(&fallback);
    Ok(ok(CalibrationView {
        calibrated: false,
        calibration: fallback,
        active_threshold: state.detection().threshold(),
    }))
}
