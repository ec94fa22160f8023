use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::detection::DetectorStatus;
use crate::extractors::JsonBody;
use crate::response::{ok, AppError};
use crate::spam::{SpamConfig, SpamConfigPatch, SpamStateSnapshot};
use crate::state::AppState;
use crate::store::operations::media::MediaSettings;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/state", get(get_state))
        .route("/videos/clear", post(clear_videos))
        .route("/config", get(get_config).patch(update_config))
        .route("/files", get(get_files).put(set_files))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StateView {
    spam: SpamStateSnapshot,
    detector: DetectorStatus,
    config: SpamConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesBody {
    #[serde(default)]
    pub audio_file: Option<String>,
    #[serde(default)]
    pub video_files: Vec<String>,
}

fn persist_media(state: &AppState) -> Result<(), AppError> {
    let controller = state.controller();
    let settings = MediaSettings {
        audio_file: controller.audio_file(),
        video_files: controller.media_files(),
        spam_config: controller.config(),
    };
    state.store().save_media_settings(&settings)?;
    Ok(())
}

async fn get_state(State(state): State<AppState>) -> impl IntoResponse {
    ok(StateView {
        spam: state.controller().snapshot(),
        detector: state.detection().status(),
        config: state.controller().config(),
    })
}

/// Manual override; the session itself keeps running.
async fn clear_videos(State(state): State<AppState>) -> impl IntoResponse {
    state.controller().clear_all_videos().await;
    ok(state.controller().snapshot())
}

async fn get_config(State(state): State<AppState>) -> impl IntoResponse {
    ok(state.controller().config())
}

async fn update_config(
    State(state): State<AppState>,
    JsonBody(patch): JsonBody<SpamConfigPatch>,
) -> Result<impl IntoResponse, AppError> {
    let merged = state
        .controller()
        .set_config(&patch)
        .map_err(|reason| AppError::bad_request("INVALID_CONFIG", reason))?;
    persist_media(&state)?;
    Ok(ok(merged))
}

async fn get_files(State(state): State<AppState>) -> impl IntoResponse {
    ok(FilesBody {
        audio_file: state.controller().audio_file(),
        video_files: state.controller().media_files(),
    })
}

async fn set_files(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<FilesBody>,
) -> Result<impl IntoResponse, AppError> {
    let video_files: Vec<String> = body
        .video_files
        .into_iter()
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .collect();
    state.controller().set_files(body.audio_file, video_files);
    persist_media(&state)?;
    Ok(ok(FilesBody {
        audio_file: state.controller().audio_file(),
        video_files: state.controller().media_files(),
    }))
}
