use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::{extract::State, Router};
use futures::Stream;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

use crate::response::AppError;
use crate::state::AppState;

const MAX_SSE_CONNECTIONS: usize = 32;

static SSE_CONNECTION_COUNT: AtomicUsize = AtomicUsize::new(0);

struct SseGuard;
impl Drop for SseGuard {
    fn drop(&mut self) {
        SSE_CONNECTION_COUNT.fetch_sub(1, Ordering::SeqCst);
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route("/events", get(sse_handler))
}

fn json_event<T: Serialize>(name: &str, payload: &T) -> Option<Event> {
    serde_json::to_string(payload)
        .ok()
        .map(|json| Event::default().event(name).data(json))
}

/// Pushes a `spam_state` event for every controller snapshot and a
/// `detector_status` event whenever the eye state flips.
pub async fn sse_handler(
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let current = SSE_CONNECTION_COUNT.fetch_add(1, Ordering::SeqCst);
    if current >= MAX_SSE_CONNECTIONS {
        SSE_CONNECTION_COUNT.fetch_sub(1, Ordering::SeqCst);
        return Err(AppError::too_many_requests("Too many SSE connections"));
    }

    let mut shutdown_rx = state.shutdown_rx();
    let mut snapshot_rx = state.controller().subscribe();
    let mut status_rx = state.detection().subscribe();

    let stream = async_stream::stream! {
        let _guard = SseGuard;

        // 连接建立时先推送一次当前状态
        if let Some(event) = json_event("spam_state", &state.controller().snapshot()) {
            yield Ok(event);
        }
        let mut last_eye_state = status_rx.borrow_and_update().eye_state;

        loop {
            tokio::select! {
                received = snapshot_rx.recv() => match received {
                    Ok(snapshot) => {
                        if let Some(event) = json_event("spam_state", &snapshot) {
                            yield Ok(event);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "SSE client lagging, skipped snapshots");
                    }
                    Err(RecvError::Closed) => break,
                },
                changed = status_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let status = status_rx.borrow_and_update().clone();
                    if status.eye_state != last_eye_state {
                        last_eye_state = status.eye_state;
                        if let Some(event) = json_event("detector_status", &status) {
                            yield Ok(event);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    break;
                }
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive"),
    ))
}
