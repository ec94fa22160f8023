use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::presenter::MediaPresenter;
use super::types::{classify_media, MediaKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedPopup {
    pub id: String,
    pub src: String,
    pub kind: MediaKind,
    pub created_at: DateTime<Utc>,
}

pub fn generate_popup_id() -> String {
    format!("popup-{}", uuid::Uuid::new_v4())
}

/// Controller-side bookkeeping of presented popups, oldest first.
pub struct VideoSpawner {
    presenter: Arc<dyn MediaPresenter>,
    popups: VecDeque<TrackedPopup>,
}

impl VideoSpawner {
    pub fn new(presenter: Arc<dyn MediaPresenter>) -> Self {
        Self {
            presenter,
            popups: VecDeque::new(),
        }
    }

    pub fn presenter(&self) -> &Arc<dyn MediaPresenter> {
        &self.presenter
    }

    pub fn tracked(&self) -> usize {
        self.popups.len()
    }

    pub fn popups(&self) -> impl Iterator<Item = &TrackedPopup> {
        self.popups.iter()
    }

    /// Present `src`, first evicting the oldest popups so the new one fits
    /// under `max_videos`. A presentation failure is logged and yields `None`.
    pub async fn spawn(&mut self, src: &str, max_videos: usize) -> Option<TrackedPopup> {
        self.evict_oldest_if_needed(max_videos).await;

        let id = generate_popup_id();
        if let Err(e) = self.presenter.present(src, &id).await {
            tracing::warn!(error = %e, media = %src, "Failed to spawn popup");
            return None;
        }

        let popup = TrackedPopup {
            id,
            src: src.to_string(),
            kind: classify_media(src),
            created_at: Utc::now(),
        };
        self.popups.push_back(popup.clone());
        tracing::debug!(
            popup_id = %popup.id,
            total = self.popups.len(),
            "Popup spawned"
        );
        Some(popup)
    }

    async fn evict_oldest_if_needed(&mut self, max_videos: usize) {
        // 上限被调低时，这里一次性淘汰到上限以下
        while self.popups.len() >= max_videos.max(1) {
            let Some(oldest) = self.popups.pop_front() else {
                break;
            };
            self.presenter.evict(&oldest.id).await;
            tracing::debug!(popup_id = %oldest.id, "Evicted oldest popup");
        }
    }

    pub async fn clear_all(&mut self) {
        tracing::info!(count = self.popups.len(), "Clearing all popups");
        if let Err(e) = self.presenter.clear_all().await {
            tracing::error!(error = %e, "Clear failed, evicting tracked popups individually");
            self.evict_each().await;
        }
        self.popups.clear();
    }

    pub async fn fade_out_all(&mut self, duration_ms: u64) {
        tracing::info!(count = self.popups.len(), duration_ms, "Fading out all popups");
        if let Err(e) = self.presenter.fade_all_then_clear(duration_ms).await {
            tracing::error!(error = %e, "Fade failed, falling back to clear");
            if let Err(e) = self.presenter.clear_all().await {
                tracing::error!(error = %e, "Fallback clear failed, evicting individually");
                self.evict_each().await;
            }
        }
        self.popups.clear();
    }

    async fn evict_each(&mut self) {
        for popup in self.popups.drain(..).collect::<Vec<_>>() {
            self.presenter.evict(&popup.id).await;
        }
    }
}
