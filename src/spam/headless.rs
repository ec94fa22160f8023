//! Headless presenters: no windows and no audio device.
//!
//! State is tracked in memory and every call is logged, so the daemon can
//! run without a display and tests can observe exactly what was presented.
//! Failure injection switches cover the error paths.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;

use super::presenter::{AudioPresenter, MediaPresenter, PresenterError};
use crate::constants::{AUDIO_FADE_OUT_MS, FADE_STEP_MS};

#[derive(Debug, Clone, PartialEq)]
pub struct HeadlessPopup {
    pub id: String,
    pub src: String,
    pub opacity: f64,
}

#[derive(Debug, Default)]
pub struct HeadlessMediaPresenter {
    popups: Mutex<Vec<HeadlessPopup>>,
    failing_media: Mutex<HashSet<String>>,
    fail_teardown: AtomicBool,
    peak: AtomicUsize,
    presented_total: AtomicUsize,
}

impl HeadlessMediaPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `present` of `media` fail.
    pub fn fail_media(&self, media: &str) {
        if let Ok(mut failing) = self.failing_media.lock() {
            failing.insert(media.to_string());
        }
    }

    /// Make `clear_all` and `fade_all_then_clear` fail.
    pub fn set_fail_teardown(&self, fail: bool) {
        self.fail_teardown.store(fail, Ordering::SeqCst);
    }

    pub fn popups(&self) -> Vec<HeadlessPopup> {
        self.popups.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn sources(&self) -> Vec<String> {
        self.popups().into_iter().map(|p| p.src).collect()
    }

    /// Highest number of simultaneously presented popups seen so far.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn presented_total(&self) -> usize {
        self.presented_total.load(Ordering::SeqCst)
    }

    fn remove_all(&self) -> usize {
        match self.popups.lock() {
            Ok(mut popups) => {
                let n = popups.len();
                popups.clear();
                n
            }
            Err(_) => 0,
        }
    }

    fn set_opacity(&self, opacity: f64) {
        if let Ok(mut popups) = self.popups.lock() {
            for popup in popups.iter_mut() {
                popup.opacity = opacity;
            }
        }
    }
}

impl MediaPresenter for HeadlessMediaPresenter {
    fn present<'a>(
        &'a self,
        media: &'a str,
        id: &'a str,
    ) -> BoxFuture<'a, Result<(), PresenterError>> {
        Box::pin(async move {
            let failing = self
                .failing_media
                .lock()
                .map(|f| f.contains(media))
                .unwrap_or(false);
            if failing {
                return Err(PresenterError::Present {
                    media: media.to_string(),
                    message: "media failed to load".to_string(),
                });
            }

            let mut popups = self
                .popups
                .lock()
                .map_err(|_| PresenterError::Teardown("popup registry poisoned".to_string()))?;
            popups.push(HeadlessPopup {
                id: id.to_string(),
                src: media.to_string(),
                opacity: 1.0,
            });
            self.peak.fetch_max(popups.len(), Ordering::SeqCst);
            self.presented_total.fetch_add(1, Ordering::SeqCst);
            tracing::info!(popup_id = %id, media = %media, count = popups.len(), "Presented popup");
            Ok(())
        })
    }

    fn evict<'a>(&'a self, id: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if let Ok(mut popups) = self.popups.lock() {
                popups.retain(|p| p.id != id);
            }
            tracing::info!(popup_id = %id, "Evicted popup");
        })
    }

    fn clear_all(&self) -> BoxFuture<'_, Result<(), PresenterError>> {
        Box::pin(async move {
            if self.fail_teardown.load(Ordering::SeqCst) {
                return Err(PresenterError::Teardown("clear rejected".to_string()));
            }
            let removed = self.remove_all();
            tracing::info!(removed, "Cleared all popups");
            Ok(())
        })
    }

    fn fade_all_then_clear(&self, duration_ms: u64) -> BoxFuture<'_, Result<(), PresenterError>> {
        Box::pin(async move {
            if self.fail_teardown.load(Ordering::SeqCst) {
                return Err(PresenterError::Teardown("fade rejected".to_string()));
            }
            let steps = (duration_ms / FADE_STEP_MS).max(1);
            for step in 1..=steps {
                tokio::time::sleep(Duration::from_millis(FADE_STEP_MS)).await;
                self.set_opacity(1.0 - step as f64 / steps as f64);
            }
            let removed = self.remove_all();
            tracing::info!(removed, duration_ms, "Faded out and cleared popups");
            Ok(())
        })
    }

    fn count(&self) -> usize {
        self.popups.lock().map(|p| p.len()).unwrap_or(0)
    }
}

#[derive(Debug)]
pub struct HeadlessAudioPresenter {
    current: Mutex<Option<String>>,
    playing: AtomicBool,
    volume: Mutex<f64>,
    fail_playback: AtomicBool,
    plays: AtomicUsize,
}

impl Default for HeadlessAudioPresenter {
    fn default() -> Self {
        Self {
            current: Mutex::new(None),
            playing: AtomicBool::new(false),
            volume: Mutex::new(1.0),
            fail_playback: AtomicBool::new(false),
            plays: AtomicUsize::new(0),
        }
    }
}

impl HeadlessAudioPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_playback(&self, fail: bool) {
        self.fail_playback.store(fail, Ordering::SeqCst);
    }

    pub fn current_track(&self) -> Option<String> {
        self.current.lock().ok().and_then(|c| c.clone())
    }

    pub fn volume(&self) -> f64 {
        self.volume.lock().map(|v| *v).unwrap_or(0.0)
    }

    pub fn play_count(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }

    fn set_volume(&self, volume: f64) {
        if let Ok(mut v) = self.volume.lock() {
            *v = volume;
        }
    }
}

impl AudioPresenter for HeadlessAudioPresenter {
    fn play<'a>(&'a self, track: &'a str) -> BoxFuture<'a, Result<(), PresenterError>> {
        Box::pin(async move {
            let same_track = self.current_track().as_deref() == Some(track);
            if same_track && self.is_playing() {
                return Ok(());
            }
            if self.fail_playback.load(Ordering::SeqCst) {
                return Err(PresenterError::Audio(format!("playback of {track} failed")));
            }
            if let Ok(mut current) = self.current.lock() {
                *current = Some(track.to_string());
            }
            self.set_volume(1.0);
            self.playing.store(true, Ordering::SeqCst);
            self.plays.fetch_add(1, Ordering::SeqCst);
            tracing::info!(track = %track, "Audio playing");
            Ok(())
        })
    }

    fn stop(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if !self.is_playing() {
                return;
            }
            let start_volume = self.volume();
            let steps = (AUDIO_FADE_OUT_MS / FADE_STEP_MS).max(1);
            for step in 1..=steps {
                tokio::time::sleep(Duration::from_millis(FADE_STEP_MS)).await;
                self.set_volume(start_volume * (1.0 - step as f64 / steps as f64));
            }
            self.playing.store(false, Ordering::SeqCst);
            self.set_volume(1.0);
            tracing::info!("Audio stopped");
        })
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }
}
