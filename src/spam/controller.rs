//! 惩罚升级控制器
//!
//! IDLE ⇄ ACTIVE 两状态。闭眼进入 ACTIVE：立即弹出一个窗口、播放音频、
//! 启动升级定时器；每个 tick 升级一级并按间隔错开弹出一批窗口。
//! 睁眼回到 IDLE：停止音频和定时器，按配置清除/淡出/保留窗口。
//!
//! Every session carries a generation id. Staggered spawns capture it when
//! scheduled and re-check it, together with the active flag, right before
//! presenting; a spawn whose session has ended is dropped.

use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::BoxFuture;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::fairness::MediaPool;
use super::presenter::{AudioPresenter, MediaPresenter};
use super::spawner::VideoSpawner;
use super::types::{
    EscalationTiming, SpamConfig, SpamConfigPatch, SpamStateSnapshot, VideoBehavior,
};
use crate::detection::EyeEventSink;

const SNAPSHOT_CHANNEL_CAPACITY: usize = 64;

struct Session {
    is_active: bool,
    escalation_level: u32,
    closed_start: Option<Instant>,
    generation: u64,
    config: SpamConfig,
    pool: MediaPool,
    audio_track: Option<String>,
    escalation_task: Option<JoinHandle<()>>,
}

struct Shared {
    session: Mutex<Session>,
    spawner: tokio::sync::Mutex<VideoSpawner>,
    // 串行化闭眼/睁眼处理：新的闭眼事件必须等旧会话的清理完成
    transition: tokio::sync::Mutex<()>,
    presenter: Arc<dyn MediaPresenter>,
    audio: Arc<dyn AudioPresenter>,
    timing: EscalationTiming,
    snapshot_tx: broadcast::Sender<SpamStateSnapshot>,
}

impl Shared {
    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn snapshot(&self) -> SpamStateSnapshot {
        let session = self.session();
        let closed_duration_ms = session
            .closed_start
            .map(|start| {
                let ms = Instant::now().saturating_duration_since(start).as_millis();
                u64::try_from(ms).unwrap_or(u64::MAX)
            })
            .unwrap_or(0);
        SpamStateSnapshot {
            is_active: session.is_active,
            escalation_level: session.escalation_level,
            closed_duration_ms,
            spawn_rate: self.timing.burst_size(session.escalation_level),
            active_videos: self.presenter.count(),
            max_videos: session.config.max_videos,
        }
    }

    fn publish(&self) {
        let snapshot = self.snapshot();
        tracing::debug!(
            is_active = snapshot.is_active,
            escalation_level = snapshot.escalation_level,
            active_videos = snapshot.active_videos,
            "Spam state changed"
        );
        // 没有订阅者时 send 返回错误，属于正常情况
        let _ = self.snapshot_tx.send(snapshot);
    }
}

/// Top-level orchestrator reacting to eye transitions. Cheap to clone.
#[derive(Clone)]
pub struct SpamController {
    shared: Arc<Shared>,
}

impl SpamController {
    pub fn new(
        presenter: Arc<dyn MediaPresenter>,
        audio: Arc<dyn AudioPresenter>,
        config: SpamConfig,
        timing: EscalationTiming,
    ) -> Self {
        let (snapshot_tx, _) = broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY);
        let shared = Shared {
            session: Mutex::new(Session {
                is_active: false,
                escalation_level: 0,
                closed_start: None,
                generation: 0,
                config,
                pool: MediaPool::default(),
                audio_track: None,
                escalation_task: None,
            }),
            spawner: tokio::sync::Mutex::new(VideoSpawner::new(presenter.clone())),
            transition: tokio::sync::Mutex::new(()),
            presenter,
            audio,
            timing,
            snapshot_tx,
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    pub fn snapshot(&self) -> SpamStateSnapshot {
        self.shared.snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SpamStateSnapshot> {
        self.shared.snapshot_tx.subscribe()
    }

    pub fn config(&self) -> SpamConfig {
        self.shared.session().config
    }

    pub fn timing(&self) -> EscalationTiming {
        self.shared.timing
    }

    pub fn is_active(&self) -> bool {
        self.shared.session().is_active
    }

    pub fn generation(&self) -> u64 {
        self.shared.session().generation
    }

    pub fn media_files(&self) -> Vec<String> {
        self.shared.session().pool.items().to_vec()
    }

    pub fn audio_file(&self) -> Option<String> {
        self.shared.session().audio_track.clone()
    }

    pub fn usage_of(&self, media: &str) -> Option<u32> {
        self.shared.session().pool.usage_of(media)
    }

    /// Merge a partial config. A lowered `maxVideos` is enforced at the next
    /// spawn, not retroactively.
    pub fn set_config(&self, patch: &SpamConfigPatch) -> Result<SpamConfig, &'static str> {
        let merged = {
            let mut session = self.shared.session();
            let merged = session.config.merged(patch)?;
            session.config = merged;
            merged
        };
        tracing::info!(
            max_videos = merged.max_videos,
            video_behavior = merged.video_behavior.as_str(),
            fade_out_duration_ms = merged.fade_out_duration_ms,
            "Spam config updated"
        );
        self.shared.publish();
        Ok(merged)
    }

    /// Replace the media pool and audio track; usage counters start over.
    pub fn set_files(&self, audio_file: Option<String>, video_files: Vec<String>) {
        let (audio, videos) = {
            let mut session = self.shared.session();
            session.pool = MediaPool::new(video_files);
            session.audio_track = audio_file.filter(|a| !a.trim().is_empty());
            (session.audio_track.clone(), session.pool.len())
        };
        tracing::info!(audio = ?audio, videos, "Media files updated");
    }

    pub async fn on_eyes_close(&self) {
        let _transition = self.shared.transition.lock().await;

        let (generation, audio_track) = {
            let mut session = self.shared.session();
            if session.is_active {
                tracing::debug!("Eyes-close ignored: session already active");
                return;
            }
            session.is_active = true;
            session.generation = session.generation.wrapping_add(1);
            session.escalation_level = 0;
            session.closed_start = Some(Instant::now());
            if let Some(stale) = session.escalation_task.take() {
                stale.abort();
            }
            (session.generation, session.audio_track.clone())
        };
        tracing::info!(generation, "Eyes closed, spam session started");

        let task = tokio::spawn(escalation_loop(self.shared.clone(), generation));
        {
            let mut session = self.shared.session();
            if session.is_active && session.generation == generation {
                session.escalation_task = Some(task);
            } else {
                task.abort();
            }
        }

        match audio_track {
            Some(track) => {
                if let Err(e) = self.shared.audio.play(&track).await {
                    tracing::warn!(error = %e, track = %track, "Audio playback failed");
                }
            }
            None => tracing::debug!("No audio file set, skipping audio"),
        }

        spawn_one(&self.shared, generation).await;
        self.shared.publish();
    }

    /// Ends the session. Media teardown has completed when this returns.
    pub async fn on_eyes_open(&self) {
        let _transition = self.shared.transition.lock().await;

        let config = {
            let mut session = self.shared.session();
            if !session.is_active {
                tracing::debug!("Eyes-open ignored: no active session");
                return;
            }
            session.is_active = false;
            if let Some(task) = session.escalation_task.take() {
                task.abort();
            }
            session.config
        };
        tracing::info!(
            video_behavior = config.video_behavior.as_str(),
            "Eyes opened, ending spam session"
        );

        self.shared.audio.stop().await;

        {
            let mut spawner = self.shared.spawner.lock().await;
            match config.video_behavior {
                VideoBehavior::Clear => spawner.clear_all().await,
                VideoBehavior::Fade => spawner.fade_out_all(config.fade_out_duration_ms).await,
                VideoBehavior::Keep => {}
            }
        }
        self.shared.publish();

        {
            let mut session = self.shared.session();
            session.closed_start = None;
            session.escalation_level = 0;
            session.pool.reset_usage();
        }
        self.shared.publish();
    }

    /// Manual override: remove every popup without touching session state.
    pub async fn clear_all_videos(&self) {
        {
            let mut spawner = self.shared.spawner.lock().await;
            spawner.clear_all().await;
        }
        self.shared.publish();
    }

    /// Cancel timers, silence audio and remove all media.
    pub async fn shutdown(&self) {
        let _transition = self.shared.transition.lock().await;
        {
            let mut session = self.shared.session();
            session.is_active = false;
            session.closed_start = None;
            session.escalation_level = 0;
            session.pool.reset_usage();
            if let Some(task) = session.escalation_task.take() {
                task.abort();
            }
        }
        self.shared.audio.stop().await;
        {
            let mut spawner = self.shared.spawner.lock().await;
            spawner.clear_all().await;
        }
        self.shared.publish();
        tracing::info!("Spam controller shut down");
    }
}

impl EyeEventSink for SpamController {
    fn on_eyes_close(&self) -> BoxFuture<'_, ()> {
        Box::pin(SpamController::on_eyes_close(self))
    }

    fn on_eyes_open(&self) -> BoxFuture<'_, ()> {
        Box::pin(SpamController::on_eyes_open(self))
    }
}

async fn escalation_loop(shared: Arc<Shared>, generation: u64) {
    let period = shared.timing.interval;
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    loop {
        interval.tick().await;
        if !escalation_tick(&shared, generation) {
            break;
        }
    }
}

/// Raise the level and schedule the burst. Returns false once the session
/// this timer belongs to is over.
fn escalation_tick(shared: &Arc<Shared>, generation: u64) -> bool {
    let (level, burst) = {
        let mut session = shared.session();
        if !session.is_active || session.generation != generation {
            return false;
        }
        if session.pool.is_empty() {
            return true;
        }
        session.escalation_level = session.escalation_level.saturating_add(1);
        let level = session.escalation_level;
        (level, shared.timing.burst_size(level))
    };
    tracing::info!(escalation_level = level, burst, "Escalating");

    for i in 0..burst {
        let delay = shared.timing.stagger * i;
        let shared = shared.clone();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if spawn_one(&shared, generation).await {
                shared.publish();
            }
        });
    }

    shared.publish();
    true
}

/// Spawn one fairly selected item for `generation`. Returns false when the
/// session has ended or there is nothing to show.
async fn spawn_one(shared: &Shared, generation: u64) -> bool {
    let mut spawner = shared.spawner.lock().await;

    // 拿到 spawner 锁之后再检查会话：清理一旦开始，过期的弹出都会在这里被丢弃
    let (media, max_videos) = {
        let mut session = shared.session();
        if !session.is_active || session.generation != generation {
            tracing::debug!(generation, "Dropping spawn for ended session");
            return false;
        }
        let Some(media) = session.pool.select_fair() else {
            return false;
        };
        (media, session.config.max_videos)
    };

    spawner.spawn(&media, max_videos).await;
    true
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::spam::headless::{HeadlessAudioPresenter, HeadlessMediaPresenter};

    struct Fixture {
        controller: SpamController,
        media: Arc<HeadlessMediaPresenter>,
        audio: Arc<HeadlessAudioPresenter>,
    }

    fn fixture(config: SpamConfig, files: &[&str]) -> Fixture {
        let media = Arc::new(HeadlessMediaPresenter::new());
        let audio = Arc::new(HeadlessAudioPresenter::new());
        let controller = SpamController::new(
            media.clone(),
            audio.clone(),
            config,
            EscalationTiming::default(),
        );
        controller.set_files(
            Some("alarm.mp3".to_string()),
            files.iter().map(|f| f.to_string()).collect(),
        );
        Fixture {
            controller,
            media,
            audio,
        }
    }

    fn config(max_videos: usize, video_behavior: VideoBehavior) -> SpamConfig {
        SpamConfig {
            max_videos,
            video_behavior,
            fade_out_duration_ms: 320,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn close_spawns_initial_popup_and_plays_audio() {
        let fx = fixture(config(3, VideoBehavior::Clear), &["v1", "v2"]);
        fx.controller.on_eyes_close().await;

        let snap = fx.controller.snapshot();
        assert!(snap.is_active);
        assert_eq!(snap.escalation_level, 0);
        assert_eq!(snap.active_videos, 1);
        assert_eq!(snap.max_videos, 3);
        assert!(fx.audio.is_playing());
        assert_eq!(fx.audio.current_track().as_deref(), Some("alarm.mp3"));
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_close_is_ignored() {
        let fx = fixture(config(10, VideoBehavior::Keep), &["v1"]);
        fx.controller.on_eyes_close().await;
        fx.controller.on_eyes_close().await;

        assert_eq!(fx.media.count(), 1);
        assert_eq!(fx.controller.generation(), 1);
        assert_eq!(fx.audio.play_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_spawn_staggered_bursts() {
        let fx = fixture(config(50, VideoBehavior::Keep), &["v1", "v2", "v3"]);
        fx.controller.on_eyes_close().await;

        tokio::time::sleep(Duration::from_millis(2050)).await;
        assert_eq!(fx.controller.snapshot().escalation_level, 1);
        assert_eq!(fx.media.count(), 2);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fx.media.count(), 3);

        // 第二个 tick：burst = 3
        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert_eq!(fx.controller.snapshot().escalation_level, 2);
        assert_eq!(fx.media.count(), 6);
        assert_eq!(fx.controller.snapshot().spawn_rate, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn open_during_stagger_drops_remaining_spawns() {
        let fx = fixture(config(50, VideoBehavior::Keep), &["v1", "v2"]);
        fx.controller.on_eyes_close().await;

        tokio::time::sleep(Duration::from_millis(2050)).await;
        assert_eq!(fx.media.count(), 2);
        fx.controller.on_eyes_open().await;

        tokio::time::sleep(Duration::from_millis(5000)).await;
        assert_eq!(fx.media.count(), 2);
        assert_eq!(fx.media.presented_total(), 2);
        assert!(!fx.audio.is_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn open_with_clear_resets_session() {
        let fx = fixture(config(3, VideoBehavior::Clear), &["v1", "v2"]);
        fx.controller.on_eyes_close().await;
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(fx.media.count() > 1);

        fx.controller.on_eyes_open().await;
        let snap = fx.controller.snapshot();
        assert!(!snap.is_active);
        assert_eq!(snap.escalation_level, 0);
        assert_eq!(snap.closed_duration_ms, 0);
        assert_eq!(snap.active_videos, 0);
        assert_eq!(fx.controller.usage_of("v1"), Some(0));
        assert_eq!(fx.controller.usage_of("v2"), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn open_with_fade_waits_for_fade() {
        let fx = fixture(config(3, VideoBehavior::Fade), &["v1"]);
        fx.controller.on_eyes_close().await;

        let started = Instant::now();
        fx.controller.on_eyes_open().await;
        assert!(started.elapsed() >= Duration::from_millis(320));
        assert_eq!(fx.media.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_failure_falls_back_to_eviction() {
        let fx = fixture(config(3, VideoBehavior::Fade), &["v1"]);
        fx.controller.on_eyes_close().await;
        fx.media.set_fail_teardown(true);

        fx.controller.on_eyes_open().await;
        assert_eq!(fx.media.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_spawns_do_not_change_level() {
        let fx = fixture(config(5, VideoBehavior::Keep), &["broken.mp4"]);
        fx.media.fail_media("broken.mp4");

        fx.controller.on_eyes_close().await;
        assert!(fx.controller.is_active());
        assert_eq!(fx.controller.snapshot().escalation_level, 0);
        assert_eq!(fx.media.count(), 0);

        tokio::time::sleep(Duration::from_millis(2200)).await;
        assert_eq!(fx.controller.snapshot().escalation_level, 1);
        assert_eq!(fx.media.count(), 0);
        assert!(fx.controller.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_pool_never_escalates() {
        let fx = fixture(config(5, VideoBehavior::Keep), &[]);
        fx.controller.on_eyes_close().await;
        tokio::time::sleep(Duration::from_millis(6500)).await;

        let snap = fx.controller.snapshot();
        assert!(snap.is_active);
        assert_eq!(snap.escalation_level, 0);
        assert_eq!(snap.active_videos, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_clear_keeps_session_state() {
        let fx = fixture(config(5, VideoBehavior::Keep), &["v1"]);
        fx.controller.on_eyes_close().await;
        tokio::time::sleep(Duration::from_millis(2200)).await;

        fx.controller.clear_all_videos().await;
        let snap = fx.controller.snapshot();
        assert!(snap.is_active);
        assert_eq!(snap.escalation_level, 1);
        assert_eq!(snap.active_videos, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn lowered_cap_applies_at_next_spawn() {
        let fx = fixture(config(10, VideoBehavior::Keep), &["v1", "v2"]);
        fx.controller.on_eyes_close().await;
        tokio::time::sleep(Duration::from_millis(2200)).await;
        assert_eq!(fx.media.count(), 3);

        fx.controller
            .set_config(&SpamConfigPatch {
                max_videos: Some(1),
                ..SpamConfigPatch::default()
            })
            .unwrap();
        assert_eq!(fx.media.count(), 3);

        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(fx.media.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn snapshots_are_pushed_to_subscribers() {
        let fx = fixture(config(3, VideoBehavior::Clear), &["v1"]);
        let mut rx = fx.controller.subscribe();

        fx.controller.on_eyes_close().await;
        let first = rx.recv().await.unwrap();
        assert!(first.is_active);
        assert_eq!(first.active_videos, 1);

        fx.controller.on_eyes_open().await;
        let mut last = first;
        while let Ok(snap) = rx.try_recv() {
            last = snap;
        }
        assert!(!last.is_active);
        assert_eq!(last.active_videos, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn new_session_after_open_uses_new_generation() {
        let fx = fixture(config(20, VideoBehavior::Keep), &["v1"]);
        fx.controller.on_eyes_close().await;
        tokio::time::sleep(Duration::from_millis(2050)).await;
        fx.controller.on_eyes_open().await;
        fx.controller.on_eyes_close().await;

        assert_eq!(fx.controller.generation(), 2);
        assert_eq!(fx.controller.snapshot().escalation_level, 0);
        // 旧会话剩余的错峰弹出不会算进新会话
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fx.media.presented_total(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_resets_usage_counters() {
        let fx = fixture(config(10, VideoBehavior::Keep), &["v1", "v2"]);
        fx.controller.on_eyes_close().await;
        tokio::time::sleep(Duration::from_millis(2200)).await;
        let used = fx.controller.usage_of("v1").unwrap() + fx.controller.usage_of("v2").unwrap();
        assert_eq!(used, 3);

        fx.controller.shutdown().await;
        assert!(!fx.controller.is_active());
        assert_eq!(fx.controller.usage_of("v1"), Some(0));
        assert_eq!(fx.controller.usage_of("v2"), Some(0));
        assert_eq!(fx.media.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn audio_failure_does_not_abort_session() {
        let fx = fixture(config(5, VideoBehavior::Clear), &["v1"]);
        fx.audio.set_fail_playback(true);

        fx.controller.on_eyes_close().await;
        assert!(fx.controller.is_active());
        assert!(!fx.audio.is_playing());
        assert_eq!(fx.audio.play_count(), 0);
        assert_eq!(fx.media.count(), 1);
        assert_eq!(fx.controller.snapshot().active_videos, 1);

        tokio::time::sleep(Duration::from_millis(2200)).await;
        assert_eq!(fx.controller.snapshot().escalation_level, 1);
    }
}
