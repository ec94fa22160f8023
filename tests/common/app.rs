use std::sync::Arc;

use axum::Router;
use tempfile::TempDir;
use tokio::sync::broadcast;

use eyes_closed_punisher::config::{Config, MediaFiles, ScoreSource};
use eyes_closed_punisher::detection::{DetectionConfig, EyeDetection};
use eyes_closed_punisher::routes::build_router;
use eyes_closed_punisher::spam::{
    EscalationTiming, HeadlessAudioPresenter, HeadlessMediaPresenter, SpamConfig, SpamController,
};
use eyes_closed_punisher::state::AppState;
use eyes_closed_punisher::store::Store;

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub config: Config,
    pub media: Arc<HeadlessMediaPresenter>,
    pub shutdown_tx: broadcast::Sender<()>,
    _temp_dir: TempDir,
}

pub async fn spawn_test_app() -> TestApp {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let sled_path = temp_dir.path().join("punisher-test.sled");

    // 直接构造 Config，避免 set_var 带来的并发测试竞态
    let config = Config {
        host: std::net::IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
        port: 4870,
        log_level: "info".to_string(),
        enable_file_logs: false,
        log_dir: "./logs".to_string(),
        sled_path: sled_path.to_string_lossy().to_string(),
        cors_origin: "http://localhost:5173".to_string(),
        detection_fps: 15,
        detection: DetectionConfig::default(),
        spam: SpamConfig::default(),
        escalation: EscalationTiming::default(),
        media: MediaFiles::default(),
        score_source: ScoreSource::Disabled,
    };

    let store = Arc::new(Store::open(&config.sled_path).expect("open store"));
    let media = Arc::new(HeadlessMediaPresenter::new());
    let controller = SpamController::new(
        media.clone(),
        Arc::new(HeadlessAudioPresenter::new()),
        config.spam,
        config.escalation,
    );
    let detection = Arc::new(EyeDetection::new(config.detection, config.detection_fps));
    let (shutdown_tx, _) = broadcast::channel::<()>(8);

    let state = AppState::new(store, controller, detection, &config, shutdown_tx.clone());
    let app = build_router(state.clone());

    TestApp {
        app,
        state,
        config,
        media,
        shutdown_tx,
        _temp_dir: temp_dir,
    }
}
