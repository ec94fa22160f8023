use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, HeaderValue};
use eyes_closed_punisher::config::{Config, ScoreSource};
use eyes_closed_punisher::detection::calibration::{collect_calibration, CalibrationTiming};
use eyes_closed_punisher::detection::{EyeDetection, EyeEventSink, FrameScorer, LineScorer};
use eyes_closed_punisher::logging::init_tracing;
use eyes_closed_punisher::routes::build_router;
use eyes_closed_punisher::spam::{HeadlessAudioPresenter, HeadlessMediaPresenter, SpamController};
use eyes_closed_punisher::state::AppState;
use eyes_closed_punisher::store::Store;
use tokio::io::BufReader;
use tokio::sync::broadcast;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = Config::from_env();
    init_tracing(&config.log_config());
    tracing::info!("Starting eyes-closed-punisher");

    let result = if std::env::args().skip(1).any(|arg| arg == "--calibrate") {
        calibrate(config).await
    } else {
        run(config).await
    };
    if let Err(e) = result {
        tracing::error!(error = %e, "Fatal startup error");
        std::process::exit(1);
    }
    tracing::info!("Shutdown complete");
}

async fn run(config: Config) -> Result<(), Box<dyn Error>> {
    let store = Arc::new(Store::open(&config.sled_path)?);

    let controller = SpamController::new(
        Arc::new(HeadlessMediaPresenter::new()),
        Arc::new(HeadlessAudioPresenter::new()),
        config.spam,
        config.escalation,
    );

    // 上次通过控制接口设置的媒体优先于环境变量
    match store.load_media_settings() {
        Ok(Some(saved)) => {
            tracing::info!("Restoring saved media settings");
            controller.set_files(saved.audio_file, saved.video_files);
            if let Err(reason) = controller.set_config(&saved.spam_config.into()) {
                tracing::warn!(reason, "Saved spam config rejected, keeping env config");
            }
        }
        Ok(None) => {
            controller.set_files(
                config.media.audio_file.clone(),
                config.media.video_files.clone(),
            );
        }
        Err(e) => {
            tracing::warn!(error = %e, "Saved media settings unreadable, using env");
            controller.set_files(
                config.media.audio_file.clone(),
                config.media.video_files.clone(),
            );
        }
    }

    let detection = Arc::new(EyeDetection::new(config.detection, config.detection_fps));
    match store.load_calibration()? {
        Some(calibration) => detection.calibrate(&calibration),
        None => tracing::info!(
            threshold = config.detection.threshold,
            "No stored calibration, using configured threshold"
        ),
    }

    match config.score_source {
        ScoreSource::Stdin => {
            let scorer = LineScorer::new(BufReader::new(tokio::io::stdin()));
            let sink: Arc<dyn EyeEventSink> = Arc::new(controller.clone());
            // 检测启动失败不影响控制接口，状态里会带上错误信息
            if let Err(e) = detection.start(scorer, sink).await {
                tracing::error!(error = %e, "Eye detection unavailable");
            }
        }
        ScoreSource::Disabled => {
            tracing::warn!("Score source disabled, detector stays idle");
        }
    }

    let (shutdown_tx, _) = broadcast::channel::<()>(8);
    let state = AppState::new(
        store.clone(),
        controller.clone(),
        detection.clone(),
        &config,
        shutdown_tx.clone(),
    );

    let app = build_router(state)
        .layer(build_cors_layer(&config))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ));

    let addr = SocketAddr::new(config.host, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await;
    if let Err(e) = served {
        tracing::error!(error = %e, "HTTP server crashed");
    }

    detection.stop();
    controller.shutdown().await;

    tracing::info!("Flushing store before exit");
    if let Err(e) = store.flush() {
        tracing::error!(error = %e, "Failed to flush store before exit");
    }
    Ok(())
}

/// One-shot calibration from stdin scores: keep the eyes open, then closed
/// when prompted. The result is stored for the next daemon start.
async fn calibrate(config: Config) -> Result<(), Box<dyn Error>> {
    let store = Store::open(&config.sled_path)?;
    let mut scorer = LineScorer::new(BufReader::new(tokio::io::stdin()));
    scorer.initialize().await?;

    let timing = CalibrationTiming {
        poll_rate_hz: config.detection_fps,
        ..CalibrationTiming::default()
    };
    tracing::info!(
        open_ms = timing.open_phase.as_millis() as u64,
        closed_ms = timing.closed_phase.as_millis() as u64,
        "Calibrating: keep eyes open, then close them"
    );
    let data = collect_calibration(&mut scorer, timing).await;
    store.save_calibration(&data)?;
    store.flush()?;
    Ok(())
}

fn build_cors_layer(config: &Config) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .allow_methods(Any);

    if config.cors_origin.trim() == "*" {
        return base.allow_origin(Any);
    }

    match config.cors_origin.parse::<HeaderValue>() {
        Ok(origin) => base.allow_origin(origin),
        Err(e) => {
            tracing::warn!(
                error = %e,
                origin = %config.cors_origin,
                "Invalid CORS_ORIGIN, cross-origin requests disabled"
            );
            base
        }
    }
}

async fn shutdown_signal(shutdown_tx: broadcast::Sender<()>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable, waiting for Ctrl-C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
}
