use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::calibration::CalibrationData;
use super::detector::EyeStateDetector;
use super::scorer::FrameScorer;
use super::types::{DetectionConfig, DetectorStatus, EyeTransition};
use super::{DetectionError, EyeEventSink};

struct RunningLoop {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Owns one detection session at a time: scorer, detector state and the
/// polling task. Nothing is shared between sessions.
pub struct EyeDetection {
    config: DetectionConfig,
    poll_rate_hz: u32,
    status_tx: Arc<watch::Sender<DetectorStatus>>,
    threshold_tx: watch::Sender<f64>,
    running: Mutex<Option<RunningLoop>>,
}

impl EyeDetection {
    pub fn new(config: DetectionConfig, poll_rate_hz: u32) -> Self {
        let (status_tx, _) = watch::channel(DetectorStatus {
            threshold: config.threshold,
            ..DetectorStatus::default()
        });
        let (threshold_tx, _) = watch::channel(config.threshold);
        Self {
            config,
            poll_rate_hz: poll_rate_hz.max(1),
            status_tx: Arc::new(status_tx),
            threshold_tx,
            running: Mutex::new(None),
        }
    }

    pub fn status(&self) -> DetectorStatus {
        self.status_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DetectorStatus> {
        self.status_tx.subscribe()
    }

    pub fn threshold(&self) -> f64 {
        *self.threshold_tx.borrow()
    }

    pub fn is_running(&self) -> bool {
        match self.running.lock() {
            Ok(guard) => guard.as_ref().is_some_and(|r| !r.task.is_finished()),
            Err(_) => false,
        }
    }

    /// Swap in a new threshold; the running loop picks it up on its next poll.
    pub fn calibrate(&self, data: &CalibrationData) {
        let threshold = data.threshold.clamp(0.0, 1.0);
        self.threshold_tx.send_replace(threshold);
        self.status_tx.send_modify(|s| s.threshold = threshold);
        tracing::info!(threshold, "Detection threshold recalibrated");
    }

    /// Initialise the scorer and begin polling.
    ///
    /// An initialisation failure leaves the detector not-ready with the error
    /// recorded in its status. There is no retry; call `start` again.
    pub async fn start<S>(
        &self,
        mut scorer: S,
        sink: Arc<dyn EyeEventSink>,
    ) -> Result<(), DetectionError>
    where
        S: FrameScorer + 'static,
    {
        if self.is_running() {
            return Err(DetectionError::AlreadyRunning);
        }

        tracing::info!(poll_rate_hz = self.poll_rate_hz, "Starting eye detection");
        self.status_tx.send_modify(|s| s.error = None);

        if let Err(e) = scorer.initialize().await {
            tracing::error!(error = %e, "Frame scorer initialization failed");
            let message = e.to_string();
            self.status_tx.send_modify(|s| {
                s.is_ready = false;
                s.error = Some(message);
            });
            return Err(e);
        }

        let mut config = self.config;
        config.threshold = *self.threshold_tx.borrow();
        let detector = EyeStateDetector::new(config, self.poll_rate_hz);

        let (stop_tx, stop_rx) = watch::channel(false);
        let period = Duration::from_micros(1_000_000 / u64::from(self.poll_rate_hz));
        let status_tx = self.status_tx.clone();
        let threshold_rx = self.threshold_tx.subscribe();

        self.status_tx.send_modify(|s| {
            s.is_ready = true;
            s.threshold = config.threshold;
        });

        let task = tokio::spawn(poll_loop(
            scorer,
            detector,
            sink,
            period,
            status_tx,
            threshold_rx,
            stop_rx,
        ));

        if let Ok(mut guard) = self.running.lock() {
            *guard = Some(RunningLoop { stop_tx, task });
        }
        tracing::info!("Eye detection ready");
        Ok(())
    }

    /// Stop polling immediately. A transition handler already in flight is
    /// allowed to finish; no further polls happen after it.
    pub fn stop(&self) {
        let running = match self.running.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(running) = running {
            let _ = running.stop_tx.send(true);
            tracing::info!("Eye detection stopped");
        }
        let threshold = self.threshold();
        self.status_tx.send_replace(DetectorStatus {
            threshold,
            ..DetectorStatus::default()
        });
    }
}

impl Drop for EyeDetection {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.running.lock() {
            if let Some(running) = guard.take() {
                let _ = running.stop_tx.send(true);
            }
        }
    }
}

async fn poll_loop<S>(
    mut scorer: S,
    mut detector: EyeStateDetector,
    sink: Arc<dyn EyeEventSink>,
    period: Duration,
    status_tx: Arc<watch::Sender<DetectorStatus>>,
    mut threshold_rx: watch::Receiver<f64>,
    mut stop_rx: watch::Receiver<bool>,
) where
    S: FrameScorer,
{
    // 固定频率采样；处理过慢时跳过错过的 tick，不积压
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = stop_rx.changed() => break,
        }
        if *stop_rx.borrow() {
            break;
        }

        if threshold_rx.has_changed().unwrap_or(false) {
            let threshold = *threshold_rx.borrow_and_update();
            detector.set_threshold(threshold);
        }

        let frame = tokio::select! {
            frame = scorer.score() => frame,
            _ = stop_rx.changed() => break,
        };

        let transition = detector.ingest(frame, Instant::now());
        publish(&status_tx, &detector);

        match transition {
            Some(EyeTransition::Closed) => {
                tracing::info!(smoothed = detector.smoothed(), "Eyes closed");
                sink.on_eyes_close().await;
            }
            Some(EyeTransition::Opened) => {
                tracing::info!(smoothed = detector.smoothed(), "Eyes opened");
                sink.on_eyes_open().await;
            }
            None => {}
        }
    }
    tracing::debug!("Detection loop exited");
}

fn publish(status_tx: &watch::Sender<DetectorStatus>, detector: &EyeStateDetector) {
    let now = Instant::now();
    status_tx.send_modify(|s| {
        s.eye_state = detector.state();
        s.raw_score = detector.last_raw();
        s.smoothed_score = detector.smoothed();
        s.threshold = detector.threshold();
        s.closed_duration_ms = detector.closed_duration_ms(now);
    });
}
