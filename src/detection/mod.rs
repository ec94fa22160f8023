//! Eye-state detection: frame scoring contract, the debounced OPEN/CLOSED
//! state machine, calibration, and the fixed-rate polling loop.

pub mod calibration;
pub mod detector;
pub mod runner;
pub mod scorer;
pub mod types;

use futures::future::BoxFuture;
use thiserror::Error;

pub use calibration::{create_calibration_data, default_calibration, CalibrationData};
pub use detector::EyeStateDetector;
pub use runner::EyeDetection;
pub use scorer::{FrameScorer, LineScorer};
pub use types::{DetectionConfig, DetectorStatus, EyeState, EyeTransition, FrameScore};

#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("failed to initialize face detection: {0}")]
    ScorerInit(String),
    #[error("detection is already running")]
    AlreadyRunning,
}

/// Receiver of debounced transitions.
///
/// The detector awaits both handlers before its next poll, so teardown done
/// in `on_eyes_open` completes before another close can be reported.
pub trait EyeEventSink: Send + Sync {
    fn on_eyes_close(&self) -> BoxFuture<'_, ()>;

    fn on_eyes_open(&self) -> BoxFuture<'_, ()>;
}
