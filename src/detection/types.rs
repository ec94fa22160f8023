use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_DEBOUNCE_CLOSE_MS, DEFAULT_DEBOUNCE_OPEN_MS, DEFAULT_SMOOTHING_ALPHA,
    DEFAULT_THRESHOLD,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EyeState {
    Open,
    Closed,
}

/// One poll's worth of output from the frame scorer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameScore {
    /// A face was found; blink likelihood in [0, 1].
    Face(f64),
    /// No face detected in this frame.
    Absent,
}

impl FrameScore {
    pub fn face(score: f64) -> Self {
        Self::Face(score.clamp(0.0, 1.0))
    }

    pub fn value(self) -> Option<f64> {
        match self {
            Self::Face(score) => Some(score),
            Self::Absent => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EyeTransition {
    Closed,
    Opened,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionConfig {
    pub threshold: f64,
    pub debounce_close_ms: u64,
    pub debounce_open_ms: u64,
    pub smoothing_alpha: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            debounce_close_ms: DEFAULT_DEBOUNCE_CLOSE_MS,
            debounce_open_ms: DEFAULT_DEBOUNCE_OPEN_MS,
            smoothing_alpha: DEFAULT_SMOOTHING_ALPHA,
        }
    }
}

impl DetectionConfig {
    pub fn validate(&self) -> Result<(), &'static str> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err("threshold must be within [0, 1]");
        }
        if !(self.smoothing_alpha > 0.0 && self.smoothing_alpha <= 1.0) {
            return Err("smoothingAlpha must be within (0, 1]");
        }
        Ok(())
    }

    /// Consecutive qualifying frames needed before OPEN -> CLOSED is accepted.
    pub fn required_close_frames(&self, poll_rate_hz: u32) -> u32 {
        frames_for(self.debounce_close_ms, poll_rate_hz)
    }

    /// Consecutive open/absent frames needed before CLOSED -> OPEN is accepted.
    pub fn required_open_frames(&self, poll_rate_hz: u32) -> u32 {
        frames_for(self.debounce_open_ms, poll_rate_hz)
    }
}

fn frames_for(debounce_ms: u64, poll_rate_hz: u32) -> u32 {
    // 整数运算求 ceil(ms / 1000 * hz)，避免浮点误差（如 200ms@15Hz 恰为 3）
    let numerator = debounce_ms * u64::from(poll_rate_hz);
    let frames = numerator.div_ceil(1000);
    u32::try_from(frames).unwrap_or(u32::MAX)
}

/// Published view of the detector, pushed on every poll.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectorStatus {
    pub eye_state: EyeState,
    pub raw_score: f64,
    pub smoothed_score: f64,
    pub threshold: f64,
    pub closed_duration_ms: u64,
    pub is_ready: bool,
    pub error: Option<String>,
}

impl Default for DetectorStatus {
    fn default() -> Self {
        Self {
            eye_state: EyeState::Open,
            raw_score: 0.0,
            smoothed_score: 0.0,
            threshold: DEFAULT_THRESHOLD,
            closed_duration_ms: 0,
            is_ready: false,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debounce_frames_round_up() {
        let cfg = DetectionConfig::default();
        assert_eq!(cfg.required_close_frames(15), 3);
        // 150ms @ 15Hz = 2.25 -> 3
        assert_eq!(cfg.required_open_frames(15), 3);

        let zero = DetectionConfig {
            debounce_close_ms: 0,
            ..DetectionConfig::default()
        };
        assert_eq!(zero.required_close_frames(15), 0);
    }

    #[test]
    fn validate_rejects_out_of_range() {
        let mut cfg = DetectionConfig::default();
        assert!(cfg.validate().is_ok());
        cfg.smoothing_alpha = 0.0;
        assert!(cfg.validate().is_err());
        cfg.smoothing_alpha = 0.3;
        cfg.threshold = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn eye_state_serializes_upper_case() {
        let json = serde_json::to_string(&EyeState::Closed).unwrap();
        assert_eq!(json, "\"CLOSED\"");
    }
}
