//! 闭眼状态检测器
//!
//! 两状态有限状态机：Open（睁眼）⇄ Closed（闭眼）。
//!
//! 每次轮询输入一帧 blink score（或"无人脸"），先做指数平滑，再用
//! 连续帧计数进行去抖：只有连续 N 帧都满足闭眼条件才进入 Closed，
//! 反方向同理。无人脸的帧计入睁眼方向，避免转头被误判为一直闭眼。

use tokio::time::Instant;

use super::types::{DetectionConfig, EyeState, EyeTransition, FrameScore};

#[derive(Debug, Clone)]
pub struct EyeStateDetector {
    config: DetectionConfig,
    poll_rate_hz: u32,
    state: EyeState,
    smoothed: f64,
    last_raw: f64,
    consecutive_closed: u32,
    consecutive_open: u32,
    closed_start: Option<Instant>,
}

impl EyeStateDetector {
    pub fn new(config: DetectionConfig, poll_rate_hz: u32) -> Self {
        Self {
            config,
            poll_rate_hz: poll_rate_hz.max(1),
            state: EyeState::Open,
            // 以阈值作为平滑初值：起始时既不偏向闭眼也不偏向睁眼
            smoothed: config.threshold,
            last_raw: 0.0,
            consecutive_closed: 0,
            consecutive_open: 0,
            closed_start: None,
        }
    }

    pub fn state(&self) -> EyeState {
        self.state
    }

    pub fn smoothed(&self) -> f64 {
        self.smoothed
    }

    pub fn last_raw(&self) -> f64 {
        self.last_raw
    }

    pub fn threshold(&self) -> f64 {
        self.config.threshold
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    pub fn closed_start(&self) -> Option<Instant> {
        self.closed_start
    }

    /// Milliseconds spent CLOSED as of `now`; 0 while OPEN.
    pub fn closed_duration_ms(&self, now: Instant) -> u64 {
        match (self.state, self.closed_start) {
            (EyeState::Closed, Some(start)) => {
                let elapsed = now.saturating_duration_since(start).as_millis();
                u64::try_from(elapsed).unwrap_or(u64::MAX)
            }
            _ => 0,
        }
    }

    /// Replace the threshold in place. Smoothing state and counters survive.
    pub fn set_threshold(&mut self, threshold: f64) {
        self.config.threshold = threshold.clamp(0.0, 1.0);
    }

    /// Feed one poll. Returns the transition that fired on this frame, if any.
    pub fn ingest(&mut self, frame: FrameScore, now: Instant) -> Option<EyeTransition> {
        let closed_test = match frame {
            FrameScore::Face(score) => {
                self.last_raw = score;
                let alpha = self.config.smoothing_alpha;
                self.smoothed = alpha * score + (1.0 - alpha) * self.smoothed;
                self.smoothed > self.config.threshold
            }
            FrameScore::Absent => false,
        };

        if closed_test {
            self.consecutive_closed = self.consecutive_closed.saturating_add(1);
            self.consecutive_open = 0;

            let required = self.config.required_close_frames(self.poll_rate_hz);
            if self.state == EyeState::Open && self.consecutive_closed >= required {
                self.state = EyeState::Closed;
                self.closed_start = Some(now);
                self.reset_counters();
                tracing::debug!(smoothed = self.smoothed, "Eyes closed");
                return Some(EyeTransition::Closed);
            }
        } else {
            self.consecutive_open = self.consecutive_open.saturating_add(1);
            self.consecutive_closed = 0;

            let required = self.config.required_open_frames(self.poll_rate_hz);
            if self.state == EyeState::Closed && self.consecutive_open >= required {
                self.state = EyeState::Open;
                self.closed_start = None;
                self.reset_counters();
                tracing::debug!(smoothed = self.smoothed, "Eyes opened");
                return Some(EyeTransition::Opened);
            }
        }

        None
    }

    /// Back to the initial OPEN state with fresh smoothing.
    pub fn reset(&mut self) {
        self.state = EyeState::Open;
        self.smoothed = self.config.threshold;
        self.last_raw = 0.0;
        self.closed_start = None;
        self.reset_counters();
    }

    fn reset_counters(&mut self) {
        self.consecutive_closed = 0;
        self.consecutive_open = 0;
    }
}
