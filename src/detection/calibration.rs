use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::scorer::FrameScorer;
use super::types::FrameScore;
use crate::constants::{
    CALIBRATION_CLOSED_PHASE_MS, CALIBRATION_OPEN_PHASE_MS, CALIBRATION_PAUSE_MS,
    DETECTION_FPS, FALLBACK_CLOSED_SAMPLES, FALLBACK_OPEN_SAMPLES,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationData {
    pub open_baseline: f64,
    pub closed_baseline: f64,
    pub threshold: f64,
    /// epoch ms
    pub timestamp: i64,
}

impl CalibrationData {
    /// Manual threshold override, with baselines bracketing it.
    pub fn manual(threshold: f64) -> Self {
        Self {
            open_baseline: threshold + 0.1,
            closed_baseline: threshold - 0.1,
            threshold,
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

pub fn default_calibration() -> CalibrationData {
    CalibrationData {
        open_baseline: 0.25,
        closed_baseline: 0.05,
        threshold: 0.15,
        timestamp: 0,
    }
}

fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}

pub fn calculate_threshold(open_samples: &[f64], closed_samples: &[f64]) -> f64 {
    (mean(open_samples) + mean(closed_samples)) / 2.0
}

pub fn create_calibration_data(open_samples: &[f64], closed_samples: &[f64]) -> CalibrationData {
    let open_baseline = mean(open_samples);
    let closed_baseline = mean(closed_samples);
    CalibrationData {
        open_baseline,
        closed_baseline,
        threshold: (open_baseline + closed_baseline) / 2.0,
        timestamp: Utc::now().timestamp_millis(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationPhase {
    Idle,
    Open,
    Closed,
    Complete,
}

/// Collects blink scores for the eyes-open phase, then the eyes-closed phase.
#[derive(Debug, Clone)]
pub struct CalibrationSampler {
    phase: CalibrationPhase,
    open_samples: Vec<f64>,
    closed_samples: Vec<f64>,
}

impl Default for CalibrationSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl CalibrationSampler {
    pub fn new() -> Self {
        Self {
            phase: CalibrationPhase::Idle,
            open_samples: Vec::new(),
            closed_samples: Vec::new(),
        }
    }

    pub fn phase(&self) -> CalibrationPhase {
        self.phase
    }

    /// Enter `phase`, discarding anything previously collected for it.
    pub fn begin(&mut self, phase: CalibrationPhase) {
        match phase {
            CalibrationPhase::Open => self.open_samples.clear(),
            CalibrationPhase::Closed => self.closed_samples.clear(),
            CalibrationPhase::Idle | CalibrationPhase::Complete => {}
        }
        self.phase = phase;
    }

    pub fn record(&mut self, frame: FrameScore) {
        let Some(score) = frame.value() else {
            return;
        };
        match self.phase {
            CalibrationPhase::Open => self.open_samples.push(score),
            CalibrationPhase::Closed => self.closed_samples.push(score),
            CalibrationPhase::Idle | CalibrationPhase::Complete => {}
        }
    }

    pub fn sample_counts(&self) -> (usize, usize) {
        (self.open_samples.len(), self.closed_samples.len())
    }

    /// Finish calibration. A phase with no samples uses the fallback set.
    pub fn finish(&mut self) -> CalibrationData {
        if self.open_samples.is_empty() {
            tracing::warn!("No open-phase samples collected, using fallback");
            self.open_samples = FALLBACK_OPEN_SAMPLES.to_vec();
        }
        if self.closed_samples.is_empty() {
            tracing::warn!("No closed-phase samples collected, using fallback");
            self.closed_samples = FALLBACK_CLOSED_SAMPLES.to_vec();
        }
        self.phase = CalibrationPhase::Complete;
        create_calibration_data(&self.open_samples, &self.closed_samples)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CalibrationTiming {
    pub open_phase: Duration,
    pub pause: Duration,
    pub closed_phase: Duration,
    pub poll_rate_hz: u32,
}

impl Default for CalibrationTiming {
    fn default() -> Self {
        Self {
            open_phase: Duration::from_millis(CALIBRATION_OPEN_PHASE_MS),
            pause: Duration::from_millis(CALIBRATION_PAUSE_MS),
            closed_phase: Duration::from_millis(CALIBRATION_CLOSED_PHASE_MS),
            poll_rate_hz: DETECTION_FPS,
        }
    }
}

/// Run the two-phase calibration against an already initialised scorer.
pub async fn collect_calibration<S>(scorer: &mut S, timing: CalibrationTiming) -> CalibrationData
where
    S: FrameScorer + ?Sized,
{
    let mut sampler = CalibrationSampler::new();
    let period = Duration::from_millis(1000 / u64::from(timing.poll_rate_hz.max(1)));

    sampler.begin(CalibrationPhase::Open);
    sample_for(scorer, &mut sampler, timing.open_phase, period).await;
    tracing::info!(samples = sampler.sample_counts().0, "Calibration open phase done");

    tokio::time::sleep(timing.pause).await;

    sampler.begin(CalibrationPhase::Closed);
    sample_for(scorer, &mut sampler, timing.closed_phase, period).await;
    tracing::info!(samples = sampler.sample_counts().1, "Calibration closed phase done");

    let data = sampler.finish();
    tracing::info!(
        open_baseline = data.open_baseline,
        closed_baseline = data.closed_baseline,
        threshold = data.threshold,
        "Calibration complete"
    );
    data
}

async fn sample_for<S>(
    scorer: &mut S,
    sampler: &mut CalibrationSampler,
    phase_len: Duration,
    period: Duration,
) where
    S: FrameScorer + ?Sized,
{
    let deadline = tokio::time::Instant::now() + phase_len;
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        if tokio::time::Instant::now() >= deadline {
            break;
        }
        // 输入停顿时不能拖过阶段截止时间
        match tokio::time::timeout_at(deadline, scorer.score()).await {
            Ok(frame) => sampler.record(frame),
            Err(_) => break,
        }
    }
}
