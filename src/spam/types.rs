use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_FADE_OUT_MS, DEFAULT_MAX_VIDEOS, ESCALATION_INTERVAL_MS, IMAGE_EXTENSIONS,
    MAX_BURST_SIZE, SPAWN_STAGGER_MS,
};

/// What happens to presented media once the eyes reopen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoBehavior {
    Clear,
    Keep,
    Fade,
}

impl VideoBehavior {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Clear => "clear",
            Self::Keep => "keep",
            Self::Fade => "fade",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "clear" => Some(Self::Clear),
            "keep" => Some(Self::Keep),
            "fade" => Some(Self::Fade),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpamConfig {
    pub max_videos: usize,
    pub video_behavior: VideoBehavior,
    pub fade_out_duration_ms: u64,
}

impl Default for SpamConfig {
    fn default() -> Self {
        Self {
            max_videos: DEFAULT_MAX_VIDEOS,
            video_behavior: VideoBehavior::Keep,
            fade_out_duration_ms: DEFAULT_FADE_OUT_MS,
        }
    }
}

impl SpamConfig {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.max_videos == 0 {
            return Err("maxVideos must be greater than 0");
        }
        Ok(())
    }

    /// Merge the fields present in `patch`; the result must still validate.
    pub fn merged(&self, patch: &SpamConfigPatch) -> Result<Self, &'static str> {
        let merged = Self {
            max_videos: patch.max_videos.unwrap_or(self.max_videos),
            video_behavior: patch.video_behavior.unwrap_or(self.video_behavior),
            fade_out_duration_ms: patch
                .fade_out_duration_ms
                .unwrap_or(self.fade_out_duration_ms),
        };
        merged.validate()?;
        Ok(merged)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpamConfigPatch {
    #[serde(default)]
    pub max_videos: Option<usize>,
    #[serde(default)]
    pub video_behavior: Option<VideoBehavior>,
    #[serde(default)]
    pub fade_out_duration_ms: Option<u64>,
}

impl From<SpamConfig> for SpamConfigPatch {
    fn from(config: SpamConfig) -> Self {
        Self {
            max_videos: Some(config.max_videos),
            video_behavior: Some(config.video_behavior),
            fade_out_duration_ms: Some(config.fade_out_duration_ms),
        }
    }
}

/// Escalation timer period, burst cap and intra-burst stagger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscalationTiming {
    pub interval: Duration,
    pub max_burst: u32,
    pub stagger: Duration,
}

impl Default for EscalationTiming {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(ESCALATION_INTERVAL_MS),
            max_burst: MAX_BURST_SIZE,
            stagger: Duration::from_millis(SPAWN_STAGGER_MS),
        }
    }
}

impl EscalationTiming {
    /// Popups spawned on the tick that raised the level to `escalation_level`.
    pub fn burst_size(&self, escalation_level: u32) -> u32 {
        escalation_level.saturating_add(1).min(self.max_burst.max(1))
    }
}

/// Read-only projection of the session pushed to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpamStateSnapshot {
    pub is_active: bool,
    pub escalation_level: u32,
    pub closed_duration_ms: u64,
    pub spawn_rate: u32,
    pub active_videos: usize,
    pub max_videos: usize,
}

impl Default for SpamStateSnapshot {
    fn default() -> Self {
        Self {
            is_active: false,
            escalation_level: 0,
            closed_duration_ms: 0,
            spawn_rate: 0,
            active_videos: 0,
            max_videos: DEFAULT_MAX_VIDEOS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

pub fn classify_media(src: &str) -> MediaKind {
    let lower = src.to_ascii_lowercase();
    if IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        MediaKind::Image
    } else {
        MediaKind::Video
    }
}
