use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{
    DEFAULT_DEBOUNCE_CLOSE_MS, DEFAULT_DEBOUNCE_OPEN_MS, DEFAULT_FADE_OUT_MS, DEFAULT_MAX_VIDEOS,
    DEFAULT_SMOOTHING_ALPHA, DEFAULT_THRESHOLD, DETECTION_FPS, ESCALATION_INTERVAL_MS,
    MAX_BURST_SIZE, SPAWN_STAGGER_MS,
};
use crate::detection::DetectionConfig;
use crate::logging::LogConfig;
use crate::spam::{EscalationTiming, SpamConfig, VideoBehavior};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScoreSource {
    Stdin,
    /// 不读取任何分数，检测器一直处于未就绪状态
    Disabled,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
    pub sled_path: String,
    pub cors_origin: String,
    pub detection_fps: u32,
    pub detection: DetectionConfig,
    pub spam: SpamConfig,
    pub escalation: EscalationTiming,
    pub media: MediaFiles,
    pub score_source: ScoreSource,
}

#[derive(Debug, Clone, Default)]
pub struct MediaFiles {
    pub audio_file: Option<String>,
    pub video_files: Vec<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            host: env_or_parse("HOST", IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))),
            port: env_or_parse("PORT", 4870_u16),
            log_level: env_or("RUST_LOG", "info"),
            enable_file_logs: env_or_bool("ENABLE_FILE_LOGS", false),
            log_dir: env_or("LOG_DIR", "./logs"),
            sled_path: env_or("SLED_PATH", "./data/punisher.sled"),
            cors_origin: env_or("CORS_ORIGIN", "http://localhost:5173"),
            detection_fps: detection_fps(),
            detection: detection_config(),
            spam: spam_config(),
            escalation: EscalationTiming {
                interval: Duration::from_millis(
                    env_or_parse("ESCALATION_INTERVAL_MS", ESCALATION_INTERVAL_MS).max(1),
                ),
                max_burst: env_or_parse("ESCALATION_MAX_BURST", MAX_BURST_SIZE).max(1),
                stagger: Duration::from_millis(env_or_parse("SPAWN_STAGGER_MS", SPAWN_STAGGER_MS)),
            },
            media: MediaFiles {
                audio_file: env_opt("SPAM_AUDIO_FILE"),
                video_files: env_list("SPAM_VIDEO_FILES"),
            },
            score_source: score_source(),
        }
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            log_level: self.log_level.clone(),
            enable_file_logs: self.enable_file_logs,
            log_dir: self.log_dir.clone(),
        }
    }
}

fn detection_fps() -> u32 {
    let fps = env_or_parse("DETECTION_FPS", DETECTION_FPS);
    if fps == 0 || fps > 120 {
        tracing::warn!(fps, "DETECTION_FPS out of range, using default");
        return DETECTION_FPS;
    }
    fps
}

fn detection_config() -> DetectionConfig {
    let cfg = DetectionConfig {
        threshold: env_or_parse("DETECTION_THRESHOLD", DEFAULT_THRESHOLD),
        debounce_close_ms: env_or_parse("DEBOUNCE_CLOSE_MS", DEFAULT_DEBOUNCE_CLOSE_MS),
        debounce_open_ms: env_or_parse("DEBOUNCE_OPEN_MS", DEFAULT_DEBOUNCE_OPEN_MS),
        smoothing_alpha: env_or_parse("SMOOTHING_ALPHA", DEFAULT_SMOOTHING_ALPHA),
    };
    match cfg.validate() {
        Ok(()) => cfg,
        Err(reason) => {
            tracing::warn!(reason, "Invalid detection config, using defaults");
            DetectionConfig::default()
        }
    }
}

fn spam_config() -> SpamConfig {
    let video_behavior = match env::var("SPAM_VIDEO_BEHAVIOR") {
        Ok(raw) => VideoBehavior::parse(&raw).unwrap_or_else(|| {
            tracing::warn!(value = %raw, "Unknown SPAM_VIDEO_BEHAVIOR, using keep");
            VideoBehavior::Keep
        }),
        Err(_) => VideoBehavior::Keep,
    };
    let cfg = SpamConfig {
        max_videos: env_or_parse("SPAM_MAX_VIDEOS", DEFAULT_MAX_VIDEOS),
        video_behavior,
        fade_out_duration_ms: env_or_parse("SPAM_FADE_OUT_MS", DEFAULT_FADE_OUT_MS),
    };
    match cfg.validate() {
        Ok(()) => cfg,
        Err(reason) => {
            tracing::warn!(reason, "Invalid spam config, using defaults");
            SpamConfig {
                max_videos: DEFAULT_MAX_VIDEOS,
                ..cfg
            }
        }
    }
}

fn score_source() -> ScoreSource {
    match env_or("SCORE_SOURCE", "stdin").trim().to_ascii_lowercase().as_str() {
        "stdin" => ScoreSource::Stdin,
        "none" | "off" | "disabled" => ScoreSource::Disabled,
        other => {
            tracing::warn!(value = %other, "Unknown SCORE_SOURCE, using stdin");
            ScoreSource::Stdin
        }
    }
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Comma-separated list; blank entries are skipped.
pub fn env_list(key: &str) -> Vec<String> {
    env::var(key)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

pub fn env_or_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(
                    key,
                    value = %raw,
                    "Failed to parse env var, using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

pub fn env_or_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Mutex, OnceLock};

    use super::*;

    fn env_lock() -> &'static Mutex<()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
    }

    fn managed_keys() -> &'static [&'static str] {
        &[
            "HOST",
            "PORT",
            "RUST_LOG",
            "DETECTION_FPS",
            "DETECTION_THRESHOLD",
            "SMOOTHING_ALPHA",
            "SPAM_MAX_VIDEOS",
            "SPAM_VIDEO_BEHAVIOR",
            "SPAM_AUDIO_FILE",
            "SPAM_VIDEO_FILES",
            "ESCALATION_INTERVAL_MS",
            "SCORE_SOURCE",
        ]
    }

    fn clear_keys(keys: &[&str]) {
        for key in keys {
            env::remove_var(key);
        }
    }

    #[test]
    fn loads_defaults_when_missing() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        let cfg = Config::from_env();
        assert_eq!(cfg.port, 4870);
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.detection_fps, 15);
        assert_eq!(cfg.detection, DetectionConfig::default());
        assert_eq!(cfg.spam, SpamConfig::default());
        assert_eq!(cfg.escalation, EscalationTiming::default());
        assert!(cfg.media.audio_file.is_none());
        assert!(cfg.media.video_files.is_empty());
        assert_eq!(cfg.score_source, ScoreSource::Stdin);
    }

    #[test]
    fn parses_media_and_behavior() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        env::set_var("SPAM_VIDEO_FILES", " /m/a.mp4, ,/m/b.png ");
        env::set_var("SPAM_AUDIO_FILE", "/m/alarm.mp3");
        env::set_var("SPAM_VIDEO_BEHAVIOR", "Fade");
        env::set_var("SPAM_MAX_VIDEOS", "7");
        env::set_var("ESCALATION_INTERVAL_MS", "500");

        let cfg = Config::from_env();
        assert_eq!(cfg.media.video_files, vec!["/m/a.mp4", "/m/b.png"]);
        assert_eq!(cfg.media.audio_file.as_deref(), Some("/m/alarm.mp3"));
        assert_eq!(cfg.spam.video_behavior, VideoBehavior::Fade);
        assert_eq!(cfg.spam.max_videos, 7);
        assert_eq!(cfg.escalation.interval, Duration::from_millis(500));
        clear_keys(managed_keys());
    }

    #[test]
    fn invalid_values_fall_back() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        env::set_var("PORT", "bad");
        env::set_var("DETECTION_THRESHOLD", "3.5");
        env::set_var("SPAM_MAX_VIDEOS", "0");
        env::set_var("DETECTION_FPS", "0");
        env::set_var("SPAM_VIDEO_BEHAVIOR", "explode");

        let cfg = Config::from_env();
        assert_eq!(cfg.port, 4870);
        assert_eq!(cfg.detection.threshold, DEFAULT_THRESHOLD);
        assert_eq!(cfg.spam.max_videos, DEFAULT_MAX_VIDEOS);
        assert_eq!(cfg.detection_fps, DETECTION_FPS);
        assert_eq!(cfg.spam.video_behavior, VideoBehavior::Keep);
        clear_keys(managed_keys());
    }

    #[test]
    fn score_source_can_be_disabled() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        env::set_var("SCORE_SOURCE", "none");
        assert_eq!(Config::from_env().score_source, ScoreSource::Disabled);
        clear_keys(managed_keys());
    }
}
