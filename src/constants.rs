/// 检测轮询频率（Hz），与摄像头帧率无关
pub const DETECTION_FPS: u32 = 15;

/// 默认闭眼判定阈值（平滑后的 blink score 高于此值视为闭眼）
pub const DEFAULT_THRESHOLD: f64 = 0.15;

/// 闭眼去抖时长（毫秒）
pub const DEFAULT_DEBOUNCE_CLOSE_MS: u64 = 200;

/// 睁眼去抖时长（毫秒）
pub const DEFAULT_DEBOUNCE_OPEN_MS: u64 = 150;

/// 指数平滑系数
pub const DEFAULT_SMOOTHING_ALPHA: f64 = 0.3;

/// Escalation timer period while a session is active.
pub const ESCALATION_INTERVAL_MS: u64 = 2000;

/// Upper bound on popups spawned per escalation tick.
pub const MAX_BURST_SIZE: u32 = 5;

/// Delay between consecutive spawns inside one burst.
pub const SPAWN_STAGGER_MS: u64 = 100;

/// 同时存在的弹窗上限默认值
pub const DEFAULT_MAX_VIDEOS: usize = 20;

/// 睁眼后淡出时长默认值（毫秒）
pub const DEFAULT_FADE_OUT_MS: u64 = 1000;

/// Audio stop fade.
pub const AUDIO_FADE_OUT_MS: u64 = 150;

/// Opacity step used by the headless fade emulation (~60 fps).
pub const FADE_STEP_MS: u64 = 16;

/// Single well-known key the calibration record is stored under.
pub const CALIBRATION_STORAGE_KEY: &str = "eyes-closed-punisher-calibration";

/// 校准流程各阶段时长（毫秒）
pub const CALIBRATION_OPEN_PHASE_MS: u64 = 3000;
pub const CALIBRATION_PAUSE_MS: u64 = 500;
pub const CALIBRATION_CLOSED_PHASE_MS: u64 = 2000;

/// 某阶段未采集到样本时使用的兜底样本
pub const FALLBACK_OPEN_SAMPLES: &[f64] = &[0.05, 0.08, 0.06];
pub const FALLBACK_CLOSED_SAMPLES: &[f64] = &[0.65, 0.72, 0.68];

/// File extensions presented as still images rather than video.
pub const IMAGE_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".bmp", ".webp", ".svg", ".ico",
];
