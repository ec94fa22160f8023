use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

const LOG_FILE_PREFIX: &str = "eyes-closed-punisher";
const MAX_LOG_FILES: usize = 30;

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            enable_file_logs: false,
            log_dir: "./logs".to_string(),
        }
    }
}

fn file_appender(log_dir: &str) -> Result<RollingFileAppender, String> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .max_log_files(MAX_LOG_FILES)
        .build(log_dir)
        .map_err(|e| e.to_string())
}

/// Install the global subscriber. Calling it again is a no-op, so tests may
/// call it freely.
pub fn init_tracing(config: &LogConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let stdout_layer = fmt::layer().with_target(true).with_thread_ids(false);
    let registry = Registry::default().with(env_filter).with(stdout_layer);

    if !config.enable_file_logs {
        // 全局 subscriber 已存在时 try_init 返回错误（测试里很常见），忽略即可
        let _ = registry.try_init();
        return;
    }

    match file_appender(&config.log_dir) {
        Ok(appender) => {
            let file_layer = fmt::layer().with_writer(appender).with_ansi(false).json();
            let _ = registry.with(file_layer).try_init();
        }
        Err(e) => {
            let _ = registry.try_init();
            tracing::warn!(
                error = %e,
                log_dir = %config.log_dir,
                "File logging unavailable, continuing with stdout only"
            );
        }
    }
}
