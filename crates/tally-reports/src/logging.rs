use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub log_level: String,
}

impl LogConfig {
    /// Quiet by default; `--verbose` shows progress and skipped data.
    pub fn from_verbosity(verbose: bool) -> Self {
        let log_level = if verbose { "debug" } else { "warn" };
        Self {
            log_level: log_level.to_string(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::from_verbosity(false)
    }
}

/// Install the global subscriber. Logs go to stderr; stdout carries report output.
pub fn init_tracing(config: &LogConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    // A subscriber may already be set, e.g. by a test harness.
    let _ = Registry::default()
        .with(env_filter)
        .with(stderr_layer)
        .try_init();
}
