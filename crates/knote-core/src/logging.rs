#![forbid(unsafe_code)]

//! Tracing subscriber installation.
//!
//! Library code only uses `tracing` macros. Binaries and test harnesses call
//! [`init_logging`] once to route those records somewhere.
//!
//! The `KNOTE_LOG` environment variable, when set, overrides the configured
//! filter and accepts the usual `EnvFilter` directives
//! (`knote_tree=debug,info`).

use std::fmt;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Environment variable consulted before the configured level.
pub const LOG_ENV_VAR: &str = "KNOTE_LOG";

/// Output settings for [`init_logging`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Default filter directive (`"info"`, `"knote_text=trace"`, ...).
    pub level: String,
    /// Emit one JSON object per line instead of human-readable text.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Errors from [`init_logging`].
#[derive(Debug)]
pub enum LoggingError {
    /// The filter directive could not be parsed.
    Filter(String),
    /// A global subscriber is already installed.
    AlreadyInstalled(String),
}

impl fmt::Display for LoggingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Filter(msg) => write!(f, "invalid log filter: {msg}"),
            Self::AlreadyInstalled(msg) => write!(f, "logging already initialized: {msg}"),
        }
    }
}

impl std::error::Error for LoggingError {}

/// Build the filter for `config`, letting [`LOG_ENV_VAR`] win when present.
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    match std::env::var(LOG_ENV_VAR) {
        Ok(directives) if !directives.trim().is_empty() => {
            EnvFilter::try_new(directives).map_err(|e| LoggingError::Filter(e.to_string()))
        }
        _ => EnvFilter::try_new(&config.level).map_err(|e| LoggingError::Filter(e.to_string())),
    }
}

/// Install the global subscriber described by `config`.
///
/// Calling this a second time returns [`LoggingError::AlreadyInstalled`].
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = build_filter(config)?;
    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_thread_names(true))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_thread_names(true))
            .try_init()
    };
    result.map_err(|e| LoggingError::AlreadyInstalled(e.to_string()))?;
    tracing::info!(level = %config.level, json = config.json, "logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_info_text() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert!(!config.json);
    }

    #[test]
    fn filter_accepts_module_directives() {
        let config = LoggingConfig {
            level: "knote_text=trace,warn".to_string(),
            json: false,
        };
        if std::env::var(LOG_ENV_VAR).is_err() {
            assert!(build_filter(&config).is_ok());
        }
    }

    #[test]
    fn error_display_names_the_problem() {
        let err = LoggingError::Filter("bad".into());
        assert!(err.to_string().contains("invalid log filter"));
    }
}
