#![forbid(unsafe_code)]

//! Application configuration as data.
//!
//! [`AppConfig`] collects every tunable of the editor and tree layers. It
//! loads from TOML or JSON (feature `config-files`) and converts into the
//! component configs ([`HistoryConfig`], [`LoggingConfig`], ...).
//!
//! ```toml
//! [history]
//! max_depth = 200
//! merge_typing = true
//!
//! [tree]
//! reorder = "same_parent"
//!
//! [logging]
//! level = "knote_tree=debug,info"
//! ```
//!
//! Every field has a default, so `AppConfig::default()` is a working setup
//! and a partial file only overrides what it names.

use std::fmt;
#[cfg(feature = "config-files")]
use std::path::Path;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use knote_core::LoggingConfig;
use knote_text::{HistoryConfig, MergeConfig};
use knote_tree::{DateFormats, ReorderMode};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub history: HistorySection,
    pub tree: TreeSection,
    pub logging: LoggingSection,
    pub icons: IconSection,
}

/// Undo history limits and typing merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySection {
    pub max_depth: usize,
    /// Total bytes across undo and redo; 0 disables the limit.
    pub max_bytes: usize,
    pub merge_typing: bool,
    pub merge_delay_ms: u64,
    pub merge_across_words: bool,
    pub max_merged_size: usize,
}

impl Default for HistorySection {
    fn default() -> Self {
        let history = HistoryConfig::default();
        let merge = MergeConfig::default();
        Self {
            max_depth: history.max_depth,
            max_bytes: history.max_bytes,
            merge_typing: merge.enabled,
            merge_delay_ms: merge.max_delay_ms,
            merge_across_words: merge.merge_across_words,
            max_merged_size: merge.max_merged_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeSection {
    pub reorder: ReorderMode,
    /// Icon edge length in pixels.
    pub icon_size: u32,
    pub date_formats: DateFormats,
}

impl Default for TreeSection {
    fn default() -> Self {
        Self {
            reorder: ReorderMode::default(),
            icon_size: 16,
            date_formats: DateFormats::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        let logging = LoggingConfig::default();
        Self {
            level: logging.level,
            json: logging.json,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IconSection {
    /// Directory relative icon names resolve against.
    pub dir: PathBuf,
}

impl Default for IconSection {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("images/node_icons"),
        }
    }
}

impl AppConfig {
    /// Load from a TOML string.
    #[cfg(feature = "config-files")]
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(ConfigError::Toml)
    }

    /// Load from a TOML file on disk.
    #[cfg(feature = "config-files")]
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;
        Self::from_toml_str(&content)
    }

    /// Load from a JSON string.
    #[cfg(feature = "config-files")]
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(s).map_err(ConfigError::Json)
    }

    /// Load from a JSON file on disk.
    #[cfg(feature = "config-files")]
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;
        Self::from_json_str(&content)
    }

    /// Serialize to TOML.
    #[cfg(feature = "config-files")]
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::TomlSer)
    }

    /// Check ranges. An empty list means the config is usable.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.history.max_depth == 0 {
            errors.push("history.max_depth must be > 0".into());
        }
        if self.history.merge_typing && self.history.max_merged_size == 0 {
            errors.push("history.max_merged_size must be > 0 when merge_typing is on".into());
        }

        if self.tree.icon_size == 0 || self.tree.icon_size > 512 {
            errors.push(format!(
                "tree.icon_size must be in 1..=512, got {}",
                self.tree.icon_size
            ));
        }
        let formats = &self.tree.date_formats;
        for (name, pattern) in [
            ("same_day", &formats.same_day),
            ("same_month", &formats.same_month),
            ("same_year", &formats.same_year),
            ("diff_year", &formats.diff_year),
        ] {
            if pattern.trim().is_empty() {
                errors.push(format!("tree.date_formats.{name} must not be empty"));
            }
        }
        for name in formats.invalid_patterns() {
            errors.push(format!("tree.date_formats.{name} is not a valid strftime pattern"));
        }

        if self.logging.level.trim().is_empty() {
            errors.push("logging.level must not be empty".into());
        }
        if self.icons.dir.as_os_str().is_empty() {
            errors.push("icons.dir must not be empty".into());
        }

        errors
    }

    /// Fail with [`ConfigError::Validation`] when [`validate`](Self::validate)
    /// reports anything.
    pub fn validated(self) -> Result<Self, ConfigError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    #[must_use]
    pub fn to_history_config(&self) -> HistoryConfig {
        HistoryConfig::new(self.history.max_depth, self.history.max_bytes).with_merge_config(
            MergeConfig {
                enabled: self.history.merge_typing,
                max_delay_ms: self.history.merge_delay_ms,
                merge_across_words: self.history.merge_across_words,
                max_merged_size: self.history.max_merged_size,
            },
        )
    }

    #[must_use]
    pub fn to_logging_config(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.logging.level.clone(),
            json: self.logging.json,
        }
    }
}

/// Errors from loading an [`AppConfig`].
#[derive(Debug)]
pub enum ConfigError {
    /// I/O error reading a file.
    Io(std::io::Error),
    /// TOML parse error.
    #[cfg(feature = "config-files")]
    Toml(toml::de::Error),
    /// TOML serialization error.
    #[cfg(feature = "config-files")]
    TomlSer(toml::ser::Error),
    /// JSON parse error.
    #[cfg(feature = "config-files")]
    Json(serde_json::Error),
    /// Validation errors.
    Validation(Vec<String>),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "config I/O error: {e}"),
            #[cfg(feature = "config-files")]
            Self::Toml(e) => write!(f, "config TOML error: {e}"),
            #[cfg(feature = "config-files")]
            Self::TomlSer(e) => write!(f, "config TOML serialization error: {e}"),
            #[cfg(feature = "config-files")]
            Self::Json(e) => write!(f, "config JSON error: {e}"),
            Self::Validation(errors) => {
                write!(f, "config validation failed: {}", errors.join("; "))
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            #[cfg(feature = "config-files")]
            Self::Toml(e) => Some(e),
            #[cfg(feature = "config-files")]
            Self::TomlSer(e) => Some(e),
            #[cfg(feature = "config-files")]
            Self::Json(e) => Some(e),
            Self::Validation(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_component_defaults() {
        let config = AppConfig::default();
        let history = config.to_history_config();
        let expected = HistoryConfig::default();
        assert_eq!(history.max_depth, expected.max_depth);
        assert_eq!(history.max_bytes, expected.max_bytes);
        assert!(!history.merge_config.enabled);
        assert_eq!(history.merge_config.max_delay_ms, 500);
        assert_eq!(config.tree.reorder, ReorderMode::All);
        assert_eq!(config.tree.date_formats, DateFormats::default());
        assert_eq!(config.to_logging_config(), LoggingConfig::default());
        assert!(config.validate().is_empty());
    }

    #[test]
    fn validation_collects_every_problem() {
        let mut config = AppConfig::default();
        config.history.max_depth = 0;
        config.tree.icon_size = 0;
        config.tree.date_formats.same_day = " ".into();
        config.logging.level = String::new();
        let errors = config.validate();
        assert_eq!(errors.len(), 4, "{errors:?}");
        assert!(errors.iter().any(|e| e.contains("history.max_depth")));
        assert!(errors.iter().any(|e| e.contains("same_day")));
        assert!(matches!(config.validated(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn unknown_date_specifier_is_rejected() {
        let mut config = AppConfig::default();
        config.tree.date_formats.same_day = "%Q".into();
        let errors = config.validate();
        assert_eq!(errors.len(), 1, "{errors:?}");
        assert!(errors[0].contains("same_day"));
        assert!(errors[0].contains("strftime"));
    }

    #[cfg(feature = "config-files")]
    #[test]
    fn partial_toml_overrides_named_fields() {
        let config = AppConfig::from_toml_str(
            r#"
            [history]
            max_depth = 7
            merge_typing = true

            [tree]
            reorder = "same_parent"
            "#,
        )
        .unwrap();
        assert_eq!(config.history.max_depth, 7);
        assert!(config.to_history_config().merge_config.enabled);
        assert_eq!(config.history.max_bytes, HistoryConfig::default().max_bytes);
        assert_eq!(config.tree.reorder, ReorderMode::SameParent);
        assert_eq!(config.tree.icon_size, 16);
    }

    #[cfg(feature = "config-files")]
    #[test]
    fn json_and_toml_agree() {
        let config = AppConfig::from_json_str(r#"{"tree": {"reorder": "none"}, "logging": {"json": true}}"#)
            .unwrap();
        assert_eq!(config.tree.reorder, ReorderMode::None);
        assert!(config.logging.json);
        let again = AppConfig::from_toml_str(&config.to_toml_string().unwrap()).unwrap();
        assert_eq!(again, config);
    }

    #[cfg(feature = "config-files")]
    #[test]
    fn load_from_files() {
        use std::io::Write;

        let mut toml_file = tempfile::NamedTempFile::new().unwrap();
        writeln!(toml_file, "[icons]\ndir = \"/usr/share/knote/icons\"").unwrap();
        let config = AppConfig::from_toml_file(toml_file.path()).unwrap();
        assert_eq!(config.icons.dir, PathBuf::from("/usr/share/knote/icons"));

        let mut json_file = tempfile::NamedTempFile::new().unwrap();
        write!(json_file, "{{\"history\": {{\"max_bytes\": 0}}}}").unwrap();
        let config = AppConfig::from_json_file(json_file.path()).unwrap();
        assert_eq!(config.history.max_bytes, 0);

        assert!(matches!(
            AppConfig::from_toml_file("/nonexistent/knote.toml"),
            Err(ConfigError::Io(_))
        ));
    }

    #[cfg(feature = "config-files")]
    #[test]
    fn bad_toml_reports_parse_error() {
        let err = AppConfig::from_toml_str("[history]\nmax_depth = \"many\"").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
        assert!(err.to_string().contains("TOML"));
    }
}
