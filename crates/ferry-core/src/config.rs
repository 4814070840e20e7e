//! Engine configuration.

use std::path::{Path, PathBuf};

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for this schema.
    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A value is out of range.
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Configuration for the operations engine.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct EngineConfig {
    /// Maximum number of actions kept on the undo stack.
    #[builder(default = "10")]
    #[serde(default = "default_undo_levels")]
    pub undo_levels: usize,

    /// Ask before permanently deleting files.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub confirm_delete: bool,

    /// Minimum interval between progress reports, in milliseconds.
    #[builder(default = "100")]
    #[serde(default = "default_progress_interval")]
    pub progress_interval_ms: u64,

    /// Seconds of transfer before rate and time-left estimates are shown.
    #[builder(default = "15")]
    #[serde(default = "default_reliable_rate_secs")]
    pub reliable_rate_secs: u64,

    /// Change events delivered per batch when not consuming everything.
    #[builder(default = "20")]
    #[serde(default = "default_change_batch_size")]
    pub change_batch_size: usize,

    /// Entries counted between partial scan reports.
    #[builder(default = "100")]
    #[serde(default = "default_scan_report_interval")]
    pub scan_report_interval: u64,

    /// How many symlinks the self-recursion guard follows in a chain.
    #[builder(default = "40")]
    #[serde(default = "default_symlink_depth")]
    pub symlink_depth: usize,

    /// Name length limit used when the filesystem cannot report one.
    #[builder(default = "255")]
    #[serde(default = "default_max_name_length")]
    pub max_name_length: usize,

    /// Use a directory-backed trash at this path instead of the desktop trash.
    #[builder(default, setter(into, strip_option))]
    #[serde(default)]
    pub trash_dir: Option<PathBuf>,
}

fn default_undo_levels() -> usize {
    10
}

fn default_true() -> bool {
    true
}

fn default_progress_interval() -> u64 {
    100
}

fn default_reliable_rate_secs() -> u64 {
    15
}

fn default_change_batch_size() -> usize {
    20
}

fn default_scan_report_interval() -> u64 {
    100
}

fn default_symlink_depth() -> usize {
    40
}

fn default_max_name_length() -> usize {
    255
}

fn check_ranges(undo_levels: usize, change_batch_size: usize, max_name_length: usize) -> Result<(), String> {
    if undo_levels == 0 {
        return Err("undo_levels must be at least 1".to_string());
    }
    if change_batch_size == 0 {
        return Err("change_batch_size must be at least 1".to_string());
    }
    if max_name_length < 8 {
        return Err("max_name_length must be at least 8".to_string());
    }
    Ok(())
}

impl EngineConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        check_ranges(
            self.undo_levels.unwrap_or_else(default_undo_levels),
            self.change_batch_size.unwrap_or_else(default_change_batch_size),
            self.max_name_length.unwrap_or_else(default_max_name_length),
        )
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            undo_levels: default_undo_levels(),
            confirm_delete: true,
            progress_interval_ms: default_progress_interval(),
            reliable_rate_secs: default_reliable_rate_secs(),
            change_batch_size: default_change_batch_size(),
            scan_report_interval: default_scan_report_interval(),
            symlink_depth: default_symlink_depth(),
            max_name_length: default_max_name_length(),
            trash_dir: None,
        }
    }
}

impl EngineConfig {
    /// Create a new config builder.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// The default config file location (`<config dir>/ferry/config.toml`).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("ferry").join("config.toml"))
    }

    /// Load from the default location, falling back to defaults when absent.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load from an explicit file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        check_ranges(config.undo_levels, config.change_batch_size, config.max_name_length)
            .map_err(|message| ConfigError::Invalid { message })?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = EngineConfig::builder()
            .undo_levels(3usize)
            .confirm_delete(false)
            .trash_dir("/tmp/trash")
            .build()
            .unwrap();

        assert_eq!(config.undo_levels, 3);
        assert!(!config.confirm_delete);
        assert_eq!(config.trash_dir, Some(PathBuf::from("/tmp/trash")));
        assert_eq!(config.change_batch_size, 20);
    }

    #[test]
    fn test_builder_rejects_zero_levels() {
        assert!(EngineConfig::builder().undo_levels(0usize).build().is_err());
    }

    #[test]
    fn test_load_partial_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "undo_levels = 4\nconfirm_delete = false\n").unwrap();

        let config = EngineConfig::load_from(&path).unwrap();
        assert_eq!(config.undo_levels, 4);
        assert!(!config.confirm_delete);
        assert_eq!(config.progress_interval_ms, 100);
        assert_eq!(config.symlink_depth, 40);
    }

    #[test]
    fn test_load_invalid_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "undo_levels = 0\n").unwrap();
        assert!(matches!(
            EngineConfig::load_from(&path),
            Err(ConfigError::Invalid { .. })
        ));
    }
}
