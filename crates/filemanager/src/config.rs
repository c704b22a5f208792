//! Configuration management for roxyfs.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/roxyfs/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("root_path must be an existing directory, got {0}")]
    InvalidRootPath(String),

    #[error("virtual_root must start with '/', got {0}")]
    InvalidVirtualRoot(String),

    #[error("thumbnail size must be greater than 0, got {width}x{height}")]
    InvalidThumbnailSize { width: u32, height: u32 },

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for roxyfs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// General settings.
    pub general: GeneralConfig,

    /// The managed directory tree.
    pub filesystem: FilesystemConfig,

    /// Default thumbnail box.
    pub thumbnail: ThumbnailConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneralConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,
}

/// Filesystem configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FilesystemConfig {
    /// Real directory exposed through the virtual namespace.
    pub root_path: PathBuf,

    /// Virtual prefix. Defaults to `/` followed by the root's base name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub virtual_root: Option<String>,

    /// Show dotfiles in trees and listings.
    pub include_hidden: bool,

    /// Reject paths that normalize outside the root, not just `../`.
    pub strict_paths: bool,

    /// Where directory archives are staged. Defaults to the system temp dir.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,
}

/// Thumbnail configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ThumbnailConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Default for FilesystemConfig {
    fn default() -> Self {
        Self {
            root_path: PathBuf::from("."),
            virtual_root: None,
            include_hidden: false,
            strict_paths: false,
            temp_dir: None,
        }
    }
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            width: 100,
            height: 100,
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("roxyfs")
        .join("config.toml")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - ROXYFS_ROOT: Override the real root directory
    /// - ROXYFS_VIRTUAL_ROOT: Override the virtual prefix
    /// - ROXYFS_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(root) = std::env::var("ROXYFS_ROOT") {
            if !root.is_empty() {
                tracing::info!("Overriding root_path from environment: {}", root);
                self.filesystem.root_path = PathBuf::from(root);
            }
        }

        if let Ok(prefix) = std::env::var("ROXYFS_VIRTUAL_ROOT") {
            if !prefix.is_empty() {
                tracing::info!("Overriding virtual_root from environment: {}", prefix);
                self.filesystem.virtual_root = Some(prefix);
            }
        }

        if let Ok(level) = std::env::var("ROXYFS_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log_level from environment: {}", level);
                self.general.log_level = level;
            }
        }
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.filesystem.root_path.is_dir() {
            return Err(ConfigError::InvalidRootPath(
                self.filesystem.root_path.display().to_string(),
            ));
        }

        if let Some(prefix) = &self.filesystem.virtual_root {
            if !prefix.starts_with('/') {
                return Err(ConfigError::InvalidVirtualRoot(prefix.clone()));
            }
        }

        let ThumbnailConfig { width, height } = self.thumbnail;
        if width == 0 || height == 0 {
            return Err(ConfigError::InvalidThumbnailSize { width, height });
        }

        let level = self.general.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.general.log_level.clone()));
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}
