//! Processor configuration module.
//!
//! Handles loading, validating, and merging `image-processing.toml`. Stock
//! defaults are the base layer; a config file in the working directory only
//! needs the keys it wants to change.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! default_format = "jpeg"   # Output format when nothing else decides
//! # temp_dir = "/var/cache/thumbs"  # Root for synthesized destinations
//! sharpen = true            # Mild sharpening after thumbnail resizes
//! autorotate = true         # Apply EXIF orientation after load
//! ```
//!
//! Unknown keys are rejected to catch typos early.
//!
//! The configuration only supplies defaults. Anything a pipeline records
//! explicitly (a `format`, an `autorotate` loader option, a `sharpen`
//! override) wins over it.

use crate::destination::DEFAULT_FORMAT;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name looked up by [`load_config`].
pub const CONFIG_FILENAME: &str = "image-processing.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Defaults applied by every pipeline built with this configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessorConfig {
    /// Output format used when neither the destination, the pipeline nor the
    /// source names one.
    pub default_format: String,
    /// Directory for synthesized destinations. Absent means the system temp
    /// directory.
    pub temp_dir: Option<PathBuf>,
    /// Whether thumbnail-style resizes sharpen by default.
    pub sharpen: bool,
    /// Whether images are turned upright from EXIF orientation after load.
    pub autorotate: bool,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            default_format: DEFAULT_FORMAT.to_string(),
            temp_dir: None,
            sharpen: true,
            autorotate: true,
        }
    }
}

impl ProcessorConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_format.is_empty()
            || !self.default_format.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(ConfigError::Validation(format!(
                "default_format must be a bare extension like \"jpeg\", got {:?}",
                self.default_format
            )));
        }
        if self.temp_dir.as_ref().is_some_and(|p| p.as_os_str().is_empty()) {
            return Err(ConfigError::Validation(
                "temp_dir must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Root directory for synthesized destinations.
    pub fn temp_root(&self) -> PathBuf {
        self.temp_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("image-processing"))
    }
}

// =============================================================================
// Config loading
// =============================================================================

/// Parse the contents of an `image-processing.toml` and validate it.
///
/// Keys left out keep their defaults.
pub fn parse_config(content: &str) -> Result<ProcessorConfig, ConfigError> {
    let config: ProcessorConfig = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

/// Load config from `image-processing.toml` in the given directory.
///
/// A missing file yields the defaults.
pub fn load_config(dir: &Path) -> Result<ProcessorConfig, ConfigError> {
    let config_path = dir.join(CONFIG_FILENAME);
    if !config_path.exists() {
        return Ok(ProcessorConfig::default());
    }
    parse_config(&fs::read_to_string(&config_path)?)
}

/// Returns a fully-commented stock `image-processing.toml`.
pub fn stock_config_toml() -> &'static str {
    r##"# Image Processing Configuration
# ==============================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Unknown keys will cause an error.

# Output format used when the destination path, the pipeline's own format
# and the source file all leave it open. A bare extension, no dot.
default_format = "jpeg"

# Where pipelines saved without an explicit destination are written, as
# <temp_dir>/<content-address>.<format>. Defaults to a directory named
# "image-processing" inside the system temp directory.
# temp_dir = "/var/cache/image-processing"

# Apply a mild sharpening kernel after thumbnail-style resizes
# (resize_to_limit, resize_to_fit, resize_to_fill, resize_and_pad).
sharpen = true

# Turn images upright according to their EXIF orientation right after
# loading. A pipeline's "autorot" or "autorotate" loader option overrides it.
autorotate = true
"##
}
