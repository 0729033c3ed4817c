//! CLI configuration: an optional TOML file merged with command-line flags.
//!
//! ```toml
//! [logging]
//! level = "debug"
//! format = "compact"
//!
//! [codec]
//! alignment = 64
//! gguf_version = 3
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tensorio_common::CodecConfig;

/// File consulted when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "tensorio.toml";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: [&str; 3] = ["pretty", "compact", "json"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub logging: LoggingConfig,
    pub codec: CodecConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    pub level: String,
    /// pretty, compact or json
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "warn".to_string(), format: "compact".to_string() }
    }
}

impl CliConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("invalid configuration TOML")
    }

    pub fn validate(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            anyhow::bail!(
                "invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            );
        }
        if !LOG_FORMATS.contains(&self.logging.format.as_str()) {
            anyhow::bail!(
                "invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                LOG_FORMATS.join(", ")
            );
        }
        self.codec.validate().context("invalid [codec] section")?;
        Ok(())
    }
}

/// Layers file values, environment and flags, in that order.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: CliConfig,
}

impl ConfigBuilder {
    /// Start from [`CodecConfig::from_env`] defaults.
    pub fn new() -> Self {
        Self { config: CliConfig { codec: CodecConfig::from_env(), ..Default::default() } }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = CliConfig::from_toml(&text)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(Self { config })
    }

    /// Explicit `--config` must exist; the default file is optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if path.is_file() { Self::from_file(&path) } else { Ok(Self::new()) }
            }
        }
    }

    pub fn log_level(mut self, level: Option<String>) -> Self {
        if let Some(level) = level {
            self.config.logging.level = level;
        }
        self
    }

    pub fn alignment(mut self, alignment: Option<usize>) -> Self {
        if let Some(alignment) = alignment {
            self.config.codec.alignment = alignment;
        }
        self
    }

    pub fn build(self) -> Result<CliConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
