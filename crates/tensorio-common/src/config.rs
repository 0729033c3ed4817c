//! Codec configuration

use crate::{Result, TensorIoError};
use serde::{Deserialize, Serialize};
use std::env;
use tracing::warn;

/// Alignment GGUF readers assume when `general.alignment` is absent.
pub const DEFAULT_ALIGNMENT: usize = 32;

/// Knobs shared by the container reader and writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Tensor-data alignment used when writing; must be a power of two.
    pub alignment: usize,
    /// GGUF version stamped into written headers (2 or 3).
    pub gguf_version: u32,
    /// Upper bound on any length-prefixed string read from a file.
    pub max_string_len: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self { alignment: DEFAULT_ALIGNMENT, gguf_version: 3, max_string_len: 10 * 1024 * 1024 }
    }
}

impl CodecConfig {
    /// Defaults, overridden by `TENSORIO_ALIGNMENT` and `TENSORIO_GGUF_VERSION`
    /// when they parse and pass [`validate`](Self::validate).
    pub fn from_env() -> Self {
        Self::from_vars(
            env::var("TENSORIO_ALIGNMENT").ok().as_deref(),
            env::var("TENSORIO_GGUF_VERSION").ok().as_deref(),
        )
    }

    fn from_vars(alignment: Option<&str>, version: Option<&str>) -> Self {
        let mut config = Self::default();
        if let Some(alignment) = alignment.and_then(|v| v.trim().parse().ok()) {
            let candidate = config.clone().with_alignment(alignment);
            if candidate.validate().is_ok() {
                config = candidate;
            } else {
                warn!(alignment, "ignoring invalid TENSORIO_ALIGNMENT");
            }
        }
        if let Some(version) = version.and_then(|v| v.trim().parse().ok()) {
            let candidate = Self { gguf_version: version, ..config.clone() };
            if candidate.validate().is_ok() {
                config = candidate;
            } else {
                warn!(version, "ignoring invalid TENSORIO_GGUF_VERSION");
            }
        }
        config
    }

    pub fn with_alignment(mut self, alignment: usize) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.alignment == 0 || !self.alignment.is_power_of_two() {
            return Err(TensorIoError::format(format!(
                "alignment must be a non-zero power of two, got {}",
                self.alignment
            )));
        }
        if u32::try_from(self.alignment).is_err() {
            return Err(TensorIoError::format(format!("alignment {} exceeds u32", self.alignment)));
        }
        if !(2..=3).contains(&self.gguf_version) {
            return Err(TensorIoError::format(format!(
                "unsupported GGUF version {} (supported: 2-3)",
                self.gguf_version
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let config = CodecConfig::default();
        assert_eq!(config.alignment, 32);
        assert_eq!(config.gguf_version, 3);
        config.validate().unwrap();
    }

    #[test]
    fn rejects_bad_alignment() {
        assert!(CodecConfig::default().with_alignment(0).validate().is_err());
        assert!(CodecConfig::default().with_alignment(24).validate().is_err());
        CodecConfig::default().with_alignment(8).validate().unwrap();
    }

    #[test]
    fn env_overrides_that_fail_validation_are_ignored() {
        assert_eq!(CodecConfig::from_vars(Some("0"), None), CodecConfig::default());
        assert_eq!(CodecConfig::from_vars(Some("48"), Some("9")), CodecConfig::default());
        assert_eq!(CodecConfig::from_vars(Some("abc"), None), CodecConfig::default());

        let config = CodecConfig::from_vars(Some("64"), Some("2"));
        assert_eq!(config.alignment, 64);
        assert_eq!(config.gguf_version, 2);
    }

    #[test]
    fn rejects_bad_version() {
        let config = CodecConfig { gguf_version: 1, ..Default::default() };
        assert!(config.validate().is_err());
    }
}
