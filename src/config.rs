//! Transcoder configuration
//!
//! Configuration resolution follows the priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (applied by clap's `env` attribute)
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! The resolved configuration is passed explicitly into session construction
//! and treated as immutable for the session's lifetime.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Default target bitrate in kbps
pub const DEFAULT_BITRATE: u32 = 128;

/// Default LAME quality (0 = best, 9 = worst)
pub const DEFAULT_QUALITY: u8 = 5;

/// Default lossless source file extension
pub const DEFAULT_SOURCE_EXT: &str = "flac";

/// Transcoder configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    /// Target constant bitrate in kbps
    pub bitrate: u32,

    /// LAME encoding quality, 0 (best) to 9 (worst)
    pub quality: u8,

    /// File extension of the lossless source files (without the dot)
    pub source_ext: String,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            bitrate: DEFAULT_BITRATE,
            quality: DEFAULT_QUALITY,
            source_ext: DEFAULT_SOURCE_EXT.to_string(),
        }
    }
}

impl TranscodeConfig {
    /// Resolve configuration from an optional TOML file plus CLI overrides.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the file cannot be read or parsed, or
    /// when the resolved values are out of range.
    pub fn load(
        file: Option<&Path>,
        bitrate: Option<u32>,
        quality: Option<u8>,
        source_ext: Option<&str>,
    ) -> Result<Self> {
        let mut config = match file {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("failed to read {}: {}", path.display(), e))
                })?;
                toml::from_str(&text).map_err(|e| {
                    Error::Config(format!("failed to parse {}: {}", path.display(), e))
                })?
            }
            None => Self::default(),
        };

        if let Some(bitrate) = bitrate {
            config.bitrate = bitrate;
        }
        if let Some(quality) = quality {
            config.quality = quality;
        }
        if let Some(source_ext) = source_ext {
            config.source_ext = source_ext.trim_start_matches('.').to_string();
        }

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.bitrate == 0 || self.bitrate > 320 {
            return Err(Error::Config(format!(
                "bitrate {} kbps out of range (1-320)",
                self.bitrate
            )));
        }
        if self.quality > 9 {
            return Err(Error::Config(format!(
                "quality {} out of range (0-9)",
                self.quality
            )));
        }
        if self.source_ext.is_empty() {
            return Err(Error::Config("source extension must not be empty".to_string()));
        }
        Ok(())
    }
}

// ========================================
// Tests
// ========================================
