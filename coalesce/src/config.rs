//! Recorder configuration.
//!
//! Configuration is fixed when a [`crate::Recorder`] is created and applies
//! to every run it records. It can be built in code, loaded from a JSON file,
//! or assembled from command line flags.
//!
//! ```json
//! { "output_dir": "/var/lib/rickshaw/run-1", "compression": "snappy", "keep_constant_zero": false }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::writer::Compression;

/// Configuration shared by every run of a recorder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Directory that receives the artifacts of every run.
    pub output_dir: PathBuf,

    /// Compression applied to both the sample stream and the metadata side-car.
    pub compression: Compression,

    /// Keep metrics that only ever reported zero.
    ///
    /// When false (the default), such metrics are pruned at finish unless the
    /// caller asks otherwise for that run.
    pub keep_constant_zero: bool,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            compression: Compression::None,
            keep_constant_zero: false,
        }
    }
}

impl RecorderConfig {
    /// Creates a configuration writing uncompressed artifacts to `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ..Self::default()
        }
    }

    /// Sets the artifact compression.
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Sets whether constant-zero metrics are kept.
    pub fn with_keep_constant_zero(mut self, keep: bool) -> Self {
        self.keep_constant_zero = keep;
        self
    }

    /// Loads a configuration from a JSON file. Missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`] if the file
    /// cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config = serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(config)
    }

    /// Validates the configuration and creates the output directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::OutputDir`] if the output directory is empty,
    /// is an existing non-directory, or cannot be created.
    pub fn prepare(&self) -> Result<()> {
        let dir = &self.output_dir;
        if dir.as_os_str().is_empty() {
            return Err(ConfigError::OutputDir {
                path: dir.clone(),
                reason: "path is empty".to_string(),
            }
            .into());
        }
        if dir.exists() && !dir.is_dir() {
            return Err(ConfigError::OutputDir {
                path: dir.clone(),
                reason: "exists and is not a directory".to_string(),
            }
            .into());
        }

        fs::create_dir_all(dir).map_err(|e| ConfigError::OutputDir {
            path: dir.clone(),
            reason: e.to_string(),
        })?;

        Ok(())
    }
}
