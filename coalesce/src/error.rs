//! Error types for the coalesce consolidation engine.
//!
//! Every error here is a caller-integration defect or an I/O failure. None of
//! them is retryable: the caller is expected to report the error and stop the
//! run.

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for all coalesce operations.
#[derive(Error, Debug)]
pub enum CoalesceError {
    /// The engine was driven in an order it does not support.
    #[error("usage error: {0}")]
    Usage(#[from] UsageError),

    /// A sample, descriptor or record had an unexpected shape.
    #[error("data shape error: {0}")]
    DataShape(#[from] DataShapeError),

    /// Reading or writing a run artifact failed.
    #[error("artifact I/O error: {0}")]
    ArtifactIo(#[from] ArtifactIoError),

    /// Configuration could not be loaded or is invalid.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors caused by calling the engine out of order.
#[derive(Error, Debug)]
pub enum UsageError {
    /// `finish` (or a flush) was requested for a run id that has no active run.
    #[error("no active run for id '{id}'")]
    NoActiveRun {
        /// The run id that was requested.
        id: String,
    },

    /// A pending sample needed a derived begin before any interval was known.
    ///
    /// This happens when a flush is attempted after only one sample was seen
    /// for the metric.
    #[error("interval for metric index {index} should have been defined, but it is not")]
    IntervalUnset {
        /// The metric index.
        index: u32,
    },

    /// A run id cannot be used to name artifacts.
    #[error("invalid run id '{id}': {reason}")]
    InvalidRunId {
        /// The rejected id.
        id: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A run was used again after one of its records failed to be written.
    ///
    /// The record that failed is lost, so the run refuses further samples
    /// rather than leave a silent gap in the stream.
    #[error("run '{id}' stopped after a failed write")]
    RunFailed {
        /// The run id.
        id: String,
    },

    /// A metric index was used that the run never allocated.
    #[error("unknown metric index {index}")]
    UnknownMetric {
        /// The metric index.
        index: u32,
    },
}

/// Errors raised when input or output data does not have the expected shape.
#[derive(Error, Debug)]
pub enum DataShapeError {
    /// Sample values must be finite to be written as a decimal.
    #[error("sample value {value} for '{label}' is not finite")]
    NonFiniteValue {
        /// The label of the metric.
        label: String,
        /// The offending value.
        value: f64,
    },

    /// Interval or begin arithmetic on a sample's clock readings overflowed.
    #[error("clock arithmetic overflows i64 for metric index {index} at end {end}")]
    ClockOverflow {
        /// The metric index.
        index: u32,
        /// End of the sample being processed.
        end: i64,
    },

    /// A descriptor field that forms part of the label was empty.
    #[error("metric descriptor field '{field}' must not be empty")]
    EmptyDescriptorField {
        /// Name of the empty field.
        field: &'static str,
    },

    /// A delimited sample record could not be parsed.
    #[error("malformed sample record '{line}': {reason}")]
    MalformedRecord {
        /// The offending line.
        line: String,
        /// Why the line was rejected.
        reason: String,
    },

    /// The metadata array could not be serialized.
    #[error("failed to serialize metric metadata: {source}")]
    MetadataSerialize {
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A metadata side-car could not be parsed.
    #[error("failed to parse metric metadata '{}': {source}", path.display())]
    MetadataParse {
        /// The side-car path.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Errors that can occur while writing or reading back run artifacts.
#[derive(Error, Debug)]
pub enum ArtifactIoError {
    /// The output file could not be created.
    #[error("failed to create '{}': {source}", path.display())]
    Create {
        /// The file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Appending to the output file failed.
    #[error("failed to write '{}': {source}", path.display())]
    Write {
        /// The file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Reading an artifact back failed.
    #[error("failed to read '{}': {source}", path.display())]
    Read {
        /// The file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Flushing or finishing the compression frame failed.
    #[error("failed to flush '{}': {source}", path.display())]
    Flush {
        /// The file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors that can occur while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config '{}': {source}", path.display())]
    Read {
        /// The config file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for [`crate::RecorderConfig`].
    #[error("failed to parse config '{}': {source}", path.display())]
    Parse {
        /// The config file path.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The output directory is unusable.
    #[error("invalid output directory '{}': {reason}", path.display())]
    OutputDir {
        /// The configured directory.
        path: PathBuf,
        /// Why it was rejected.
        reason: String,
    },
}

/// Type alias for `Result<T, CoalesceError>`.
pub type Result<T> = std::result::Result<T, CoalesceError>;
