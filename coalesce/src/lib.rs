//! # coalesce
//!
//! Streaming run-length consolidation of periodic metric samples.
//!
//! Benchmark tooling samples hundreds of counters every second, and most of
//! them hold the same value for long stretches. coalesce accepts samples one
//! at a time, keeps a single open run per metric, and only writes a record
//! when a metric's value changes, so a stretch of identical readings becomes
//! one `index,begin,end,value` line.
//!
//! ## Key Properties
//!
//! - Memory proportional to the number of distinct metrics, not to stream length
//! - Append-only sample stream, optionally snappy-compressed
//! - Dense per-run metric indices with a JSON metadata side-car
//! - Metrics that only ever reported zero are pruned at finish
//! - Independent runs, no process-wide state
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use coalesce::{MetricDescriptor, MetricNames, Recorder, RecorderConfig, Sample};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut recorder = Recorder::new(RecorderConfig::new("./run-data"))?;
//!
//! let desc = MetricDescriptor::new("ovs", "packets-sec");
//! let names = MetricNames::new().with("interface", "p2p1");
//!
//! // Samples carry the clock reading at the end of their interval.
//! recorder.log_sample("0", &desc, &names, Sample::new(15000, 1000.0))?;
//! recorder.log_sample("0", &desc, &names, Sample::new(16000, 1000.0))?;
//! recorder.log_sample("0", &desc, &names, Sample::new(17000, 1200.0))?;
//!
//! // Writes ./run-data/metric-data-0.csv and ./run-data/metric-data-0.json
//! let prefix = recorder.finish("0", false)?;
//! println!("{}", prefix.display());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`Recorder`]: Owns the active runs, keyed by run id
//! - [`Run`]: One recording session: registry, consolidation state, open stream
//! - [`MetricRegistry`]: Maps a metric's label to its dense [`MetricIndex`]
//! - [`Consolidator`]: Merges equal consecutive samples, emits closed runs
//! - [`SampleWriter`]: Append-only, optionally compressed sample stream
//!
//! ## Modules
//!
//! - [`recorder`]: Multi-run ownership, shared recorder
//! - [`run`]: Run lifecycle, finalization, artifact naming
//! - [`registry`]: Label-to-index mapping
//! - [`consolidate`]: Per-metric run-length state machine
//! - [`interval`]: Sampling interval estimation
//! - [`metric`]: Descriptors, names, labels, samples
//! - [`writer`]: Sample record format and artifact I/O
//! - [`config`]: Recorder configuration
//! - [`error`]: Error types

pub mod config;
pub mod consolidate;
pub mod error;
pub mod interval;
pub mod metric;
pub mod recorder;
pub mod registry;
pub mod run;
pub mod writer;

// Re-export primary API types at crate root for convenience.
pub use config::RecorderConfig;
pub use consolidate::Consolidator;
pub use error::{CoalesceError, Result};
pub use metric::{Label, MetricDescriptor, MetricIndex, MetricNames, Sample};
pub use recorder::{Recorder, SharedRecorder};
pub use registry::MetricRegistry;
pub use run::{FinishSummary, MetricMetadata, Run};
pub use writer::{Compression, SampleRecord, SampleWriter};
