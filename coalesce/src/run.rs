//! A single recording session and its finalization pass.
//!
//! A [`Run`] owns everything one recording needs: the metric registry, the
//! per-metric consolidation state and the open sample stream. It is created
//! by the first sample for a run id and consumed by [`Run::finish`], which
//! writes the final pending run of every metric, prunes metrics that never
//! did any work, closes the stream and writes the metadata side-car.
//!
//! # Artifacts
//!
//! For run id `42` in output directory `out/`:
//!
//! ```text
//! out/metric-data-42.csv[.sz]    index,begin,end,value per line
//! out/metric-data-42.json[.sz]   [{"idx":0,"desc":{...},"names":{...}}, ...]
//! ```
//!
//! The side-car is only written when at least one metric survives pruning.
//!
//! # Example
//!
//! ```rust,no_run
//! use coalesce::{MetricDescriptor, MetricNames, RecorderConfig, Run, Sample};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RecorderConfig::new("/tmp/coalesce");
//! config.prepare()?;
//! let mut run = Run::open("0", &config)?;
//!
//! let desc = MetricDescriptor::new("ovs", "packets-sec").with_class("throughput");
//! let names = MetricNames::new().with("interface", "p2p1");
//! run.log_sample(&desc, &names, Sample::new(15000, 1000.0))?;
//! run.log_sample(&desc, &names, Sample::new(16000, 1000.0))?;
//!
//! let summary = run.finish(false)?;
//! println!("artifacts at {}", summary.prefix.display());
//! # Ok(())
//! # }
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::config::RecorderConfig;
use crate::consolidate::{Consolidator, FinalFlush};
use crate::error::{DataShapeError, Result, UsageError};
use crate::metric::{Label, MetricDescriptor, MetricIndex, MetricNames, Sample};
use crate::registry::MetricRegistry;
use crate::writer::{self, Compression, SampleWriter};

/// Prefix shared by the artifacts of every run.
const ARTIFACT_STEM: &str = "metric-data-";

/// One element of the metadata side-car.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricMetadata {
    /// Index used for this metric in the sample stream.
    pub idx: MetricIndex,
    /// What the metric measures.
    pub desc: MetricDescriptor,
    /// The metric's discriminators.
    pub names: MetricNames,
}

/// Paths of a run's artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunArtifacts {
    /// Common prefix, returned to callers of `finish`.
    pub prefix: PathBuf,
    /// The sample stream.
    pub samples: PathBuf,
    /// The metadata side-car.
    pub metadata: PathBuf,
}

impl RunArtifacts {
    /// Computes the artifact paths for run `id` under `output_dir`.
    pub fn new(output_dir: &Path, id: &str, compression: Compression) -> Self {
        let prefix = output_dir.join(format!("{ARTIFACT_STEM}{id}"));
        let samples = with_suffix(&prefix, ".csv", compression);
        let metadata = with_suffix(&prefix, ".json", compression);
        Self {
            prefix,
            samples,
            metadata,
        }
    }
}

fn with_suffix(prefix: &Path, extension: &str, compression: Compression) -> PathBuf {
    let mut name = OsString::from(prefix.as_os_str());
    name.push(extension);
    name.push(compression.suffix());
    PathBuf::from(name)
}

/// Checks that a run id can be embedded in a file name.
///
/// # Errors
///
/// Returns [`UsageError::InvalidRunId`] if `id` is empty or contains a path
/// separator or NUL byte.
pub fn validate_run_id(id: &str) -> Result<()> {
    let reason = if id.is_empty() {
        "must not be empty"
    } else if id.contains(['/', '\\']) {
        "must not contain path separators"
    } else if id.contains('\0') {
        "must not contain NUL"
    } else {
        return Ok(());
    };

    Err(UsageError::InvalidRunId {
        id: id.to_string(),
        reason: reason.to_string(),
    }
    .into())
}

/// Outcome of finishing a run.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishSummary {
    /// The run id.
    pub id: String,
    /// Artifact prefix (no extension).
    pub prefix: PathBuf,
    /// Path of the sample stream.
    pub samples_path: PathBuf,
    /// Path of the metadata side-car, if one was written.
    pub metadata_path: Option<PathBuf>,
    /// Distinct metrics seen.
    pub metrics: usize,
    /// Metrics pruned because they only ever reported zero.
    pub purged: Vec<MetricIndex>,
    /// Records written to the sample stream, including the final flush.
    pub records: u64,
    /// Samples ingested.
    pub samples_ingested: u64,
}

/// A single recording session.
#[derive(Debug)]
pub struct Run {
    id: String,
    artifacts: RunArtifacts,
    compression: Compression,
    registry: MetricRegistry,
    consolidator: Consolidator,
    writer: SampleWriter,
    /// Set once a record failed to be written.
    failed: bool,
}

impl Run {
    /// Opens a run, creating its sample stream under `config.output_dir`.
    ///
    /// The output directory must already exist; see
    /// [`RecorderConfig::prepare`].
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::InvalidRunId`] for an unusable id, or an
    /// [`crate::error::ArtifactIoError`] if the stream cannot be created.
    pub fn open(id: &str, config: &RecorderConfig) -> Result<Self> {
        validate_run_id(id)?;

        let artifacts = RunArtifacts::new(&config.output_dir, id, config.compression);
        let writer = SampleWriter::create(&artifacts.samples, config.compression)?;

        info!(run = id, path = %artifacts.samples.display(), "opened run");

        Ok(Self {
            id: id.to_string(),
            artifacts,
            compression: config.compression,
            registry: MetricRegistry::new(),
            consolidator: Consolidator::new(),
            writer,
            failed: false,
        })
    }

    /// Records one sample for the metric identified by `desc` and `names`.
    ///
    /// Returns the metric's index. The metric is registered on its first
    /// sample; a record is written whenever its value changes.
    ///
    /// # Errors
    ///
    /// Returns a [`DataShapeError`] for an empty descriptor field, a
    /// non-finite value or an overflowing clock reading, or an
    /// [`crate::error::ArtifactIoError`] if writing a record fails. After a
    /// failed write every later call returns [`UsageError::RunFailed`].
    pub fn log_sample(
        &mut self,
        desc: &MetricDescriptor,
        names: &MetricNames,
        sample: Sample,
    ) -> Result<MetricIndex> {
        self.check_not_failed()?;
        desc.validate()?;
        if !sample.value.is_finite() {
            return Err(DataShapeError::NonFiniteValue {
                label: Label::new(desc, names).to_string(),
                value: sample.value,
            }
            .into());
        }

        let index = self.registry.resolve_or_create(desc, names);

        if let Some(record) = self.consolidator.ingest(index, sample)? {
            if let Err(e) = self.writer.append(&record) {
                warn!(run = %self.id, %record, "record lost, stopping run");
                self.failed = true;
                return Err(e);
            }
            self.consolidator.mark_written(index)?;
            trace!(run = %self.id, %record, "flushed");
        }

        Ok(index)
    }

    /// Ends the run.
    ///
    /// Every metric's pending run is written, except metrics whose only run
    /// is zero and that never had a record written, which are pruned unless
    /// `dont_delete` is set. The sample stream is closed and the metadata
    /// side-car is written for the surviving metrics.
    ///
    /// # Errors
    ///
    /// Returns an [`crate::error::ArtifactIoError`] if an artifact cannot be
    /// written, a [`DataShapeError`] if a final begin overflows or the
    /// metadata cannot be serialized, or [`UsageError::RunFailed`] if an
    /// earlier write failed.
    pub fn finish(mut self, dont_delete: bool) -> Result<FinishSummary> {
        self.check_not_failed()?;

        let metrics = self.registry.len();
        let samples_ingested = self.consolidator.ingested();

        let mut purged = Vec::new();
        let mut survivors = Vec::new();
        for flush in self.consolidator.drain(dont_delete)? {
            match flush {
                FinalFlush::Purge(index) => {
                    debug!(run = %self.id, %index, "pruning constant-zero metric");
                    purged.push(index);
                }
                FinalFlush::Flush(record) => {
                    self.writer.append(&record)?;
                    survivors.push(record.index);
                }
            }
        }

        let records = self.writer.records();
        let samples_path = self.writer.finish()?;

        let metadata: Vec<MetricMetadata> = survivors
            .into_iter()
            .map(|index| -> Result<MetricMetadata> {
                let info = self
                    .registry
                    .get(index)
                    .ok_or(UsageError::UnknownMetric { index: index.0 })?;
                Ok(MetricMetadata {
                    idx: index,
                    desc: info.desc.clone(),
                    names: info.names.clone(),
                })
            })
            .collect::<Result<_>>()?;

        let metadata_path = if metadata.is_empty() {
            None
        } else {
            writer::write_json(&self.artifacts.metadata, self.compression, &metadata)?;
            Some(self.artifacts.metadata.clone())
        };

        info!(
            run = %self.id,
            metrics,
            purged = purged.len(),
            records,
            samples_ingested,
            "finished run"
        );

        Ok(FinishSummary {
            id: self.id,
            prefix: self.artifacts.prefix,
            samples_path,
            metadata_path,
            metrics,
            purged,
            records,
            samples_ingested,
        })
    }

    fn check_not_failed(&self) -> Result<()> {
        if self.failed {
            return Err(UsageError::RunFailed { id: self.id.clone() }.into());
        }
        Ok(())
    }

    /// Returns true if a record failed to be written and the run stopped.
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// The run id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Paths this run writes to.
    pub fn artifacts(&self) -> &RunArtifacts {
        &self.artifacts
    }

    /// The run's metric registry.
    pub fn registry(&self) -> &MetricRegistry {
        &self.registry
    }

    /// The run's consolidation state.
    pub fn consolidator(&self) -> &Consolidator {
        &self.consolidator
    }
}

/// Reads a metadata side-car back.
///
/// # Errors
///
/// Returns an [`crate::error::ArtifactIoError`] if the file cannot be opened,
/// or [`DataShapeError::MetadataParse`] if it is not a metadata array.
pub fn read_metadata<P: AsRef<Path>>(path: P, compression: Compression) -> Result<Vec<MetricMetadata>> {
    let path = path.as_ref();
    let reader = writer::open_artifact(path, compression)?;
    let metadata = serde_json::from_reader(reader).map_err(|e| DataShapeError::MetadataParse {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(metadata)
}
