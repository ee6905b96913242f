//! Owner of concurrently active runs.
//!
//! A [`Recorder`] holds any number of [`Run`]s keyed by run id. The first
//! sample logged for an id opens that run; [`Recorder::finish`] closes it and
//! forgets it. Runs never share state, so recording several sessions at once
//! is just a matter of using different ids (or different recorders).
//!
//! [`SharedRecorder`] is the same thing behind a mutex, for producers on
//! several threads feeding one recorder.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::RecorderConfig;
use crate::error::{Result, UsageError};
use crate::metric::{MetricDescriptor, MetricIndex, MetricNames, Sample};
use crate::run::{FinishSummary, Run};

/// Records samples into any number of runs.
#[derive(Debug)]
pub struct Recorder {
    config: RecorderConfig,
    runs: HashMap<String, Run>,
}

impl Recorder {
    /// Creates a recorder, preparing the output directory.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::error::ConfigError`] if the output directory is
    /// unusable.
    pub fn new(config: RecorderConfig) -> Result<Self> {
        config.prepare()?;
        Ok(Self {
            config,
            runs: HashMap::new(),
        })
    }

    /// Logs one sample into run `id`, opening the run if this is its first
    /// sample.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`Run::open`] and [`Run::log_sample`].
    pub fn log_sample(
        &mut self,
        id: &str,
        desc: &MetricDescriptor,
        names: &MetricNames,
        sample: Sample,
    ) -> Result<MetricIndex> {
        if !self.runs.contains_key(id) {
            let run = Run::open(id, &self.config)?;
            self.runs.insert(id.to_string(), run);
        }

        let run = self.runs.get_mut(id).ok_or_else(|| UsageError::NoActiveRun { id: id.to_string() })?;
        run.log_sample(desc, names, sample)
    }

    /// Finishes run `id` and returns its artifact prefix.
    ///
    /// Constant-zero metrics are kept if either `dont_delete` or the
    /// configuration's `keep_constant_zero` is set.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::NoActiveRun`] if no run with this id is active,
    /// including when it was already finished.
    pub fn finish(&mut self, id: &str, dont_delete: bool) -> Result<PathBuf> {
        self.finish_with_summary(id, dont_delete).map(|summary| summary.prefix)
    }

    /// Like [`Recorder::finish`], returning the full [`FinishSummary`].
    ///
    /// # Errors
    ///
    /// See [`Recorder::finish`].
    pub fn finish_with_summary(&mut self, id: &str, dont_delete: bool) -> Result<FinishSummary> {
        let run = self
            .runs
            .remove(id)
            .ok_or_else(|| UsageError::NoActiveRun { id: id.to_string() })?;
        run.finish(dont_delete || self.config.keep_constant_zero)
    }

    /// Finishes every active run, in id order.
    ///
    /// # Errors
    ///
    /// Stops at the first run that fails to finish; runs after it stay active.
    pub fn finish_all(&mut self, dont_delete: bool) -> Result<Vec<FinishSummary>> {
        let ids = self.active_runs();
        ids.iter()
            .map(|id| self.finish_with_summary(id, dont_delete))
            .collect()
    }

    /// Ids of the active runs, sorted.
    pub fn active_runs(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.runs.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Returns true if run `id` is active.
    pub fn is_active(&self, id: &str) -> bool {
        self.runs.contains_key(id)
    }

    /// Returns the active run `id`.
    pub fn run(&self, id: &str) -> Option<&Run> {
        self.runs.get(id)
    }

    /// The recorder's configuration.
    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }
}

/// A [`Recorder`] that can be cloned across producer threads.
///
/// Every call takes the recorder's lock for its whole duration, so each
/// sample's merge-or-flush step is a critical section.
#[derive(Debug, Clone)]
pub struct SharedRecorder {
    inner: Arc<Mutex<Recorder>>,
}

impl SharedRecorder {
    /// Creates a shared recorder.
    ///
    /// # Errors
    ///
    /// See [`Recorder::new`].
    pub fn new(config: RecorderConfig) -> Result<Self> {
        Ok(Self::from(Recorder::new(config)?))
    }

    /// See [`Recorder::log_sample`].
    ///
    /// # Errors
    ///
    /// See [`Recorder::log_sample`].
    pub fn log_sample(
        &self,
        id: &str,
        desc: &MetricDescriptor,
        names: &MetricNames,
        sample: Sample,
    ) -> Result<MetricIndex> {
        self.inner.lock().log_sample(id, desc, names, sample)
    }

    /// See [`Recorder::finish`].
    ///
    /// # Errors
    ///
    /// See [`Recorder::finish`].
    pub fn finish(&self, id: &str, dont_delete: bool) -> Result<PathBuf> {
        self.inner.lock().finish(id, dont_delete)
    }

    /// See [`Recorder::finish_all`].
    ///
    /// # Errors
    ///
    /// See [`Recorder::finish_all`].
    pub fn finish_all(&self, dont_delete: bool) -> Result<Vec<FinishSummary>> {
        self.inner.lock().finish_all(dont_delete)
    }

    /// See [`Recorder::active_runs`].
    pub fn active_runs(&self) -> Vec<String> {
        self.inner.lock().active_runs()
    }
}

impl From<Recorder> for SharedRecorder {
    fn from(recorder: Recorder) -> Self {
        Self {
            inner: Arc::new(Mutex::new(recorder)),
        }
    }
}
