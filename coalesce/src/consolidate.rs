//! Streaming run-length consolidation of metric samples.
//!
//! The consolidator keeps at most one open run per metric: the
//! [`PendingSample`]. Each incoming sample either extends that run (same
//! value) or closes it (different value), in which case the closed run is
//! returned as a [`SampleRecord`] for the caller to write. Memory use is
//! proportional to the number of distinct metrics, never to stream length.
//!
//! # Ingest Flow
//!
//! ```text
//! sample ─► first for index? ──yes──► store as pending
//!                 │no
//!                 ▼
//!           interval unset? ──yes──► interval = end - pending.end
//!                 │
//!                 ▼
//!           same value? ──yes──► pending.end = end
//!                 │no
//!                 ▼
//!           pending.begin unset? ──yes──► begin = pending.end - interval + 1
//!                 │
//!                 ▼
//!           emit pending, start a new pending at old end + 1
//! ```
//!
//! The final run of every metric is only written by [`Consolidator::drain`],
//! which also decides whether a metric that never did any work is pruned.
//!
//! Clock arithmetic is checked. A reading whose interval or begin does not
//! fit in an `i64` is rejected with [`DataShapeError::ClockOverflow`] and
//! leaves the pending run as it was.

use crate::error::{DataShapeError, Result, UsageError};
use crate::interval;
use crate::metric::{MetricIndex, Sample};
use crate::writer::SampleRecord;

/// The run currently accumulating for one metric, not yet durable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingSample {
    /// Begin of the run. Absent only before the first flush of a metric whose
    /// producer does not report begins; it is then derived from the run's end
    /// and the metric's interval at flush time.
    pub begin: Option<i64>,
    /// End of the last sample merged into the run.
    pub end: i64,
    /// The value shared by every sample in the run.
    pub value: f64,
}

impl From<Sample> for PendingSample {
    fn from(sample: Sample) -> Self {
        Self {
            begin: sample.begin,
            end: sample.end,
            value: sample.value,
        }
    }
}

/// What the finalization pass does with one metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FinalFlush {
    /// The metric only ever reported zero and nothing was written for it.
    Purge(MetricIndex),
    /// The last pending run, to be written unconditionally.
    Flush(SampleRecord),
}

/// Per-metric consolidation state.
#[derive(Debug)]
struct MetricState {
    pending: PendingSample,
    interval: Option<i64>,
    written: u64,
}

/// Per-run consolidation state for every metric.
#[derive(Debug, Default)]
pub struct Consolidator {
    /// Indexed by `MetricIndex`.
    states: Vec<Option<MetricState>>,
    /// Samples ingested, for diagnostics.
    ingested: u64,
    /// Records emitted because a value changed.
    consolidated: u64,
}

impl Consolidator {
    /// Creates an empty consolidator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one sample for `index`.
    ///
    /// Returns the closed run when `sample` carries a different value than
    /// the pending one. The caller must write it and then report the write
    /// with [`Consolidator::mark_written`].
    ///
    /// Indices are dense: a new metric must use the next unused index.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::UnknownMetric`] if `index` skips past the next
    /// unused index, [`UsageError::IntervalUnset`] if a begin has to be
    /// derived before any interval is known, or
    /// [`DataShapeError::ClockOverflow`] if interval or begin arithmetic
    /// overflows. On error the pending run is left unchanged.
    pub fn ingest(&mut self, index: MetricIndex, sample: Sample) -> Result<Option<SampleRecord>> {
        let slot = index.as_usize();
        if slot > self.states.len() {
            return Err(UsageError::UnknownMetric { index: index.0 }.into());
        }
        self.ingested += 1;

        if slot == self.states.len() {
            self.states.push(None);
        }

        let Some(state) = self.states[slot].as_mut() else {
            self.states[slot] = Some(MetricState {
                pending: sample.into(),
                interval: None,
                written: 0,
            });
            return Ok(None);
        };

        let overflow = || DataShapeError::ClockOverflow {
            index: index.0,
            end: sample.end,
        };

        // Only ever true on the second sample of a metric.
        if state.interval.is_none() {
            let estimated = interval::estimate(state.pending.end, sample.end).ok_or_else(overflow)?;
            state.interval = Some(estimated);
        }

        if sample.value == state.pending.value {
            state.pending.end = sample.end;
            return Ok(None);
        }

        let begin = match state.pending.begin {
            Some(begin) => begin,
            None => {
                let interval = state
                    .interval
                    .ok_or(UsageError::IntervalUnset { index: index.0 })?;
                interval::derive_begin(state.pending.end, interval).ok_or_else(overflow)?
            }
        };
        let next_begin = match sample.begin {
            Some(begin) => begin,
            None => state.pending.end.checked_add(1).ok_or_else(overflow)?,
        };

        let record = SampleRecord {
            index,
            begin,
            end: state.pending.end,
            value: state.pending.value,
        };

        state.pending = PendingSample {
            begin: Some(next_begin),
            end: sample.end,
            value: sample.value,
        };
        self.consolidated += 1;

        Ok(Some(record))
    }

    /// Records that a record for `index` was durably written.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::UnknownMetric`] if `index` has never been ingested.
    pub fn mark_written(&mut self, index: MetricIndex) -> Result<()> {
        let state = self
            .states
            .get_mut(index.as_usize())
            .and_then(Option::as_mut)
            .ok_or(UsageError::UnknownMetric { index: index.0 })?;
        state.written += 1;
        Ok(())
    }

    /// Ends the run: decides, per metric in index order, whether to purge it
    /// or flush its pending run, and clears all state.
    ///
    /// A metric is purged when its pending value is zero, nothing was written
    /// for it yet and `keep_constant_zero` is false. A missing begin is
    /// derived from the interval as on any other flush; a metric seen exactly
    /// once has no interval and is flushed with `begin = end`.
    ///
    /// # Errors
    ///
    /// Returns [`DataShapeError::ClockOverflow`] if a derived begin does not
    /// fit in an `i64`. All state is cleared either way.
    pub fn drain(&mut self, keep_constant_zero: bool) -> Result<Vec<FinalFlush>> {
        let states = std::mem::take(&mut self.states);

        states
            .into_iter()
            .enumerate()
            .filter_map(|(slot, state)| state.map(|s| (slot, s)))
            .map(|(slot, state)| -> Result<FinalFlush> {
                #[allow(clippy::cast_possible_truncation)] // slots come from u32 indices
                let index = MetricIndex(slot as u32);
                if state.pending.value == 0.0 && state.written == 0 && !keep_constant_zero {
                    return Ok(FinalFlush::Purge(index));
                }
                let begin = match (state.pending.begin, state.interval) {
                    (Some(begin), _) => begin,
                    (None, Some(interval)) => interval::derive_begin(state.pending.end, interval).ok_or(
                        DataShapeError::ClockOverflow {
                            index: index.0,
                            end: state.pending.end,
                        },
                    )?,
                    (None, None) => state.pending.end,
                };
                Ok(FinalFlush::Flush(SampleRecord {
                    index,
                    begin,
                    end: state.pending.end,
                    value: state.pending.value,
                }))
            })
            .collect()
    }

    /// Returns the pending run for `index`.
    pub fn pending(&self, index: MetricIndex) -> Option<&PendingSample> {
        self.state(index).map(|s| &s.pending)
    }

    /// Returns the inferred interval for `index`, once two samples were seen.
    pub fn interval(&self, index: MetricIndex) -> Option<i64> {
        self.state(index).and_then(|s| s.interval)
    }

    /// Returns how many records were written for `index`.
    pub fn written_count(&self, index: MetricIndex) -> Option<u64> {
        self.state(index).map(|s| s.written)
    }

    /// Total samples ingested since creation.
    pub fn ingested(&self) -> u64 {
        self.ingested
    }

    /// Total records emitted because a value changed.
    pub fn consolidated(&self) -> u64 {
        self.consolidated
    }

    /// Number of metrics with state.
    pub fn metric_count(&self) -> usize {
        self.states.iter().filter(|s| s.is_some()).count()
    }

    fn state(&self, index: MetricIndex) -> Option<&MetricState> {
        self.states.get(index.as_usize()).and_then(Option::as_ref)
    }
}
