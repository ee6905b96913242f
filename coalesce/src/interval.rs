//! Sampling interval inference.
//!
//! Most producers only report when a sample period ended. The nominal period
//! of a metric is inferred once, from the end times of its first two samples,
//! and used to reconstruct the begin of the very first period.
//!
//! No sign check is done: a producer whose clock goes backwards gets a
//! negative interval and, downstream, records with `begin > end`.

/// Infers the nominal sampling interval from two consecutive end times.
///
/// Returns `None` if the difference does not fit in an `i64`.
#[inline]
pub fn estimate(first_end: i64, second_end: i64) -> Option<i64> {
    second_end.checked_sub(first_end)
}

/// Derives the inclusive begin of a period that ended at `end`.
///
/// Returns `None` if the begin does not fit in an `i64`.
#[inline]
pub fn derive_begin(end: i64, interval: i64) -> Option<i64> {
    end.checked_sub(interval)?.checked_add(1)
}
