//! Processing-time estimates for a summarisation request.
//!
//! The service handles roughly 20,000 characters a minute. Real throughput is
//! not linear in document length, so this is only a rough guide for the
//! loading view.

use chrono::{DateTime, Utc};

/// Assumed service throughput
pub const CHARS_PER_MINUTE: f64 = 20_000.0;

/// Shortest estimate ever shown
pub const MIN_ESTIMATE_SECS: u64 = 15;

/// The service abandons a request after this long
pub const TIMEOUT_SECS: u64 = 480;

/// Failures at or past this elapsed time are most likely timeouts
pub const NEAR_TIMEOUT_SECS: u64 = 470;

/// Estimated processing time in whole seconds for a document of `document_length` characters
pub fn estimate(document_length: usize) -> u64 {
    let seconds = (document_length as f64 / CHARS_PER_MINUTE * 60.0).round() as u64;
    seconds.max(MIN_ESTIMATE_SECS)
}

/// Whether a failure after `elapsed_secs` should be explained as a timeout
pub fn is_likely_timeout(elapsed_secs: u64) -> bool {
    elapsed_secs >= NEAR_TIMEOUT_SECS
}

/// Timing values committed by the coordinator when a request begins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub document_length: usize,
    pub start_time: DateTime<Utc>,
}

impl Timing {
    /// Whole seconds since the request began, never negative
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> u64 {
        (now - self.start_time).num_seconds().max(0) as u64
    }
}

/// Snapshot of a pending request's progress, recomputed on every tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadingProgress {
    pub document_length: usize,
    pub estimated_secs: u64,
    pub elapsed_secs: u64,
}

impl LoadingProgress {
    pub fn at(timing: &Timing, now: DateTime<Utc>) -> Self {
        Self {
            document_length: timing.document_length,
            estimated_secs: estimate(timing.document_length),
            elapsed_secs: timing.elapsed_secs(now),
        }
    }

    pub fn remaining_secs(&self) -> u64 {
        self.estimated_secs.saturating_sub(self.elapsed_secs)
    }

    /// The estimate has passed but the service has not answered yet
    pub fn is_overtime(&self) -> bool {
        self.elapsed_secs > self.estimated_secs
    }

    pub fn seconds_until_timeout(&self) -> u64 {
        TIMEOUT_SECS.saturating_sub(self.elapsed_secs)
    }

    /// Share of the estimate that has elapsed, 0 to 100
    pub fn percent_complete(&self) -> f64 {
        let fraction = 1.0 - self.remaining_secs() as f64 / self.estimated_secs as f64;
        (fraction * 100.0).clamp(0.0, 100.0)
    }

    /// The document was cut at the payload cap
    pub fn is_max_length(&self, max_chars: usize) -> bool {
        self.document_length >= max_chars
    }

    /// One-line status for the loading view
    pub fn status_line(&self) -> String {
        if self.is_overtime() {
            format!(
                "Remaining time until timeout: {} seconds",
                self.seconds_until_timeout()
            )
        } else {
            format!("Estimated time: {} seconds remaining", self.remaining_secs())
        }
    }
}
