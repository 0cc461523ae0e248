//! Job retry handling
//!
//! Capped exponential backoff between retries, and the sticky
//! auto-disable that deactivates a job after too many consecutive
//! failures. Reactivation is a deliberate operator action, never
//! automatic.

use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use crate::model::{RetryPolicy, ScheduledJob};

/// Decides whether and when a failed job runs again.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryHandler;

impl RetryHandler {
    /// Whether the job has retry budget left.
    ///
    /// A deactivated job never retries, regardless of budget, and
    /// neither does one whose consecutive failures have reached its
    /// threshold even if it was re-enabled without a counter reset.
    #[must_use]
    pub fn should_retry(&self, job: &ScheduledJob) -> bool {
        job.is_active
            && job.retry_count < job.retry_policy.max_retries
            && job.consecutive_failures < job.failure_threshold
    }

    /// Backoff before retry number `retry_count` (0-indexed), capped at
    /// the policy ceiling.
    #[must_use]
    pub fn backoff_delay(&self, policy: &RetryPolicy, retry_count: u32) -> Duration {
        let raw = policy.base_delay_seconds as f64
            * policy.backoff_multiplier.powi(retry_count as i32);
        let capped = raw.min(policy.max_backoff_seconds as f64);
        Duration::seconds(capped as i64)
    }

    /// When the job's next retry becomes due.
    #[must_use]
    pub fn next_retry_time(&self, job: &ScheduledJob, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.backoff_delay(&job.retry_policy, job.retry_count)
    }

    /// Record one failure on the job.
    ///
    /// Increments the retry and consecutive-failure counters, and trips
    /// the sticky auto-disable once consecutive failures reach the
    /// job's threshold. Returns true when the job was disabled by this
    /// failure.
    pub fn record_failure(&self, job: &mut ScheduledJob) -> bool {
        job.retry_count += 1;
        job.consecutive_failures += 1;

        if job.is_active && job.consecutive_failures >= job.failure_threshold {
            job.is_active = false;
            warn!(
                job_id = %job.id,
                consecutive_failures = job.consecutive_failures,
                threshold = job.failure_threshold,
                "Job auto-disabled after repeated failures"
            );
            return true;
        }
        false
    }

    /// Clear the failure chain after a successful run.
    pub fn reset_retry_state(&self, job: &mut ScheduledJob) {
        job.retry_count = 0;
        job.consecutive_failures = 0;
        job.next_retry_at = None;
    }
}
