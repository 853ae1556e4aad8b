//! Fixed-interval polling of load jobs.
//!
//! There is no push notification for job completion: the job is re-queried
//! on a fixed interval until the warehouse reports it done. An optional
//! deadline and a cancellation token let a caller abandon a stuck job.
//!
//! Cancelling a job is only a request. The warehouse may still finish it,
//! so after asking for a cancel the job is watched for a grace period and a
//! clean finish is reported as a normal result.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{LoadJobRecord, Warehouse};
use crate::error::WarehouseError;

/// Default spacing between status checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// How long a job is watched after a cancel request before giving up on it.
pub const DEFAULT_CANCEL_GRACE: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// `None` waits indefinitely.
    pub timeout: Option<Duration>,
    pub cancel_grace: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
            cancel_grace: DEFAULT_CANCEL_GRACE,
        }
    }
}

impl PollPolicy {
    pub fn new(interval: Duration, timeout: Option<Duration>) -> Self {
        Self {
            interval,
            timeout,
            cancel_grace: DEFAULT_CANCEL_GRACE,
        }
    }

    pub fn from_secs(interval_secs: u64, timeout_secs: Option<u64>) -> Self {
        Self::new(
            Duration::from_secs(interval_secs),
            timeout_secs.map(Duration::from_secs),
        )
    }

    pub fn with_cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace = grace;
        self
    }
}

/// Poll `job_id` until it is done and return its terminal record.
///
/// A terminal record may still carry an error; interpreting it is the
/// caller's job. On deadline or cancellation the job is asked to cancel and
/// watched for `cancel_grace`. If it still finishes without error that
/// record is returned, otherwise the timeout or cancellation is. Only the
/// status check is repeated, never the job itself.
pub async fn wait_for_job(
    warehouse: &dyn Warehouse,
    job_id: &str,
    policy: &PollPolicy,
    cancel: &CancellationToken,
) -> Result<LoadJobRecord, WarehouseError> {
    let start = Instant::now();
    let mut polls: u64 = 0;

    loop {
        let record = warehouse.get_job_status(job_id).await?;
        polls += 1;

        debug!(
            job_id = %job_id,
            state = ?record.state,
            polls,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Polling load job"
        );

        if record.is_terminal() {
            info!(
                job_id = %job_id,
                polls,
                failed = record.error.is_some(),
                "Load job reached terminal state"
            );
            return Ok(record);
        }

        let mut pause = policy.interval;
        if let Some(timeout) = policy.timeout {
            let remaining = timeout.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                warn!(
                    job_id = %job_id,
                    timeout_secs = timeout.as_secs(),
                    "Load job timed out, cancelling"
                );
                let abandoned = WarehouseError::JobTimeout {
                    job_id: job_id.to_string(),
                    seconds: timeout.as_secs(),
                };
                return settle_after_cancel(warehouse, job_id, policy, abandoned).await;
            }
            pause = pause.min(remaining);
        }

        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                warn!(job_id = %job_id, "Wait on load job cancelled");
                let abandoned = WarehouseError::Cancelled { job_id: job_id.to_string() };
                return settle_after_cancel(warehouse, job_id, policy, abandoned).await;
            }
            _ = tokio::time::sleep(pause) => {}
        }
    }
}

/// Request a cancel, then keep checking until the job is done or the grace
/// period runs out. A job that finished cleanly anyway is returned as such;
/// anything else reports `abandoned`.
async fn settle_after_cancel(
    warehouse: &dyn Warehouse,
    job_id: &str,
    policy: &PollPolicy,
    abandoned: WarehouseError,
) -> Result<LoadJobRecord, WarehouseError> {
    if let Err(e) = warehouse.cancel_job(job_id).await {
        warn!(job_id = %job_id, error = %e, "Cancel request failed");
    }

    let deadline = Instant::now() + policy.cancel_grace;
    loop {
        match warehouse.get_job_status(job_id).await {
            Ok(record) if record.is_terminal() => {
                if record.succeeded() {
                    warn!(job_id = %job_id, "Load job finished despite cancel request");
                    return Ok(record);
                }
                info!(
                    job_id = %job_id,
                    error = ?record.error,
                    "Load job stopped after cancel request"
                );
                return Err(abandoned);
            }
            Ok(_) => {}
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Status check after cancel request failed");
            }
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            warn!(
                job_id = %job_id,
                grace_secs = policy.cancel_grace.as_secs(),
                "Load job still not done after cancel request"
            );
            return Err(abandoned);
        }
        tokio::time::sleep(policy.interval.min(remaining)).await;
    }
}
