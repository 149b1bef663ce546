//! Waiting for submitted jobs to finish.
//!
//! Cluster schedulers only answer status queries, so waiting is a loop:
//! poll every unfinished job, then sleep for the poll interval. A job whose
//! status cannot be determined for `max_unknown_polls` rounds in a row is
//! given up on and reported as failed, and an optional overall timeout fails
//! whatever is still running. Jobs are never cancelled.

use futures::StreamExt;
use futures::stream;
use gridrun_config::WaitConfig;
use gridrun_core::{FailureReason, JobHandle, JobId, JobStatus, Scheduler};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};

/// Longest a single status query may run before it counts as unanswered.
const MAX_QUERY_TIME: Duration = Duration::from_secs(120);

/// Final state of one job in a [`WaitReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobOutcome {
    pub id: JobId,
    pub backend_id: String,
    pub label: String,
    pub status: JobStatus,
    /// Why the job failed, when it did.
    pub diagnostic: Option<String>,
}

impl JobOutcome {
    fn from_handle(handle: &JobHandle) -> Self {
        Self {
            id: handle.id,
            backend_id: handle.backend_id.clone(),
            label: handle.label.clone(),
            status: handle.status.clone(),
            diagnostic: handle.diagnostic(),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status.is_failed()
    }
}

/// Outcome of one `wait_for_all` call, in the order the handles were given.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WaitReport {
    pub outcomes: Vec<JobOutcome>,
    /// Polling rounds performed.
    pub rounds: u32,
}

impl WaitReport {
    /// True when no job failed. An empty report is successful.
    pub fn is_success(&self) -> bool {
        !self.outcomes.iter().any(JobOutcome::is_failed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &JobOutcome> {
        self.outcomes.iter().filter(|o| o.is_failed())
    }
}

/// Blocks until every given job is terminal.
pub struct JobWaiter {
    scheduler: Arc<dyn Scheduler>,
    config: WaitConfig,
}

impl JobWaiter {
    pub fn new(scheduler: Arc<dyn Scheduler>, config: WaitConfig) -> Self {
        Self { scheduler, config }
    }

    pub fn config(&self) -> &WaitConfig {
        &self.config
    }

    /// Poll until every handle is Succeeded or Failed, or the timeout passes.
    ///
    /// Job failures are reported, never returned as errors. Handles that are
    /// already terminal are not polled again.
    pub async fn wait_for_all(&self, handles: &mut [JobHandle]) -> WaitReport {
        let started = Instant::now();
        let deadline = self.config.timeout.map(|t| started + t);
        let max_unknown = self.config.max_unknown_polls.max(1);
        let max_in_flight = self.config.max_concurrent_polls.max(1);

        let mut unknown_streak = vec![0u32; handles.len()];
        let mut rounds = 0u32;

        loop {
            let pending: Vec<usize> = (0..handles.len())
                .filter(|&i| !handles[i].is_terminal())
                .collect();
            if pending.is_empty() {
                break;
            }

            rounds += 1;
            debug!(round = rounds, pending = pending.len(), "Polling jobs");

            let view: &[JobHandle] = handles;
            let scheduler = self.scheduler.as_ref();
            let answers: Vec<_> = stream::iter(pending)
                .map(|i| async move {
                    // A query never outlives the deadline.
                    let limit = match deadline {
                        Some(deadline) => {
                            MAX_QUERY_TIME.min(deadline.saturating_duration_since(Instant::now()))
                        }
                        None => MAX_QUERY_TIME,
                    };
                    (i, timeout(limit, scheduler.poll_status(&view[i])).await)
                })
                .buffered(max_in_flight)
                .collect()
                .await;

            for (i, answer) in answers {
                let handle = &mut handles[i];
                let known = match answer {
                    Ok(Ok(JobStatus::Unknown)) => None,
                    Ok(Ok(status)) => Some(status),
                    Ok(Err(e)) => {
                        warn!(backend_id = %handle.backend_id, error = %e, "Status query failed");
                        None
                    }
                    Err(_) => {
                        warn!(backend_id = %handle.backend_id, "Status query did not answer in time");
                        None
                    }
                };

                match known {
                    Some(status) => {
                        unknown_streak[i] = 0;
                        if handle.record(status) {
                            info!(
                                job_id = %handle.id,
                                backend_id = %handle.backend_id,
                                status = %handle.status,
                                "Job status changed"
                            );
                        }
                    }
                    None => {
                        unknown_streak[i] += 1;
                        if unknown_streak[i] >= max_unknown {
                            warn!(
                                backend_id = %handle.backend_id,
                                polls = unknown_streak[i],
                                "Giving up on job with unknown status"
                            );
                            handle.record(JobStatus::Failed {
                                exit_code: None,
                                reason: FailureReason::Unreachable,
                                message: format!(
                                    "job {} status unknown after {} polls",
                                    handle.backend_id, unknown_streak[i]
                                ),
                            });
                        }
                    }
                }
            }

            if handles.iter().all(JobHandle::is_terminal) {
                break;
            }

            let mut nap = self.config.poll_interval;
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    self.time_out(handles, now - started);
                    break;
                }
                nap = nap.min(deadline - now);
            }
            sleep(nap).await;
        }

        let report = WaitReport {
            outcomes: handles.iter().map(JobOutcome::from_handle).collect(),
            rounds,
        };
        info!(
            jobs = report.outcomes.len(),
            failed = report.failures().count(),
            rounds,
            "Finished waiting for jobs"
        );
        report
    }

    fn time_out(&self, handles: &mut [JobHandle], waited: Duration) {
        for handle in handles.iter_mut().filter(|h| !h.is_terminal()) {
            warn!(backend_id = %handle.backend_id, ?waited, "Timed out waiting for job");
            handle.record(JobStatus::Failed {
                exit_code: None,
                reason: FailureReason::TimedOut,
                message: format!(
                    "timed out after {:?} waiting for job {}",
                    waited, handle.backend_id
                ),
            });
        }
    }
}
