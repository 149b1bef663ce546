//! Scheduler kinds and the trait cluster backends implement.

use async_trait::async_trait;
use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::job::{JobHandle, JobSpec, JobStatus};
use crate::{Error, Result};

/// The cluster schedulers gridrun can submit to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum SchedulerKind {
    /// IBM Platform LSF. Jobs go to named queues via `bsub`.
    #[display("LSF")]
    #[serde(rename = "LSF")]
    Lsf,
    /// Open Grid Scheduler / Grid Engine. Requires a session.
    #[display("OGS")]
    #[serde(rename = "OGS")]
    Ogs,
}

impl SchedulerKind {
    pub const ALL: [SchedulerKind; 2] = [SchedulerKind::Lsf, SchedulerKind::Ogs];

    /// Map a configuration value to a scheduler kind. Matching is exact and
    /// case-sensitive.
    pub fn resolve(name: &str) -> Result<Self> {
        match name {
            "LSF" => Ok(SchedulerKind::Lsf),
            "OGS" => Ok(SchedulerKind::Ogs),
            other => Err(Error::UnknownScheduler(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulerKind::Lsf => "LSF",
            SchedulerKind::Ogs => "OGS",
        }
    }

    /// Whether submissions need an open session with the scheduler daemon.
    pub fn requires_session(&self) -> bool {
        match self {
            SchedulerKind::Lsf => false,
            SchedulerKind::Ogs => true,
        }
    }
}

impl std::str::FromStr for SchedulerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::resolve(s)
    }
}

/// Trait for cluster scheduler backends.
///
/// Implementations never mutate a [`JobHandle`]; they only answer what the
/// scheduler currently says about it.
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Name recorded on every handle this scheduler returns.
    fn name(&self) -> &'static str;

    /// Submit a job. Returns as soon as the scheduler has accepted it, with
    /// the handle in `Pending`.
    async fn submit(&self, spec: JobSpec) -> Result<JobHandle>;

    /// Ask the scheduler for the current status of a submitted job.
    async fn poll_status(&self, handle: &JobHandle) -> Result<JobStatus>;

    /// Release anything held open against the scheduler. Safe to call more
    /// than once.
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}
