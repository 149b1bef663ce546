//! Job specifications, handles and statuses.
//!
//! A [`JobSpec`] describes one external command to run on the cluster. It is
//! consumed by [`Scheduler::submit`](crate::Scheduler::submit), which hands
//! back a [`JobHandle`] that the waiter owns until the job is terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{Error, JobId, Result};

/// Specification for a job to submit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    /// Local identifier for this job.
    pub id: JobId,
    /// Executable to run.
    pub executable: String,
    /// Arguments passed to the executable, in order.
    pub args: Vec<String>,
    /// Directory the job runs in.
    pub working_dir: PathBuf,
    /// Queue (LSF) or cluster queue (OGS) to submit to.
    pub queue: String,
    /// Wall-clock limit requested from the scheduler.
    pub time_limit: Duration,
    /// Number of cores/slots requested.
    pub slots: u32,
    /// Memory request in gigabytes.
    pub memory_gb: Option<u32>,
    /// Human-readable label, used as the cluster job name.
    pub label: String,
    /// Where the scheduler should write the job's stdout.
    pub stdout: Option<PathBuf>,
    /// Where the scheduler should write the job's stderr.
    pub stderr: Option<PathBuf>,
}

impl JobSpec {
    pub fn builder(executable: impl Into<String>) -> JobSpecBuilder {
        JobSpecBuilder::new(executable)
    }

    /// Check the invariants every backend relies on.
    pub fn validate(&self) -> Result<()> {
        if self.executable.trim().is_empty() {
            return Err(Error::InvalidSpec("executable is empty".to_string()));
        }
        if self.args.is_empty() {
            return Err(Error::InvalidSpec(format!(
                "no arguments given for {}",
                self.executable
            )));
        }
        if self.queue.trim().is_empty() {
            return Err(Error::InvalidSpec("queue is empty".to_string()));
        }
        if self.time_limit.is_zero() {
            return Err(Error::InvalidSpec("time limit must be positive".to_string()));
        }
        if self.slots == 0 {
            return Err(Error::InvalidSpec("slot count must be positive".to_string()));
        }
        if self.memory_gb == Some(0) {
            return Err(Error::InvalidSpec("memory request must be positive".to_string()));
        }
        Ok(())
    }
}

/// Builder for [`JobSpec`]. `build` validates the result.
#[derive(Debug, Clone)]
pub struct JobSpecBuilder {
    executable: String,
    args: Vec<String>,
    working_dir: PathBuf,
    queue: String,
    time_limit: Duration,
    slots: u32,
    memory_gb: Option<u32>,
    label: Option<String>,
    stdout: Option<PathBuf>,
    stderr: Option<PathBuf>,
}

impl JobSpecBuilder {
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            working_dir: PathBuf::from("."),
            queue: String::new(),
            time_limit: Duration::ZERO,
            slots: 1,
            memory_gb: None,
            label: None,
            stdout: None,
            stderr: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    pub fn time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = limit;
        self
    }

    pub fn slots(mut self, slots: u32) -> Self {
        self.slots = slots;
        self
    }

    pub fn memory_gb(mut self, memory_gb: Option<u32>) -> Self {
        self.memory_gb = memory_gb;
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn stdout(mut self, path: Option<PathBuf>) -> Self {
        self.stdout = path;
        self
    }

    pub fn stderr(mut self, path: Option<PathBuf>) -> Self {
        self.stderr = path;
        self
    }

    pub fn build(self) -> Result<JobSpec> {
        // Default the label to the executable's file name.
        let label = self.label.unwrap_or_else(|| {
            Path::new(&self.executable)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.executable.clone())
        });

        let spec = JobSpec {
            id: JobId::new(),
            executable: self.executable,
            args: self.args,
            working_dir: self.working_dir,
            queue: self.queue,
            time_limit: self.time_limit,
            slots: self.slots,
            memory_gb: self.memory_gb,
            label,
            stdout: self.stdout,
            stderr: self.stderr,
        };
        spec.validate()?;
        Ok(spec)
    }
}

/// Why a job ended up failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The scheduler reports the job failed or exited non-zero.
    NonZeroExit,
    /// The wait deadline passed before the job finished.
    TimedOut,
    /// The scheduler could not say what happened to the job.
    Unreachable,
}

/// Status of a submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    /// Queued, not yet started.
    Pending,
    /// Currently running.
    Running,
    /// Finished with exit status zero.
    Succeeded,
    /// Finished unsuccessfully.
    Failed {
        exit_code: Option<i32>,
        reason: FailureReason,
        message: String,
    },
    /// The scheduler did not give a usable answer.
    Unknown,
}

impl JobStatus {
    /// A failure reported by the scheduler for a finished job.
    pub fn exited(exit_code: Option<i32>, message: impl Into<String>) -> Self {
        JobStatus::Failed {
            exit_code,
            reason: FailureReason::NonZeroExit,
            message: message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, JobStatus::Failed { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed { .. } => "failed",
            JobStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle to a submitted job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobHandle {
    /// Local job id, copied from the spec.
    pub id: JobId,
    /// Identifier assigned by the cluster scheduler.
    pub backend_id: String,
    /// Name of the scheduler this job was submitted through.
    pub scheduler: String,
    /// Label from the spec.
    pub label: String,
    pub submitted_at: DateTime<Utc>,
    /// Set when a terminal status is first recorded.
    pub finished_at: Option<DateTime<Utc>>,
    pub status: JobStatus,
}

impl JobHandle {
    /// A freshly submitted job. Status starts as `Pending`.
    pub fn submitted(spec: &JobSpec, backend_id: impl Into<String>, scheduler: &str) -> Self {
        Self {
            id: spec.id,
            backend_id: backend_id.into(),
            scheduler: scheduler.to_string(),
            label: spec.label.clone(),
            submitted_at: Utc::now(),
            finished_at: None,
            status: JobStatus::Pending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Record a newly observed status.
    ///
    /// Terminal statuses are final: once recorded, later observations are
    /// ignored and `false` is returned.
    pub fn record(&mut self, status: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if status.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        let changed = self.status != status;
        self.status = status;
        changed
    }

    /// User-facing description of a failure, if the job failed.
    pub fn diagnostic(&self) -> Option<String> {
        match &self.status {
            JobStatus::Failed {
                exit_code, message, ..
            } => Some(if !message.trim().is_empty() {
                message.trim().to_string()
            } else if let Some(code) = exit_code {
                format!("job {} exited with status {}", self.backend_id, code)
            } else {
                format!("job {} failed, exit status unknown", self.backend_id)
            }),
            _ => None,
        }
    }
}
