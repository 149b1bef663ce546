//! Turning tool invocations into submitted jobs.

use gridrun_config::ResourceClasses;
use gridrun_core::{JobHandle, JobSpec, Result, Scheduler};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// A fully formed external tool run, before any resource class is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Executable to run.
    pub executable: String,
    /// Required arguments first, then optional flags.
    pub args: Vec<String>,
    /// Directory the job runs in.
    pub working_dir: PathBuf,
    /// Cluster job name. Defaults to the executable's file name.
    pub label: Option<String>,
    /// Memory request in gigabytes.
    pub memory_gb: Option<u32>,
    pub stdout: Option<PathBuf>,
    pub stderr: Option<PathBuf>,
}

impl ToolInvocation {
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            working_dir: PathBuf::from("."),
            label: None,
            memory_gb: None,
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

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_memory_gb(mut self, memory_gb: u32) -> Self {
        self.memory_gb = Some(memory_gb);
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    /// Send the job's stdout and stderr to `<dir>/<label>.out` and `.err`.
    pub fn with_logs_in(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let stem = self.label.clone().unwrap_or_else(|| "job".to_string());
        self.stdout = Some(dir.join(format!("{}.out", stem)));
        self.stderr = Some(dir.join(format!("{}.err", stem)));
        self
    }
}

/// Submits tool invocations to a scheduler, applying resource classes.
pub struct JobSubmitter {
    scheduler: Arc<dyn Scheduler>,
    classes: ResourceClasses,
}

impl JobSubmitter {
    pub fn new(scheduler: Arc<dyn Scheduler>, classes: ResourceClasses) -> Self {
        Self { scheduler, classes }
    }

    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.scheduler
    }

    /// Build the spec that `submit` would hand to the scheduler.
    pub fn build_spec(
        &self,
        invocation: &ToolInvocation,
        resource_class: &str,
    ) -> Result<JobSpec> {
        let class = self.classes.resolve(resource_class)?;

        let mut builder = JobSpec::builder(invocation.executable.clone())
            .args(invocation.args.iter().cloned())
            .working_dir(invocation.working_dir.clone())
            .queue(class.queue.clone())
            .time_limit(class.time_limit)
            .slots(class.slots)
            .memory_gb(invocation.memory_gb)
            .stdout(invocation.stdout.clone())
            .stderr(invocation.stderr.clone());
        if let Some(ref label) = invocation.label {
            builder = builder.label(label.clone());
        }
        builder.build()
    }

    /// Submit exactly one job for `invocation` in `resource_class`.
    ///
    /// Submission failures are returned as-is; nothing is retried.
    pub async fn submit(
        &self,
        invocation: &ToolInvocation,
        resource_class: &str,
    ) -> Result<JobHandle> {
        let spec = self.build_spec(invocation, resource_class)?;
        info!(
            job_id = %spec.id,
            label = %spec.label,
            resource_class,
            scheduler = self.scheduler.name(),
            "Submitting job"
        );
        self.scheduler.submit(spec).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubScheduler;
    use gridrun_core::{Error, JobStatus};
    use std::time::Duration;

    fn invocation() -> ToolInvocation {
        ToolInvocation::new("/opt/meme/bin/dreme")
            .args(["-oc", "dreme_out", "-p", "pos.fa"])
            .with_label("dreme-test")
            .with_memory_gb(8)
    }

    #[test]
    fn test_build_spec_applies_resource_class() {
        let submitter =
            JobSubmitter::new(Arc::new(StubScheduler::new()), ResourceClasses::builtin());

        let spec = submitter.build_spec(&invocation(), "hour").unwrap();
        assert_eq!(spec.queue, "hour");
        assert_eq!(spec.time_limit, Duration::from_secs(3600));
        assert_eq!(spec.slots, 1);
        assert_eq!(spec.memory_gb, Some(8));
        assert_eq!(spec.label, "dreme-test");
        assert_eq!(spec.args, vec!["-oc", "dreme_out", "-p", "pos.fa"]);

        let day = submitter.build_spec(&invocation(), "day").unwrap();
        assert_eq!(day.queue, "day");
        assert_eq!(day.slots, 2);
    }

    #[test]
    fn test_build_spec_is_deterministic() {
        let submitter =
            JobSubmitter::new(Arc::new(StubScheduler::new()), ResourceClasses::builtin());
        let a = submitter.build_spec(&invocation(), "hour").unwrap();
        let b = submitter.build_spec(&invocation(), "hour").unwrap();
        assert_eq!(a.executable, b.executable);
        assert_eq!(a.args, b.args);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_logs_follow_label() {
        let inv = invocation().with_logs_in("/data/logs");
        assert_eq!(inv.stdout, Some(PathBuf::from("/data/logs/dreme-test.out")));
        assert_eq!(inv.stderr, Some(PathBuf::from("/data/logs/dreme-test.err")));
    }

    #[tokio::test]
    async fn test_submit_creates_one_pending_job() {
        let stub = Arc::new(StubScheduler::new());
        let submitter = JobSubmitter::new(stub.clone(), ResourceClasses::builtin());

        let handle = submitter.submit(&invocation(), "hour").await.unwrap();
        assert_eq!(handle.status, JobStatus::Pending);
        assert_eq!(handle.scheduler, "stub");
        assert_eq!(stub.submitted().len(), 1);
        assert_eq!(stub.polls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_resource_class() {
        let stub = Arc::new(StubScheduler::new());
        let submitter = JobSubmitter::new(stub.clone(), ResourceClasses::builtin());

        let err = submitter.submit(&invocation(), "fortnight").await.unwrap_err();
        assert!(matches!(err, Error::UnknownResourceClass(ref c) if c == "fortnight"));
        assert!(stub.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_empty_invocation_rejected() {
        let stub = Arc::new(StubScheduler::new());
        let submitter = JobSubmitter::new(stub.clone(), ResourceClasses::builtin());

        let err = submitter
            .submit(&ToolInvocation::new("/opt/meme/bin/fimo"), "hour")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSpec(_)));
        assert!(stub.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_submission_error_propagates() {
        let stub = Arc::new(StubScheduler::new().reject("dreme-test", "queue closed"));
        let submitter = JobSubmitter::new(stub.clone(), ResourceClasses::builtin());

        let err = submitter.submit(&invocation(), "hour").await.unwrap_err();
        assert!(matches!(err, Error::Submission { ref message, .. } if message == "queue closed"));
    }
}
