//! LSF backend.
//!
//! Jobs are submitted with `bsub` to a named queue and tracked with `bjobs`.

use async_trait::async_trait;
use gridrun_config::LsfOptions;
use gridrun_core::{Error, JobHandle, JobSpec, JobStatus, Result, Scheduler};
use regex::Regex;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::backend::job_name;
use crate::runner::{CommandRunner, ProcessRunner};

/// `bsub` reports e.g. `Job <12345> is submitted to queue <hour>.`
static SUBMITTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Job <(\d+)> is submitted").expect("valid regex"));

/// Columns requested from `bjobs -o`.
const BJOBS_FORMAT: &str = "stat exit_code delimiter=','";

/// Backend for IBM Platform LSF.
pub struct LsfBackend {
    runner: Arc<dyn CommandRunner>,
    options: LsfOptions,
}

impl LsfBackend {
    /// Create a backend that runs the LSF tools found on `PATH`.
    pub fn new(options: LsfOptions) -> Self {
        Self::with_runner(Arc::new(ProcessRunner), options)
    }

    /// Create with a custom command runner.
    pub fn with_runner(runner: Arc<dyn CommandRunner>, options: LsfOptions) -> Self {
        Self { runner, options }
    }

    fn submit_args(&self, spec: &JobSpec) -> Vec<String> {
        let mut args = vec![
            "-J".to_string(),
            job_name(&spec.label),
            "-q".to_string(),
            spec.queue.clone(),
            "-W".to_string(),
            format_run_limit(spec.time_limit),
            "-n".to_string(),
            spec.slots.to_string(),
        ];

        let mut requirements = Vec::new();
        if let Some(memory_gb) = spec.memory_gb {
            requirements.push(format!("rusage[mem={}G]", memory_gb));
        }
        if spec.slots > 1 {
            requirements.push("span[hosts=1]".to_string());
        }
        if !requirements.is_empty() {
            args.push("-R".to_string());
            args.push(requirements.join(" "));
        }

        if let Some(ref project) = self.options.project {
            args.push("-P".to_string());
            args.push(project.clone());
        }

        args.push("-cwd".to_string());
        args.push(spec.working_dir.to_string_lossy().to_string());

        if let Some(ref stdout) = spec.stdout {
            args.push("-o".to_string());
            args.push(stdout.to_string_lossy().to_string());
        }
        if let Some(ref stderr) = spec.stderr {
            args.push("-e".to_string());
            args.push(stderr.to_string_lossy().to_string());
        }

        args.push(spec.executable.clone());
        args.extend(spec.args.iter().cloned());
        args
    }
}

#[async_trait]
impl Scheduler for LsfBackend {
    fn name(&self) -> &'static str {
        "LSF"
    }

    async fn submit(&self, spec: JobSpec) -> Result<JobHandle> {
        spec.validate()?;
        let args = self.submit_args(&spec);

        info!(job_id = %spec.id, label = %spec.label, queue = %spec.queue, "Submitting job to LSF");
        let output = self
            .runner
            .run("bsub", &args)
            .await
            .map_err(|e| submission_error(format!("failed to run bsub: {}", e)))?;

        if !output.success() {
            return Err(submission_error(output.diagnostic()));
        }

        let backend_id = parse_submitted_id(&output.stdout).ok_or_else(|| {
            submission_error(format!(
                "could not find job id in bsub output: {}",
                output.stdout.trim()
            ))
        })?;

        info!(job_id = %spec.id, backend_id = %backend_id, "LSF accepted job");
        Ok(JobHandle::submitted(&spec, backend_id, self.name()))
    }

    async fn poll_status(&self, handle: &JobHandle) -> Result<JobStatus> {
        let args = vec![
            "-noheader".to_string(),
            "-o".to_string(),
            BJOBS_FORMAT.to_string(),
            handle.backend_id.clone(),
        ];

        let output = self
            .runner
            .run("bjobs", &args)
            .await
            .map_err(|e| Error::Poll(format!("failed to run bjobs: {}", e)))?;

        if !output.success() || output.stdout.trim().is_empty() {
            warn!(backend_id = %handle.backend_id, error = %output.diagnostic(), "bjobs query failed");
            return Err(Error::Poll(output.diagnostic()));
        }

        let status = parse_bjobs_line(&output.stdout);
        debug!(backend_id = %handle.backend_id, status = %status, "Polled LSF job");
        Ok(status)
    }
}

fn submission_error(message: String) -> Error {
    Error::Submission {
        scheduler: "LSF".to_string(),
        message,
    }
}

/// Format a wall-clock limit as LSF's `[hours:]minutes`, rounding up to
/// whole minutes.
fn format_run_limit(limit: Duration) -> String {
    let minutes = limit.as_secs().div_ceil(60).max(1);
    format!("{}:{:02}", minutes / 60, minutes % 60)
}

fn parse_submitted_id(stdout: &str) -> Option<String> {
    SUBMITTED_RE
        .captures(stdout)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn parse_bjobs_line(stdout: &str) -> JobStatus {
    let line = stdout.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    let mut fields = line.split(',').map(str::trim);
    let stat = fields.next().unwrap_or("");
    let exit_code = fields.next().and_then(|c| c.parse::<i32>().ok());

    match stat {
        "PEND" | "PSUSP" | "WAIT" => JobStatus::Pending,
        "RUN" | "PROV" | "USUSP" | "SSUSP" => JobStatus::Running,
        "DONE" => JobStatus::Succeeded,
        "EXIT" => JobStatus::exited(exit_code, ""),
        _ => JobStatus::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRunner;
    use gridrun_core::FailureReason;
    use std::path::PathBuf;

    fn make_test_spec() -> JobSpec {
        JobSpec::builder("/opt/meme/bin/dreme")
            .args(["-oc", "out", "-p", "pos.fa"])
            .queue("hour")
            .time_limit(Duration::from_secs(3600))
            .memory_gb(Some(8))
            .working_dir("/data/motifs")
            .label("dreme run 1")
            .build()
            .unwrap()
    }

    fn backend(runner: Arc<ScriptedRunner>) -> LsfBackend {
        LsfBackend::with_runner(runner, LsfOptions::default())
    }

    #[test]
    fn test_format_run_limit() {
        assert_eq!(format_run_limit(Duration::from_secs(3600)), "1:00");
        assert_eq!(format_run_limit(Duration::from_secs(90)), "0:02");
        assert_eq!(format_run_limit(Duration::from_secs(1)), "0:01");
        assert_eq!(format_run_limit(Duration::from_secs(7 * 24 * 3600)), "168:00");
    }

    #[test]
    fn test_parse_submitted_id() {
        assert_eq!(
            parse_submitted_id("Job <48213> is submitted to queue <hour>.\n").as_deref(),
            Some("48213")
        );
        assert_eq!(parse_submitted_id("Request aborted by esub."), None);
    }

    #[test]
    fn test_parse_bjobs_states() {
        assert_eq!(parse_bjobs_line("PEND,-\n"), JobStatus::Pending);
        assert_eq!(parse_bjobs_line("RUN,-"), JobStatus::Running);
        assert_eq!(parse_bjobs_line("SSUSP,-"), JobStatus::Running);
        assert_eq!(parse_bjobs_line("DONE,-"), JobStatus::Succeeded);
        assert_eq!(parse_bjobs_line("UNKWN,-"), JobStatus::Unknown);
        assert_eq!(parse_bjobs_line("ZOMBI,-"), JobStatus::Unknown);

        match parse_bjobs_line("EXIT,137") {
            JobStatus::Failed {
                exit_code, reason, ..
            } => {
                assert_eq!(exit_code, Some(137));
                assert_eq!(reason, FailureReason::NonZeroExit);
            }
            other => panic!("Expected Failed, got {:?}", other),
        }

        assert!(matches!(
            parse_bjobs_line("EXIT,-"),
            JobStatus::Failed { exit_code: None, .. }
        ));
    }

    #[test]
    fn test_submit_args() {
        let backend = LsfBackend::with_runner(
            Arc::new(ScriptedRunner::new()),
            LsfOptions {
                project: Some("motifs".to_string()),
            },
        );
        let mut spec = make_test_spec();
        spec.slots = 4;
        spec.stdout = Some(PathBuf::from("/data/motifs/dreme.out"));

        let args = backend.submit_args(&spec);
        assert_eq!(
            args,
            vec![
                "-J",
                "dreme_run_1",
                "-q",
                "hour",
                "-W",
                "1:00",
                "-n",
                "4",
                "-R",
                "rusage[mem=8G] span[hosts=1]",
                "-P",
                "motifs",
                "-cwd",
                "/data/motifs",
                "-o",
                "/data/motifs/dreme.out",
                "/opt/meme/bin/dreme",
                "-oc",
                "out",
                "-p",
                "pos.fa",
            ]
        );
    }

    #[tokio::test]
    async fn test_submit_returns_pending_handle() {
        let runner = Arc::new(ScriptedRunner::new().respond(
            "bsub",
            0,
            "Job <48213> is submitted to queue <hour>.\n",
            "",
        ));
        let spec = make_test_spec();
        let id = spec.id;

        let handle = backend(runner.clone()).submit(spec).await.unwrap();
        assert_eq!(handle.id, id);
        assert_eq!(handle.backend_id, "48213");
        assert_eq!(handle.scheduler, "LSF");
        assert_eq!(handle.status, JobStatus::Pending);
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_submit_rejected_carries_diagnostic() {
        let runner = Arc::new(ScriptedRunner::new().respond(
            "bsub",
            255,
            "",
            "hour: No such queue. Job not submitted.\n",
        ));

        let err = backend(runner).submit(make_test_spec()).await.unwrap_err();
        match err {
            Error::Submission { scheduler, message } => {
                assert_eq!(scheduler, "LSF");
                assert!(message.contains("No such queue"));
            }
            other => panic!("Expected Submission, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_submit_without_id_is_an_error() {
        let runner = Arc::new(ScriptedRunner::new().respond("bsub", 0, "something odd\n", ""));
        let err = backend(runner).submit(make_test_spec()).await.unwrap_err();
        assert!(matches!(err, Error::Submission { .. }));
    }

    #[tokio::test]
    async fn test_submit_then_poll_is_not_terminal() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .respond("bsub", 0, "Job <7> is submitted to queue <hour>.", "")
                .respond("bjobs", 0, "PEND,-\n", ""),
        );
        let backend = backend(runner.clone());

        let handle = backend.submit(make_test_spec()).await.unwrap();
        let status = backend.poll_status(&handle).await.unwrap();
        assert!(!status.is_terminal());

        let calls = runner.calls();
        assert_eq!(calls[1].0, "bjobs");
        assert_eq!(calls[1].1.last().map(String::as_str), Some("7"));
    }

    #[tokio::test]
    async fn test_poll_unknown_job_is_poll_error() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .respond("bsub", 0, "Job <7> is submitted to queue <hour>.", "")
                .respond("bjobs", 255, "", "Job <7> is not found\n")
                .unavailable("bjobs"),
        );
        let backend = backend(runner);
        let handle = backend.submit(make_test_spec()).await.unwrap();

        let err = backend.poll_status(&handle).await.unwrap_err();
        assert!(matches!(err, Error::Poll(ref m) if m.contains("not found")));

        let err = backend.poll_status(&handle).await.unwrap_err();
        assert!(matches!(err, Error::Poll(_)));
    }

    #[tokio::test]
    async fn test_invalid_spec_never_reaches_bsub() {
        let runner = Arc::new(ScriptedRunner::new());
        let mut spec = make_test_spec();
        spec.args.clear();

        let err = backend(runner.clone()).submit(spec).await.unwrap_err();
        assert!(matches!(err, Error::InvalidSpec(_)));
        assert!(runner.calls().is_empty());
    }
}
