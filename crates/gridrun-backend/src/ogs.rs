//! Open Grid Scheduler backend.
//!
//! Every submission and status query goes through an [`OgsSession`], opened
//! once when the backend connects and closed exactly once: by
//! [`Scheduler::shutdown`] or, failing that, when the backend is dropped.
//! Submissions hold the session lock for the duration of the `qsub` call.

use async_trait::async_trait;
use gridrun_config::OgsOptions;
use gridrun_core::{Error, JobHandle, JobSpec, JobStatus, Result, Scheduler};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::backend::job_name;
use crate::runner::{CommandRunner, ProcessRunner};

/// A session with the Grid Engine qmaster.
#[derive(Debug)]
pub struct OgsSession {
    contact: String,
    open: bool,
    submitted: usize,
}

impl OgsSession {
    /// Open a session, checking that the qmaster answers.
    ///
    /// The contact is the Grid Engine cell: `cell` if given, else `SGE_CELL`,
    /// else `default`.
    pub async fn open(runner: &dyn CommandRunner, cell: Option<String>) -> Result<Self> {
        let contact = cell
            .or_else(|| std::env::var("SGE_CELL").ok())
            .unwrap_or_else(|| "default".to_string());

        let output = runner
            .run("qstat", &[])
            .await
            .map_err(|e| Error::Session(format!("failed to run qstat: {}", e)))?;
        if !output.success() {
            return Err(Error::Session(format!(
                "qmaster for cell '{}' is not reachable: {}",
                contact,
                output.diagnostic()
            )));
        }

        info!(contact = %contact, "Opened OGS session");
        Ok(Self {
            contact,
            open: true,
            submitted: 0,
        })
    }

    pub fn contact(&self) -> &str {
        &self.contact
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Jobs submitted through this session so far.
    pub fn submitted(&self) -> usize {
        self.submitted
    }

    /// Close the session. Closing an already closed session does nothing.
    pub fn close(&mut self) {
        if self.open {
            self.open = false;
            info!(contact = %self.contact, submitted = self.submitted, "Closed OGS session");
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(Error::Session(format!(
                "session with cell '{}' is closed",
                self.contact
            )))
        }
    }
}

impl Drop for OgsSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Backend for Open Grid Scheduler / Grid Engine.
pub struct OgsBackend {
    runner: Arc<dyn CommandRunner>,
    options: OgsOptions,
    session: Mutex<OgsSession>,
}

impl OgsBackend {
    /// Open a session using the Grid Engine tools found on `PATH`.
    pub async fn connect(options: OgsOptions) -> Result<Self> {
        Self::connect_with_runner(Arc::new(ProcessRunner), options).await
    }

    /// Open a session using a custom command runner.
    pub async fn connect_with_runner(
        runner: Arc<dyn CommandRunner>,
        options: OgsOptions,
    ) -> Result<Self> {
        let session = OgsSession::open(runner.as_ref(), options.cell.clone()).await?;
        Ok(Self {
            runner,
            options,
            session: Mutex::new(session),
        })
    }

    pub async fn session_open(&self) -> bool {
        self.session.lock().await.is_open()
    }

    fn submit_args(&self, spec: &JobSpec) -> Vec<String> {
        let mut name = job_name(&spec.label);
        // Grid Engine rejects job names that start with a digit.
        if name.starts_with(|c: char| c.is_ascii_digit()) {
            name.insert(0, 'j');
        }

        let mut args = vec![
            "-terse".to_string(),
            "-b".to_string(),
            "y".to_string(),
            "-N".to_string(),
            name,
            "-q".to_string(),
            spec.queue.clone(),
            "-l".to_string(),
            format!("h_rt={}", format_hard_runtime(spec.time_limit)),
        ];

        if spec.slots > 1 {
            args.push("-pe".to_string());
            args.push(self.options.parallel_environment.clone());
            args.push(spec.slots.to_string());
        }
        if let Some(memory_gb) = spec.memory_gb {
            args.push("-l".to_string());
            args.push(format!("h_vmem={}G", memory_gb));
        }
        if let Some(ref project) = self.options.project {
            args.push("-P".to_string());
            args.push(project.clone());
        }

        args.push("-wd".to_string());
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

    /// Look the job up in accounting once it has left the queue.
    async fn accounting_status(&self, backend_id: &str) -> Result<JobStatus> {
        let output = self
            .runner
            .run("qacct", &["-j".to_string(), backend_id.to_string()])
            .await
            .map_err(|e| Error::Poll(format!("failed to run qacct: {}", e)))?;

        if !output.success() {
            return Err(Error::Poll(format!(
                "job {} is not queued and has no accounting record: {}",
                backend_id,
                output.diagnostic()
            )));
        }

        parse_qacct(&output.stdout).ok_or_else(|| {
            Error::Poll(format!(
                "accounting record for job {} has no exit status",
                backend_id
            ))
        })
    }
}

#[async_trait]
impl Scheduler for OgsBackend {
    fn name(&self) -> &'static str {
        "OGS"
    }

    async fn submit(&self, spec: JobSpec) -> Result<JobHandle> {
        spec.validate()?;
        let args = self.submit_args(&spec);

        let mut session = self.session.lock().await;
        session.ensure_open()?;

        info!(job_id = %spec.id, label = %spec.label, queue = %spec.queue, "Submitting job to OGS");
        let output = self
            .runner
            .run("qsub", &args)
            .await
            .map_err(|e| submission_error(format!("failed to run qsub: {}", e)))?;

        if !output.success() {
            return Err(submission_error(output.diagnostic()));
        }

        let backend_id = parse_terse_id(&output.stdout).ok_or_else(|| {
            submission_error(format!(
                "could not find job id in qsub output: {}",
                output.stdout.trim()
            ))
        })?;
        session.submitted += 1;

        info!(job_id = %spec.id, backend_id = %backend_id, "OGS accepted job");
        Ok(JobHandle::submitted(&spec, backend_id, self.name()))
    }

    async fn poll_status(&self, handle: &JobHandle) -> Result<JobStatus> {
        self.session.lock().await.ensure_open()?;

        let output = self
            .runner
            .run("qstat", &[])
            .await
            .map_err(|e| Error::Poll(format!("failed to run qstat: {}", e)))?;
        if !output.success() {
            warn!(backend_id = %handle.backend_id, error = %output.diagnostic(), "qstat query failed");
            return Err(Error::Poll(output.diagnostic()));
        }

        let status = match find_queue_state(&output.stdout, &handle.backend_id) {
            Some(state) => status_from_queue_state(&state),
            None => self.accounting_status(&handle.backend_id).await?,
        };

        debug!(backend_id = %handle.backend_id, status = %status, "Polled OGS job");
        Ok(status)
    }

    async fn shutdown(&self) -> Result<()> {
        self.session.lock().await.close();
        Ok(())
    }
}

fn submission_error(message: String) -> Error {
    Error::Submission {
        scheduler: "OGS".to_string(),
        message,
    }
}

/// Format a wall-clock limit as `HH:MM:SS` for `h_rt`.
fn format_hard_runtime(limit: Duration) -> String {
    let secs = limit.as_secs().max(1);
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// `qsub -terse` prints the job id, or `id.first-last:step` for array jobs.
fn parse_terse_id(stdout: &str) -> Option<String> {
    let first = stdout.lines().map(str::trim).find(|l| !l.is_empty())?;
    let id = first.split('.').next()?;
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
        Some(id.to_string())
    } else {
        None
    }
}

/// Find the state column of `backend_id` in `qstat` output.
fn find_queue_state(stdout: &str, backend_id: &str) -> Option<String> {
    stdout.lines().find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            [id, _prior, _name, _user, state, ..] if *id == backend_id => Some(state.to_string()),
            _ => None,
        }
    })
}

fn status_from_queue_state(state: &str) -> JobStatus {
    if state.contains('E') {
        JobStatus::exited(None, format!("job is in error state ({})", state))
    } else if state.contains(['r', 't', 'R', 'd', 's', 'S', 'T']) {
        JobStatus::Running
    } else {
        JobStatus::Pending
    }
}

/// Read the final status out of a `qacct -j` record. When the job was run
/// more than once, the last record wins.
fn parse_qacct(stdout: &str) -> Option<JobStatus> {
    let mut exit_status = None;
    let mut failed = String::from("0");

    for line in stdout.lines() {
        let line = line.trim();
        let Some((key, value)) = line.split_once(char::is_whitespace) else {
            continue;
        };
        match key {
            // Some Grid Engine releases annotate the code, as in `137 (Killed)`.
            "exit_status" => {
                exit_status = value
                    .split_whitespace()
                    .next()
                    .and_then(|code| code.parse::<i32>().ok())
            }
            "failed" => failed = value.trim().to_string(),
            _ => {}
        }
    }

    let exit_status = exit_status?;
    let failed_code = failed
        .split_whitespace()
        .next()
        .and_then(|c| c.parse::<i32>().ok())
        .unwrap_or(0);

    Some(if failed_code == 0 && exit_status == 0 {
        JobStatus::Succeeded
    } else if failed_code != 0 {
        JobStatus::exited(Some(exit_status), failed)
    } else {
        JobStatus::exited(Some(exit_status), "")
    })
}
