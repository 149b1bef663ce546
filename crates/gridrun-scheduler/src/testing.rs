//! In-memory scheduler for submitter, waiter and pipeline tests.

use async_trait::async_trait;
use gridrun_core::{Error, JobHandle, JobSpec, JobStatus, Result, Scheduler};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

type Answer = std::result::Result<JobStatus, String>;

/// Answers status queries from per-label scripts. The last answer in a
/// script repeats forever; labels without a script answer `Unknown`.
#[derive(Default)]
pub(crate) struct StubScheduler {
    scripts: Mutex<HashMap<String, VecDeque<Answer>>>,
    rejections: Mutex<HashMap<String, String>>,
    submitted: Mutex<Vec<JobSpec>>,
    next_id: AtomicU32,
    polls: AtomicU32,
}

impl StubScheduler {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn script(self, label: &str, answers: Vec<JobStatus>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(label.to_string(), answers.into_iter().map(Ok).collect());
        self
    }

    /// Every poll for `label` fails.
    pub(crate) fn unreachable(self, label: &str) -> Self {
        self.scripts.lock().unwrap().insert(
            label.to_string(),
            VecDeque::from([Err("cluster daemon unreachable".to_string())]),
        );
        self
    }

    pub(crate) fn reject(self, label: &str, message: &str) -> Self {
        self.rejections
            .lock()
            .unwrap()
            .insert(label.to_string(), message.to_string());
        self
    }

    pub(crate) fn polls(&self) -> u32 {
        self.polls.load(Ordering::SeqCst)
    }

    pub(crate) fn submitted(&self) -> Vec<JobSpec> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl Scheduler for StubScheduler {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn submit(&self, spec: JobSpec) -> Result<JobHandle> {
        spec.validate()?;
        if let Some(message) = self.rejections.lock().unwrap().get(&spec.label) {
            return Err(Error::Submission {
                scheduler: self.name().to_string(),
                message: message.clone(),
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = JobHandle::submitted(&spec, id.to_string(), self.name());
        self.submitted.lock().unwrap().push(spec);
        Ok(handle)
    }

    async fn poll_status(&self, handle: &JobHandle) -> Result<JobStatus> {
        self.polls.fetch_add(1, Ordering::SeqCst);

        let mut scripts = self.scripts.lock().unwrap();
        let answer = match scripts.get_mut(&handle.label) {
            Some(script) if script.len() > 1 => script.pop_front(),
            Some(script) => script.front().cloned(),
            None => Some(Ok(JobStatus::Unknown)),
        };

        match answer {
            Some(Ok(status)) => Ok(status),
            Some(Err(message)) => Err(Error::Poll(message)),
            None => Ok(JobStatus::Unknown),
        }
    }
}
