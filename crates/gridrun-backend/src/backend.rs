//! The closed set of scheduler backends.

use async_trait::async_trait;
use gridrun_config::SystemConfig;
use gridrun_core::{JobHandle, JobSpec, JobStatus, Result, Scheduler, SchedulerKind};
use std::sync::Arc;
use tracing::info;

use crate::lsf::LsfBackend;
use crate::ogs::OgsBackend;
use crate::runner::{CommandRunner, ProcessRunner};

/// One backend per supported [`SchedulerKind`].
pub enum Backend {
    Lsf(LsfBackend),
    Ogs(OgsBackend),
}

impl Backend {
    /// Connect to the scheduler named by `kind` using its command-line tools.
    ///
    /// For session-based schedulers the session is opened here; failure to
    /// open it is returned as an error.
    pub async fn connect(kind: SchedulerKind, config: &SystemConfig) -> Result<Self> {
        Self::connect_with_runner(kind, config, Arc::new(ProcessRunner)).await
    }

    /// Connect using a custom command runner.
    pub async fn connect_with_runner(
        kind: SchedulerKind,
        config: &SystemConfig,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self> {
        info!(scheduler = %kind, "Connecting to scheduler");
        let backend = match kind {
            SchedulerKind::Lsf => Backend::Lsf(LsfBackend::with_runner(runner, config.lsf.clone())),
            SchedulerKind::Ogs => {
                Backend::Ogs(OgsBackend::connect_with_runner(runner, config.ogs.clone()).await?)
            }
        };
        Ok(backend)
    }

    pub fn kind(&self) -> SchedulerKind {
        match self {
            Backend::Lsf(_) => SchedulerKind::Lsf,
            Backend::Ogs(_) => SchedulerKind::Ogs,
        }
    }
}

#[async_trait]
impl Scheduler for Backend {
    fn name(&self) -> &'static str {
        match self {
            Backend::Lsf(b) => b.name(),
            Backend::Ogs(b) => b.name(),
        }
    }

    async fn submit(&self, spec: JobSpec) -> Result<JobHandle> {
        match self {
            Backend::Lsf(b) => b.submit(spec).await,
            Backend::Ogs(b) => b.submit(spec).await,
        }
    }

    async fn poll_status(&self, handle: &JobHandle) -> Result<JobStatus> {
        match self {
            Backend::Lsf(b) => b.poll_status(handle).await,
            Backend::Ogs(b) => b.poll_status(handle).await,
        }
    }

    async fn shutdown(&self) -> Result<()> {
        match self {
            Backend::Lsf(b) => b.shutdown().await,
            Backend::Ogs(b) => b.shutdown().await,
        }
    }
}

/// Turn a free-form label into a name every supported scheduler accepts.
pub(crate) fn job_name(label: &str) -> String {
    let name: String = label
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if name.is_empty() {
        "gridrun".to_string()
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRunner;

    #[test]
    fn test_job_name_sanitizes() {
        assert_eq!(job_name("dreme"), "dreme");
        assert_eq!(job_name("  fimo: run #2 "), "fimo__run__2");
        assert_eq!(job_name("a/b\\c"), "a_b_c");
        assert_eq!(job_name(""), "gridrun");
    }

    #[tokio::test]
    async fn test_connect_lsf_needs_no_session() {
        let runner = Arc::new(ScriptedRunner::new());
        let backend =
            Backend::connect_with_runner(SchedulerKind::Lsf, &SystemConfig::default(), runner.clone())
                .await
                .unwrap();

        assert_eq!(backend.kind(), SchedulerKind::Lsf);
        assert_eq!(backend.name(), "LSF");
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_connect_ogs_opens_session() {
        let runner = Arc::new(ScriptedRunner::new().respond("qstat", 0, "", ""));
        let backend =
            Backend::connect_with_runner(SchedulerKind::Ogs, &SystemConfig::default(), runner.clone())
                .await
                .unwrap();

        assert_eq!(backend.kind(), SchedulerKind::Ogs);
        assert_eq!(backend.name(), "OGS");
        assert_eq!(runner.calls().len(), 1);

        match &backend {
            Backend::Ogs(ogs) => assert!(ogs.session_open().await),
            Backend::Lsf(_) => panic!("Expected OGS backend"),
        }

        backend.shutdown().await.unwrap();
        match &backend {
            Backend::Ogs(ogs) => assert!(!ogs.session_open().await),
            Backend::Lsf(_) => panic!("Expected OGS backend"),
        }
    }

    #[tokio::test]
    async fn test_connect_ogs_fails_when_daemon_unreachable() {
        let runner = Arc::new(ScriptedRunner::new().respond(
            "qstat",
            1,
            "",
            "error: commlib error: can't connect to service\n",
        ));
        let result =
            Backend::connect_with_runner(SchedulerKind::Ogs, &SystemConfig::default(), runner).await;
        assert!(matches!(result, Err(gridrun_core::Error::Session(_))));
    }
}
