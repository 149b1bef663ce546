//! CLI command implementations.

pub mod motif;
pub mod submit;
pub mod validate;

use anyhow::{Context, Result};
use gridrun_backend::Backend;
use gridrun_config::{SystemConfig, load_system_config};
use gridrun_core::{Scheduler, SchedulerKind};
use gridrun_scheduler::{JobSubmitter, JobWaiter};
use std::future::Future;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_CONFIG: &str = "gridrun.kdl";

/// Exit status after Ctrl-C.
const INTERRUPTED: u8 = 130;

/// Load the configuration named on the command line, else `./gridrun.kdl`
/// if it exists, else the defaults.
pub fn load_config(path: Option<&Path>) -> Result<SystemConfig> {
    let path = match path {
        Some(path) => path,
        None if Path::new(DEFAULT_CONFIG).exists() => Path::new(DEFAULT_CONFIG),
        None => {
            debug!("No configuration file, using defaults");
            return Ok(SystemConfig::default());
        }
    };

    load_system_config(path)
        .with_context(|| format!("Failed to load config file: {}", path.display()))
}

/// A connected scheduler backend plus the configuration it was built from.
pub struct Cluster {
    pub config: SystemConfig,
    backend: Arc<Backend>,
}

impl Cluster {
    /// Pick the scheduler (command line first, then configuration) and connect.
    pub async fn connect(
        config_path: Option<&Path>,
        scheduler: Option<SchedulerKind>,
    ) -> Result<Self> {
        let config = load_config(config_path)?;
        let kind = scheduler.or(config.scheduler).context(
            "No scheduler selected; pass --scheduler LSF|OGS or set `scheduler` in the config file",
        )?;

        let backend = Backend::connect(kind, &config)
            .await
            .with_context(|| format!("Failed to connect to {}", kind))?;

        Ok(Self {
            config,
            backend: Arc::new(backend),
        })
    }

    pub fn scheduler(&self) -> Arc<dyn Scheduler> {
        self.backend.clone()
    }

    pub fn submitter(&self) -> JobSubmitter {
        JobSubmitter::new(self.scheduler(), self.config.resource_classes.clone())
    }

    pub fn waiter(&self) -> JobWaiter {
        JobWaiter::new(self.scheduler(), self.config.wait.clone())
    }

    /// Drive `work` to completion unless Ctrl-C arrives first. The backend is
    /// shut down either way. Submitted jobs are left running on interrupt.
    ///
    /// `work` resolves to whether every job succeeded.
    pub async fn run_interruptible<F>(&self, work: F) -> Result<ExitCode>
    where
        F: Future<Output = Result<bool>>,
    {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Cannot listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        };
        let status = self.run_until(work, ctrl_c).await?;
        Ok(ExitCode::from(status))
    }

    /// Race `work` against `interrupt`, shut the backend down, and return the
    /// process exit status.
    async fn run_until<F, I>(&self, work: F, interrupt: I) -> Result<u8>
    where
        F: Future<Output = Result<bool>>,
        I: Future<Output = ()>,
    {
        let outcome = tokio::select! {
            result = work => Some(result),
            _ = interrupt => None,
        };

        if let Err(e) = self.backend.shutdown().await {
            warn!(error = %e, "Failed to shut down scheduler backend");
        }

        exit_status(outcome)
    }
}

/// 0 when every job succeeded, 1 when any failed, 130 when interrupted.
fn exit_status(outcome: Option<Result<bool>>) -> Result<u8> {
    match outcome {
        Some(Ok(true)) => Ok(0),
        Some(Ok(false)) => Ok(1),
        Some(Err(e)) => Err(e),
        None => {
            warn!("Interrupted; submitted jobs keep running on the cluster");
            Ok(INTERRUPTED)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gridrun_backend::{CommandOutput, CommandRunner, LsfBackend};

    /// Answers every command successfully with no output.
    struct QuietCluster;

    #[async_trait]
    impl CommandRunner for QuietCluster {
        async fn run(&self, _program: &str, _args: &[String]) -> std::io::Result<CommandOutput> {
            Ok(CommandOutput {
                code: Some(0),
                stdout: String::new(),
                stderr: String::new(),
            })
        }
    }

    fn lsf_cluster() -> Cluster {
        Cluster {
            config: SystemConfig::default(),
            backend: Arc::new(Backend::Lsf(LsfBackend::new(Default::default()))),
        }
    }

    async fn ogs_cluster() -> Cluster {
        let config = SystemConfig::default();
        let backend =
            Backend::connect_with_runner(SchedulerKind::Ogs, &config, Arc::new(QuietCluster))
                .await
                .unwrap();
        Cluster {
            config,
            backend: Arc::new(backend),
        }
    }

    async fn ogs_session_open(cluster: &Cluster) -> bool {
        match cluster.backend.as_ref() {
            Backend::Ogs(ogs) => ogs.session_open().await,
            Backend::Lsf(_) => panic!("Expected an OGS backend"),
        }
    }

    #[test]
    fn test_exit_status_mapping() {
        assert_eq!(exit_status(Some(Ok(true))).unwrap(), 0);
        assert_eq!(exit_status(Some(Ok(false))).unwrap(), 1);
        assert_eq!(exit_status(None).unwrap(), 130);
        assert!(exit_status(Some(Err(anyhow::anyhow!("submission failed")))).is_err());
    }

    #[tokio::test]
    async fn test_finished_work_sets_exit_status() {
        let cluster = lsf_cluster();
        let never = std::future::pending::<()>;

        assert_eq!(cluster.run_until(async { Ok(true) }, never()).await.unwrap(), 0);
        assert_eq!(cluster.run_until(async { Ok(false) }, never()).await.unwrap(), 1);
        let err = cluster
            .run_until(async { Err(anyhow::anyhow!("Submission failed")) }, never())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Submission failed");
    }

    #[tokio::test]
    async fn test_interrupt_closes_session() {
        let cluster = ogs_cluster().await;
        assert!(ogs_session_open(&cluster).await);

        let status = cluster
            .run_until(std::future::pending::<Result<bool>>(), async {})
            .await
            .unwrap();

        assert_eq!(status, 130);
        assert!(!ogs_session_open(&cluster).await);
    }

    #[tokio::test]
    async fn test_completed_work_closes_session() {
        let cluster = ogs_cluster().await;
        let status = cluster.run_until(async { Ok(true) }, std::future::pending()).await.unwrap();

        assert_eq!(status, 0);
        assert!(!ogs_session_open(&cluster).await);
    }
}
