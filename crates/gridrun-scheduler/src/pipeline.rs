//! Motif pipeline - motif discovery followed by motif scanning.
//!
//! Each stage submits one job and waits for it before the next stage starts.
//! Scanning is skipped when discovery ran and failed.

use gridrun_core::Result;
use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::submitter::{JobSubmitter, ToolInvocation};
use crate::tools::{DremeJob, FimoJob};
use crate::waiter::{JobWaiter, WaitReport};

pub const DREME_STAGE: &str = "dreme";
pub const FIMO_STAGE: &str = "fimo";

/// Final state of a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StageState {
    Succeeded,
    Failed { message: String },
    Skipped { reason: String },
}

impl StageState {
    pub fn is_success(&self) -> bool {
        matches!(self, StageState::Succeeded)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, StageState::Failed { .. })
    }
}

/// Event emitted during pipeline execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    StageStarted { stage: String },
    JobSubmitted { stage: String, backend_id: String },
    StageCompleted { stage: String, success: bool },
    PipelineCompleted { success: bool },
}

#[derive(Debug, Clone, Serialize)]
pub struct StageResult {
    pub name: String,
    pub state: StageState,
    /// Wait report for the stage's job. Absent for skipped stages.
    pub report: Option<WaitReport>,
}

/// Result of a pipeline execution.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub success: bool,
    pub stages: Vec<StageResult>,
}

impl PipelineResult {
    pub fn stage(&self, name: &str) -> Option<&StageResult> {
        self.stages.iter().find(|s| s.name == name)
    }
}

/// Runs the DREME and FIMO stages through a submitter and waiter.
pub struct MotifPipeline {
    submitter: JobSubmitter,
    waiter: JobWaiter,
    resource_class: String,
    /// Directory jobs run in and write their scheduler logs to.
    working_dir: Option<PathBuf>,
    events: Option<mpsc::Sender<PipelineEvent>>,
}

impl MotifPipeline {
    pub fn new(submitter: JobSubmitter, waiter: JobWaiter) -> Self {
        Self {
            submitter,
            waiter,
            resource_class: "hour".to_string(),
            working_dir: None,
            events: None,
        }
    }

    pub fn with_resource_class(mut self, resource_class: impl Into<String>) -> Self {
        self.resource_class = resource_class.into();
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_events(mut self, tx: mpsc::Sender<PipelineEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Run whichever stages are given.
    ///
    /// A stage whose job fails is reported in the result. A stage whose job
    /// cannot be submitted ends the run with that error.
    pub async fn run(
        &self,
        dreme: Option<&DremeJob>,
        fimo: Option<&FimoJob>,
    ) -> Result<PipelineResult> {
        let mut stages = Vec::new();

        if let Some(job) = dreme {
            stages.push(self.run_stage(DREME_STAGE, job.invocation()).await?);
        }

        if let Some(job) = fimo {
            let discovery_failed = stages
                .iter()
                .any(|s| s.name == DREME_STAGE && !s.state.is_success());

            if discovery_failed {
                info!(stage = FIMO_STAGE, "Skipping stage because motif discovery failed");
                stages.push(StageResult {
                    name: FIMO_STAGE.to_string(),
                    state: StageState::Skipped {
                        reason: format!("stage '{}' failed", DREME_STAGE),
                    },
                    report: None,
                });
            } else {
                stages.push(self.run_stage(FIMO_STAGE, job.invocation()).await?);
            }
        }

        let success = !stages.iter().any(|s| s.state.is_failed());
        self.emit(PipelineEvent::PipelineCompleted { success }).await;

        Ok(PipelineResult { success, stages })
    }

    /// Submit one job for a stage and wait for it.
    async fn run_stage(&self, stage: &str, invocation: ToolInvocation) -> Result<StageResult> {
        self.emit(PipelineEvent::StageStarted {
            stage: stage.to_string(),
        })
        .await;

        let invocation = match &self.working_dir {
            Some(dir) => invocation.with_working_dir(dir.clone()).with_logs_in(dir.clone()),
            None => invocation,
        };

        let handle = match self.submitter.submit(&invocation, &self.resource_class).await {
            Ok(handle) => handle,
            Err(e) => {
                error!(stage, error = %e, "Stage submission failed");
                self.emit(PipelineEvent::StageCompleted {
                    stage: stage.to_string(),
                    success: false,
                })
                .await;
                return Err(e);
            }
        };

        self.emit(PipelineEvent::JobSubmitted {
            stage: stage.to_string(),
            backend_id: handle.backend_id.clone(),
        })
        .await;

        let mut handles = vec![handle];
        let report = self.waiter.wait_for_all(&mut handles).await;

        let state = if report.is_success() {
            info!(stage, "Stage completed successfully");
            StageState::Succeeded
        } else {
            let message = report
                .failures()
                .filter_map(|o| o.diagnostic.clone())
                .collect::<Vec<_>>()
                .join("; ");
            error!(stage, error = %message, "Stage failed");
            StageState::Failed { message }
        };

        self.emit(PipelineEvent::StageCompleted {
            stage: stage.to_string(),
            success: state.is_success(),
        })
        .await;

        Ok(StageResult {
            name: stage.to_string(),
            state,
            report: Some(report),
        })
    }

    async fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }
}
