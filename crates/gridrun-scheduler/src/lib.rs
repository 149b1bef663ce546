//! Job submission and waiting for gridrun.
//!
//! Tool invocations go through a [`JobSubmitter`], which applies a resource
//! class and hands one job to a scheduler backend. A [`JobWaiter`] then polls
//! the submitted jobs until all of them are terminal. [`MotifPipeline`] chains
//! the two for the DREME and FIMO stages.

pub mod pipeline;
pub mod submitter;
pub mod tools;
pub mod waiter;

#[cfg(test)]
pub(crate) mod testing;

pub use pipeline::{MotifPipeline, PipelineEvent, PipelineResult, StageResult, StageState};
pub use submitter::{JobSubmitter, ToolInvocation};
pub use tools::{DremeJob, FimoJob};
pub use waiter::{JobOutcome, JobWaiter, WaitReport};
