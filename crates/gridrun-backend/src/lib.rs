//! Cluster scheduler backends for gridrun.
//!
//! Provides backend implementations that drive the scheduler's own
//! command-line tools:
//! - LSF (`bsub` / `bjobs`)
//! - Open Grid Scheduler (`qsub` / `qstat` / `qacct`), behind a session

pub mod backend;
pub mod lsf;
pub mod ogs;
pub mod runner;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::Backend;
pub use gridrun_core::scheduler::{Scheduler, SchedulerKind};
pub use lsf::LsfBackend;
pub use ogs::{OgsBackend, OgsSession};
pub use runner::{CommandOutput, CommandRunner, ProcessRunner};
