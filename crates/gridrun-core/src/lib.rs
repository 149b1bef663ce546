//! Core types and traits for gridrun.
//!
//! This crate contains:
//! - Job identifiers
//! - The job model (specs, handles, statuses)
//! - Scheduler kinds and the `Scheduler` trait implemented by cluster backends

pub mod error;
pub mod id;
pub mod job;
pub mod scheduler;

pub use error::{Error, Result};
pub use id::JobId;
pub use job::{FailureReason, JobHandle, JobSpec, JobSpecBuilder, JobStatus};
pub use scheduler::{Scheduler, SchedulerKind};
