//! Error types for gridrun.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown scheduler: {0} (expected one of: LSF, OGS)")]
    UnknownScheduler(String),

    #[error("unknown resource class: {0}")]
    UnknownResourceClass(String),

    #[error("invalid job spec: {0}")]
    InvalidSpec(String),

    #[error("{scheduler} rejected submission: {message}")]
    Submission { scheduler: String, message: String },

    #[error("status query failed: {0}")]
    Poll(String),

    #[error("session error: {0}")]
    Session(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
