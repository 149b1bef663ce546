//! KDL configuration parsing for gridrun.
//!
//! This crate handles:
//! - Scheduler selection
//! - Resource classes (queue, time limit, slots)
//! - Wait/polling settings
//! - Backend-specific options

pub mod error;
pub mod resources;
pub mod system;

pub use error::{ConfigError, ConfigResult};
pub use resources::{ResourceClass, ResourceClasses};
pub use system::{
    LsfOptions, OgsOptions, SystemConfig, WaitConfig, load_system_config, parse_system_config,
};
