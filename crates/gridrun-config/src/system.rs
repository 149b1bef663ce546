//! System configuration parsing.

use crate::resources::{ResourceClass, ResourceClasses};
use crate::{ConfigError, ConfigResult};
use gridrun_core::SchedulerKind;
use kdl::{KdlDocument, KdlNode};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// System-wide configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Scheduler to submit to. May be left out and given on the command line.
    pub scheduler: Option<SchedulerKind>,
    /// Polling behaviour while waiting for jobs.
    pub wait: WaitConfig,
    /// Built-in classes, overridden by any configured ones.
    pub resource_classes: ResourceClasses,
    pub lsf: LsfOptions,
    pub ogs: OgsOptions,
}

/// Settings for the job waiter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitConfig {
    /// Time between polling rounds.
    pub poll_interval: Duration,
    /// Overall deadline for one wait. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Consecutive unanswered polls before a job is treated as failed.
    pub max_unknown_polls: u32,
    /// Status queries allowed in flight at once.
    pub max_concurrent_polls: usize,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            timeout: None,
            max_unknown_polls: 10,
            max_concurrent_polls: 8,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LsfOptions {
    /// Project name passed with `-P`.
    pub project: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OgsOptions {
    /// Parallel environment used for multi-slot jobs.
    pub parallel_environment: String,
    /// Project name passed with `-P`.
    pub project: Option<String>,
    /// Grid Engine cell. Falls back to `SGE_CELL`, then `default`.
    pub cell: Option<String>,
}

impl Default for OgsOptions {
    fn default() -> Self {
        Self {
            parallel_environment: "smp".to_string(),
            project: None,
            cell: None,
        }
    }
}

/// Read and parse a system configuration file.
pub fn load_system_config(path: impl AsRef<Path>) -> ConfigResult<SystemConfig> {
    let content = std::fs::read_to_string(path.as_ref())?;
    parse_system_config(&content)
}

/// Parse system configuration from KDL text.
pub fn parse_system_config(kdl: &str) -> ConfigResult<SystemConfig> {
    let doc: KdlDocument = kdl.parse()?;

    let mut config = SystemConfig::default();
    let mut seen_classes = HashSet::new();

    for node in doc.nodes() {
        match node.name().value() {
            "scheduler" => {
                let name = get_first_string_arg(node)
                    .ok_or_else(|| ConfigError::MissingField("scheduler name".to_string()))?;
                let kind = SchedulerKind::resolve(&name).map_err(|e| ConfigError::InvalidValue {
                    field: "scheduler".to_string(),
                    message: e.to_string(),
                })?;
                config.scheduler = Some(kind);
            }
            "wait" => {
                config.wait = parse_wait(node)?;
            }
            "resource-class" => {
                let class = parse_resource_class(node)?;
                if !seen_classes.insert(class.name.clone()) {
                    return Err(ConfigError::Duplicate(format!(
                        "resource-class '{}'",
                        class.name
                    )));
                }
                config.resource_classes.insert(class);
            }
            "lsf" => {
                config.lsf = LsfOptions {
                    project: get_string_prop(node, "project"),
                };
            }
            "ogs" => {
                let defaults = OgsOptions::default();
                config.ogs = OgsOptions {
                    parallel_environment: get_string_prop(node, "parallel-environment")
                        .unwrap_or(defaults.parallel_environment),
                    project: get_string_prop(node, "project"),
                    cell: get_string_prop(node, "cell"),
                };
            }
            other => {
                debug!(node = %other, "Ignoring unknown configuration node");
            }
        }
    }

    Ok(config)
}

fn parse_wait(node: &KdlNode) -> ConfigResult<WaitConfig> {
    let mut wait = WaitConfig::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            let field = child.name().value();
            match field {
                "poll-interval-secs" => {
                    wait.poll_interval = Duration::from_secs(positive_arg(child, field)?);
                }
                "timeout-secs" => {
                    wait.timeout = Some(Duration::from_secs(positive_arg(child, field)?));
                }
                "max-unknown-polls" => {
                    wait.max_unknown_polls = to_u32(positive_arg(child, field)?, field)?;
                }
                "max-concurrent-polls" => {
                    wait.max_concurrent_polls = positive_arg(child, field)? as usize;
                }
                other => {
                    return Err(ConfigError::InvalidValue {
                        field: "wait".to_string(),
                        message: format!("unknown setting '{}'", other),
                    });
                }
            }
        }
    }

    Ok(wait)
}

fn parse_resource_class(node: &KdlNode) -> ConfigResult<ResourceClass> {
    let name = get_first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField("resource-class name".to_string()))?;

    let queue = get_string_prop(node, "queue")
        .ok_or_else(|| ConfigError::MissingField(format!("queue for resource-class '{}'", name)))?;

    let minutes = get_int_prop(node, "minutes").ok_or_else(|| {
        ConfigError::MissingField(format!("minutes for resource-class '{}'", name))
    })?;
    let seconds = require_positive(minutes, "minutes")?
        .checked_mul(60)
        .ok_or_else(|| ConfigError::InvalidValue {
            field: "minutes".to_string(),
            message: format!("{} minutes is too long", minutes),
        })?;

    let slots = match get_int_prop(node, "slots") {
        Some(slots) => to_u32(require_positive(slots, "slots")?, "slots")?,
        None => 1,
    };

    Ok(ResourceClass::new(
        name,
        queue,
        Duration::from_secs(seconds),
        slots,
    ))
}

fn positive_arg(node: &KdlNode, field: &str) -> ConfigResult<u64> {
    let value = get_first_int_arg(node).ok_or_else(|| ConfigError::InvalidValue {
        field: field.to_string(),
        message: "expected an integer".to_string(),
    })?;
    require_positive(value, field)
}

fn require_positive(value: i128, field: &str) -> ConfigResult<u64> {
    if value <= 0 || value > u64::MAX as i128 {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            message: format!("expected a positive integer, got {}", value),
        });
    }
    Ok(value as u64)
}

fn to_u32(value: u64, field: &str) -> ConfigResult<u32> {
    u32::try_from(value).map_err(|_| ConfigError::InvalidValue {
        field: field.to_string(),
        message: format!("{} is too large", value),
    })
}

// Helper functions for extracting values from KDL nodes

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_first_int_arg(node: &KdlNode) -> Option<i128> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_integer())
}

fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

fn get_int_prop(node: &KdlNode, name: &str) -> Option<i128> {
    node.get(name).and_then(|v| v.as_integer())
}
