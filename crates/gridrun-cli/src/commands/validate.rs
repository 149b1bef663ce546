//! Configuration validation.

use anyhow::Result;
use gridrun_config::load_system_config;
use std::path::Path;
use std::process::ExitCode;

pub fn run(path: &Path, json: bool) -> Result<ExitCode> {
    let config = match load_system_config(path) {
        Ok(config) => config,
        Err(e) => {
            println!("Configuration error: {}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(ExitCode::SUCCESS);
    }

    println!("Configuration is valid");
    match config.scheduler {
        Some(kind) => println!("  scheduler: {}", kind),
        None => println!("  scheduler: (from --scheduler)"),
    }
    println!(
        "  wait: every {}s, timeout {}, give up after {} unknown polls",
        config.wait.poll_interval.as_secs(),
        config
            .wait
            .timeout
            .map(|t| format!("{}s", t.as_secs()))
            .unwrap_or_else(|| "none".to_string()),
        config.wait.max_unknown_polls,
    );
    for name in config.resource_classes.names() {
        if let Some(class) = config.resource_classes.get(name) {
            println!(
                "  resource-class {}: queue={} minutes={} slots={}",
                class.name,
                class.queue,
                class.time_limit.as_secs() / 60,
                class.slots
            );
        }
    }

    Ok(ExitCode::SUCCESS)
}
