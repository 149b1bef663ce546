//! Submitting a single command.

use anyhow::{Context, Result};
use clap::Args;
use gridrun_scheduler::{ToolInvocation, WaitReport};
use std::path::PathBuf;

use super::Cluster;

#[derive(Args)]
pub struct SubmitArgs {
    /// Resource class to submit in
    #[arg(long)]
    class: String,

    /// Job name (defaults to the executable's file name)
    #[arg(long)]
    label: Option<String>,

    /// Memory request in gigabytes
    #[arg(long)]
    memory_gb: Option<u32>,

    /// Directory the job runs in
    #[arg(long, default_value = ".")]
    workdir: PathBuf,

    /// Write the job's stdout and stderr into this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Executable followed by its arguments
    #[arg(last = true, required = true, num_args = 1..)]
    command: Vec<String>,
}

pub async fn run(cluster: &Cluster, args: SubmitArgs, json: bool) -> Result<bool> {
    let (executable, rest) = args
        .command
        .split_first()
        .context("No command given after `--`")?;

    let workdir = std::path::absolute(&args.workdir)
        .with_context(|| format!("Failed to resolve path: {}", args.workdir.display()))?;

    let mut invocation = ToolInvocation::new(executable.clone())
        .args(rest.iter().cloned())
        .with_working_dir(workdir);
    if let Some(label) = args.label {
        invocation = invocation.with_label(label);
    }
    if let Some(memory_gb) = args.memory_gb {
        invocation = invocation.with_memory_gb(memory_gb);
    }
    if let Some(log_dir) = args.log_dir {
        invocation = invocation.with_logs_in(log_dir);
    }

    let handle = cluster
        .submitter()
        .submit(&invocation, &args.class)
        .await
        .context("Submission failed")?;

    if !json {
        println!("Submitted job {} ({})", handle.backend_id, handle.label);
    }

    let mut handles = [handle];
    let report = cluster.waiter().wait_for_all(&mut handles).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(report.is_success())
}

fn print_report(report: &WaitReport) {
    for outcome in &report.outcomes {
        match outcome.diagnostic {
            Some(ref diagnostic) if outcome.is_failed() => {
                println!("✗ {} ({}): {}", outcome.label, outcome.backend_id, diagnostic);
            }
            _ => println!("✓ {} ({}): {}", outcome.label, outcome.backend_id, outcome.status),
        }
    }
}
