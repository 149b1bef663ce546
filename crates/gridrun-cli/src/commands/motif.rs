//! Motif discovery and scanning on the cluster.

use anyhow::{Context, Result, bail};
use clap::Args;
use gridrun_scheduler::{
    DremeJob, FimoJob, MotifPipeline, PipelineEvent, PipelineResult, StageState,
};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

use super::Cluster;

#[derive(Args)]
pub struct MotifArgs {
    /// Short description of the sequences, used in job names and reports
    #[arg(long)]
    description: String,

    /// DREME executable; enables motif discovery
    #[arg(long, requires = "positives")]
    dreme: Option<String>,

    /// Sequences expected to contain the motifs
    #[arg(long)]
    positives: Option<PathBuf>,

    /// Background sequences for DREME
    #[arg(long)]
    negatives: Option<PathBuf>,

    /// FIMO executable; enables motif scanning
    #[arg(long, requires = "sequences")]
    fimo: Option<String>,

    /// Sequences FIMO scans
    #[arg(long)]
    sequences: Option<PathBuf>,

    /// Motif file to scan for (defaults to the DREME output)
    #[arg(long)]
    motifs: Option<PathBuf>,

    /// Expected proportion of sequences containing a motif
    #[arg(long, default_value_t = 1.0)]
    alpha: f64,

    /// Q-value threshold for reported matches
    #[arg(long, default_value_t = 0.05)]
    qval: f64,

    /// Directory jobs run in; DREME and FIMO write to subdirectories
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Resource class for both stages
    #[arg(long, default_value = "hour")]
    class: String,
}

/// Build the requested stages, run them and print the outcome.
pub async fn run(cluster: &Cluster, args: MotifArgs, json: bool) -> Result<bool> {
    // Jobs run inside the output directory, so every path handed to them
    // must be absolute.
    let output_dir = absolute(&args.output_dir)?;
    tokio::fs::create_dir_all(&output_dir)
        .await
        .with_context(|| format!("Failed to create output directory: {}", output_dir.display()))?;

    let dreme = match (&args.dreme, &args.positives) {
        (Some(exe), Some(positives)) => {
            let mut job = DremeJob::new(
                exe.clone(),
                absolute(positives)?,
                output_dir.join("dreme"),
                args.description.clone(),
            );
            if let Some(ref negatives) = args.negatives {
                job = job.with_negatives(absolute(negatives)?);
            }
            Some(job)
        }
        _ => None,
    };

    let fimo = match (&args.fimo, &args.sequences) {
        (Some(exe), Some(sequences)) => {
            let motifs = match (&args.motifs, &dreme) {
                (Some(motifs), _) => absolute(motifs)?,
                (None, Some(dreme)) => dreme.motif_file(),
                (None, None) => bail!("--motifs is required when FIMO runs without DREME"),
            };
            Some(
                FimoJob::new(
                    exe.clone(),
                    motifs,
                    absolute(sequences)?,
                    output_dir.join("fimo"),
                    args.description.clone(),
                )
                .with_alpha(args.alpha)
                .with_qv_thresh(args.qval),
            )
        }
        _ => None,
    };

    if dreme.is_none() && fimo.is_none() {
        bail!("Nothing to run; pass --dreme and/or --fimo");
    }

    let (tx, rx) = mpsc::channel(32);
    let pipeline = MotifPipeline::new(cluster.submitter(), cluster.waiter())
        .with_resource_class(args.class)
        .with_working_dir(output_dir)
        .with_events(tx);

    // The pipeline owns the sender, so the event loop ends once it is dropped.
    let execution = async move { pipeline.run(dreme.as_ref(), fimo.as_ref()).await };
    let (result, ()) = tokio::join!(execution, print_events(rx, json));
    let result = result.context("Motif pipeline aborted")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(&result);
    }

    Ok(result.success)
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("Failed to resolve path: {}", path.display()))
}

async fn print_events(mut rx: mpsc::Receiver<PipelineEvent>, quiet: bool) {
    while let Some(event) = rx.recv().await {
        if quiet {
            continue;
        }
        match event {
            PipelineEvent::StageStarted { stage } => {
                println!("▶ Stage '{}' started", stage);
            }
            PipelineEvent::JobSubmitted { stage, backend_id } => {
                println!("  [{}] submitted as job {}", stage, backend_id);
            }
            PipelineEvent::StageCompleted { stage, success } => {
                if success {
                    println!("✓ Stage '{}' completed successfully\n", stage);
                } else {
                    println!("✗ Stage '{}' failed\n", stage);
                }
            }
            PipelineEvent::PipelineCompleted { success } => {
                if success {
                    println!("--- Pipeline completed successfully ---");
                } else {
                    println!("--- Pipeline failed ---");
                }
            }
        }
    }
}

fn print_summary(result: &PipelineResult) {
    println!("\n--- Stage Summary ---");
    for stage in &result.stages {
        let status = match &stage.state {
            StageState::Succeeded => "✓ succeeded".to_string(),
            StageState::Failed { message } => format!("✗ failed: {}", message),
            StageState::Skipped { reason } => format!("⊘ skipped: {}", reason),
        };
        println!("  {} - {}", stage.name, status);
    }
}
