//! gridrun CLI tool.

use clap::{Parser, Subcommand};
use gridrun_core::SchedulerKind;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::motif::MotifArgs;
use commands::submit::SubmitArgs;

#[derive(Parser)]
#[command(name = "gridrun")]
#[command(about = "Submit motif tools to LSF or OGS clusters and wait for them", long_about = None)]
struct Cli {
    /// System configuration file (defaults to ./gridrun.kdl when present)
    #[arg(long, global = true, env = "GRIDRUN_CONFIG")]
    config: Option<PathBuf>,

    /// Scheduler to submit to, overriding the configuration file
    #[arg(long, global = true, env = "GRIDRUN_SCHEDULER", value_parser = SchedulerKind::resolve)]
    scheduler: Option<SchedulerKind>,

    /// Print reports as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run motif discovery (DREME) and/or motif scanning (FIMO)
    Motif(MotifArgs),
    /// Submit a single command and wait for it
    Submit(SubmitArgs),
    /// Validate a system configuration file
    Validate {
        /// Path to the configuration file
        #[arg(default_value = commands::DEFAULT_CONFIG)]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { path } => commands::validate::run(&path, cli.json),
        Commands::Motif(args) => {
            let cluster = commands::Cluster::connect(cli.config.as_deref(), cli.scheduler).await?;
            cluster
                .run_interruptible(commands::motif::run(&cluster, args, cli.json))
                .await
        }
        Commands::Submit(args) => {
            let cluster = commands::Cluster::connect(cli.config.as_deref(), cli.scheduler).await?;
            cluster
                .run_interruptible(commands::submit::run(&cluster, args, cli.json))
                .await
        }
    }
}
