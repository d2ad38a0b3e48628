//! Harbor CLI - container entry point for training and serving jobs
//!
//! Provides the `harbor` command that a training or inference image runs as
//! its entry point.

mod commands;

use clap::{Parser, Subcommand};
use harbor_core::LogLevel;
use std::path::PathBuf;

use commands::{env, serve, train};

/// Harbor - run user training and inference code inside a managed container
#[derive(Parser, Debug)]
#[command(
    name = "harbor",
    author,
    version,
    about = "Harbor - managed container harness for training and serving"
)]
struct Args {
    /// Log level (trace, debug, info, warn, error or a numeric level).
    /// Overrides the level configured for the job.
    #[arg(short, long, global = true, value_parser = parse_log_level)]
    log_level: Option<LogLevel>,

    /// Container root (overrides BASE_PATH, defaults to /opt/ml)
    #[arg(long, global = true)]
    base_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the training job
    ///
    /// Fetches and installs the user code, runs the entry point with the
    /// job's hyperparameters, then writes output/success or output/failure.
    /// The process exits with the user code's exit status.
    Train {
        /// Install the user code as a package even without a setup.py
        #[arg(long)]
        install_as_package: bool,

        /// Never start the metrics agent
        #[arg(long)]
        no_metrics: bool,
    },

    /// Start an inference worker
    ///
    /// Serves GET /ping and POST /invocations until SIGTERM.
    Serve,

    /// Print the resolved training environment as JSON
    Env,
}

fn parse_log_level(value: &str) -> Result<LogLevel, String> {
    LogLevel::parse(value).ok_or_else(|| format!("unknown log level '{value}'"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Train { install_as_package, no_metrics } => {
            train::execute(args.base_path, args.log_level, install_as_package, no_metrics).await;
            Ok(())
        }
        Command::Serve => serve::execute(args.base_path, args.log_level).await,
        Command::Env => env::execute(args.base_path),
    }
}
