//! Kiln CLI - Command-line interface for launching fine-tuning jobs
//!
//! Provides a `kiln` command that submits and monitors remote training jobs
//! and acts as the entry point inside the training container.

mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use kiln_orchestrator::OrchestrationError;
use kiln_training::TrainingError;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::types::{MonitorArgs, SubmitArgs, TrainArgs};
use commands::{monitor, submit, train};

/// Kiln - GPU fine-tuning job launcher
#[derive(Parser, Debug)]
#[command(
    name = "kiln",
    author,
    version,
    about = "Kiln - launch and supervise GPU fine-tuning jobs",
    long_about = "Kiln verifies training inputs, submits a fine-tuning job to a remote scheduler and follows it to completion.\nInside the training container, `kiln train` stages data and runs the trainer."
)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Verify inputs and submit a training job
    ///
    /// Loads the launcher config and channel manifest, checks that every
    /// remote input exists, submits the job and monitors it to completion.
    Submit(SubmitArgs),

    /// Monitor an existing training job until it finishes
    Monitor(MonitorArgs),

    /// Run training inside the job container
    Train(TrainArgs),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber =
        FmtSubscriber::builder().with_max_level(level).without_time().with_target(false).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let result = match args.command {
        Command::Submit(cmd) => submit::execute(cmd).await,
        Command::Monitor(cmd) => monitor::execute(cmd).await,
        Command::Train(cmd) => train::execute(cmd).await,
    };

    if let Err(e) = result {
        eprintln!("{} {e:#}", "error:".red().bold());
        std::process::exit(exit_code(&e));
    }
}

fn exit_code(err: &anyhow::Error) -> i32 {
    if let Some(e) = err.downcast_ref::<OrchestrationError>() {
        e.exit_code()
    } else if let Some(e) = err.downcast_ref::<TrainingError>() {
        e.exit_code()
    } else {
        1
    }
}
