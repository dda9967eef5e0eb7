//! Command argument definitions shared between main.rs and the handlers.

use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug, Clone)]
pub struct SubmitArgs {
    /// Launcher config file (defaults to ./kiln.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Data-channel manifest (overrides channels_manifest from the config)
    #[arg(long)]
    pub channels: Option<PathBuf>,

    /// Return after submission instead of monitoring the job
    #[arg(long)]
    pub no_wait: bool,
}

#[derive(Args, Debug, Clone)]
pub struct MonitorArgs {
    /// Name of the job to follow
    pub job_name: String,

    /// Launcher config file (defaults to ./kiln.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct TrainArgs {
    /// Directory holding config.yaml (defaults to /opt/ml/code)
    #[arg(long)]
    pub code_dir: Option<PathBuf>,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,
}
