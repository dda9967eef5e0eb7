//! Training command implementation.
//!
//! Runs inside the job container, where the scheduler exposes channels and
//! output locations through the environment.

use crate::commands::types::TrainArgs;
use anyhow::Result;
use colored::Colorize;
use kiln_training::{ContainerEnvironment, ContainerLayout, TrainingPipeline};
use serde_json::json;
use std::path::PathBuf;

pub async fn execute(cmd: TrainArgs) -> Result<()> {
    let code_dir = cmd.code_dir.unwrap_or_else(|| PathBuf::from(ContainerLayout::DEFAULT_CODE_DIR));
    let pipeline = TrainingPipeline::new(ContainerEnvironment::from_env(), ContainerLayout::new(code_dir));

    let report = pipeline.run().await?;

    if cmd.json {
        let out = json!({
            "config": report.config_path,
            "model": report.model.as_ref().map(|m| m.path().to_path_buf()),
            "gpus": report.gpu_count,
            "command": report.command.to_string(),
            "train_sha256": report.staged.train.sha256,
            "eval_sha256": report.staged.eval.sha256,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!("{}", "Training completed".bold().green());
    println!("  {:<10} {}", "Config:", report.config_path.display());
    if let Some(ref model) = report.model {
        println!("  {:<10} {}", "Model:", model.path().display());
    }
    println!("  {:<10} {}", "GPUs:", report.gpu_count);
    println!("  {:<10} {}", "Command:", report.command.to_string().dimmed());
    println!();
    Ok(())
}
