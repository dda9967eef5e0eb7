//! Submit command implementation.

use crate::commands::load_config;
use crate::commands::monitor::follow;
use crate::commands::types::SubmitArgs;
use anyhow::Result;
use colored::Colorize;
use kiln_orchestrator::{AwsCli, ChannelSet, JobSubmitter};
use std::sync::Arc;

pub async fn execute(cmd: SubmitArgs) -> Result<()> {
    let config = load_config(cmd.config.as_deref())?;
    config.validate()?;

    let manifest = cmd.channels.unwrap_or_else(|| config.channels_manifest.clone());
    let channels = ChannelSet::load_manifest(&manifest)?;

    let backend = Arc::new(AwsCli::new(config.region.clone()));
    let submitter = JobSubmitter::new(backend.clone(), backend.clone())
        .with_base_job_name(config.base_job_name.clone())
        .with_output_path(config.output_path.clone())
        .with_hyperparameters(config.hyperparameters.clone());

    let image = config.image.as_deref().unwrap_or_default();
    let role = config.role.as_deref().unwrap_or_default();
    let mut job = submitter
        .submit(image, role, &channels, config.resources(), config.environment.clone())
        .await?;

    println!("{} {}", "Submitted".green().bold(), job.name().to_string().cyan());

    if cmd.no_wait {
        println!("  {}", format!("Follow it with `kiln monitor {}`", job.name()).dimmed());
        return Ok(());
    }

    follow(&config, backend, &mut job).await
}
