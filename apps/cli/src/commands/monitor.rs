//! Monitor command implementation.

use crate::commands::load_config;
use crate::commands::types::MonitorArgs;
use anyhow::Result;
use colored::Colorize;
use kiln_orchestrator::{AwsCli, Job, JobMonitor, JobName, JobStatus, LauncherConfig, OrchestrationError};
use std::sync::Arc;

pub async fn execute(cmd: MonitorArgs) -> Result<()> {
    let config = load_config(cmd.config.as_deref())?;
    let name = JobName::new(cmd.job_name)?;
    let backend = Arc::new(AwsCli::new(config.region.clone()));
    let mut job = Job::new(name, config.resources());

    follow(&config, backend, &mut job).await
}

/// Monitor `job` to a terminal status and print the result.
///
/// Anything other than `Completed` is returned as an error.
pub async fn follow(config: &LauncherConfig, backend: Arc<AwsCli>, job: &mut Job) -> Result<()> {
    let monitor = JobMonitor::new(backend.clone(), backend)
        .with_poll_interval(config.poll_interval())
        .with_namespace(config.metrics_namespace.clone())
        .with_retry_policy(config.retry.policy());

    let outcome = monitor.monitor(job).await?;

    println!();
    let status = outcome.status.to_string();
    let status = if outcome.succeeded() { status.green() } else { status.red() };
    println!("{} {}", "Job".bold(), job.name().to_string().cyan());
    println!("  {:<16} {}", "Status:", status.bold());
    println!("  {:<16} {}", "Transitions:", outcome.transitions.len());
    println!("  {:<16} {}s", "Billable time:", job.billable_seconds());
    if let Some(output) = job.output_location() {
        println!("  {:<16} {}", "Artifacts:", output);
    }
    println!();

    if outcome.status == JobStatus::Completed {
        Ok(())
    } else {
        Err(OrchestrationError::JobFailed {
            name: job.name().to_string(),
            status: outcome.status.to_string(),
            reason: job.failure_reason().map(str::to_string),
        }
        .into())
    }
}
