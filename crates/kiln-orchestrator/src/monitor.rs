//! Status polling for a submitted job.
//!
//! The monitor polls the scheduler at a fixed interval until the job reaches
//! a terminal status. Work happens only when the observed status changes: the
//! change is logged and metrics are emitted once per transition, so repeated
//! polls of a long-running job stay quiet.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::error::{OrchestrationError, Result};
use crate::job::{Job, JobName, JobStatus, StatusChange};
use crate::metrics::{JobMetrics, MetricsSink};
use crate::retry::RetryPolicy;
use crate::scheduler::{JobDescription, JobScheduler};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_METRICS_NAMESPACE: &str = "SageMaker/Training";

/// Source of waiting between polls.
#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, Clone)]
pub struct MonitorOutcome {
    pub status: JobStatus,
    /// Last description received from the scheduler.
    pub description: JobDescription,
    pub transitions: Vec<StatusChange>,
}

impl MonitorOutcome {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status == JobStatus::Completed
    }
}

pub struct JobMonitor {
    scheduler: Arc<dyn JobScheduler>,
    metrics: Arc<dyn MetricsSink>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    namespace: String,
    retry: RetryPolicy,
}

impl fmt::Debug for JobMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobMonitor")
            .field("poll_interval", &self.poll_interval)
            .field("namespace", &self.namespace)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl JobMonitor {
    pub fn new(scheduler: Arc<dyn JobScheduler>, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            scheduler,
            metrics,
            clock: Arc::new(TokioClock),
            poll_interval: DEFAULT_POLL_INTERVAL,
            namespace: DEFAULT_METRICS_NAMESPACE.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Poll until `job` reaches a terminal status.
    ///
    /// There is no overall timeout; the scheduler's max runtime bounds the job.
    pub async fn monitor(&self, job: &mut Job) -> Result<MonitorOutcome> {
        let metrics = JobMetrics::new(self.metrics.clone(), self.namespace.clone(), job.name().clone());
        let mut transitions = Vec::new();
        let mut previous: Option<JobDescription> = None;

        info!(job = %job.name(), interval = ?self.poll_interval, "Monitoring training job");

        let description = loop {
            let description = self.describe(job.name()).await?;

            if previous.as_ref() != Some(&description) {
                debug!(job = %job.name(), description = %description.raw, "Job description");
            }

            if let Some(change) = job.observe(&description) {
                self.report(job, &change, &description, &metrics).await;
                transitions.push(change);
            }

            if job.is_terminal() {
                break description;
            }

            previous = Some(description);
            self.clock.sleep(self.poll_interval).await;
        };

        info!(job = %job.name(), status = %job.status(), "Training job finished");
        Ok(MonitorOutcome { status: job.status(), description, transitions })
    }

    async fn report(&self, job: &Job, change: &StatusChange, description: &JobDescription, metrics: &JobMetrics) {
        info!(
            job = %job.name(),
            from = %change.from,
            to = %change.to,
            secondary_status = change.secondary_status.as_deref().unwrap_or("-"),
            "Job status changed"
        );

        metrics.status_change(change.to).await;
        metrics.instance_count(job.resources().instance_count).await;
        if let Some(seconds) = description.billable_seconds {
            metrics.billable_time(seconds).await;
        }

        if let Some(ref reason) = description.failure_reason {
            error!(job = %job.name(), reason = %reason, "Training job failure reason");
        }
    }

    async fn describe(&self, name: &JobName) -> Result<JobDescription> {
        let mut retries = 0;
        loop {
            match self.scheduler.describe_job(name).await {
                Ok(description) => return Ok(description),
                Err(e) if self.retry.allows_retry(retries) => {
                    let delay = self.retry.calculate_delay(retries);
                    warn!(job = %name, error = %e, retry = retries + 1, delay = ?delay, "Describe failed, retrying");
                    self.clock.sleep(delay).await;
                    retries += 1;
                }
                Err(e @ OrchestrationError::TransientService { .. }) => return Err(e),
                Err(e) => return Err(OrchestrationError::transient("describe_job", e.to_string())),
            }
        }
    }
}
