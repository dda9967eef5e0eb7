//! Metrics-sink collaborator and the job-scoped emitter built on it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};

use crate::job::{JobName, JobStatus};

pub const JOB_NAME_DIMENSION: &str = "TrainingJobName";
pub const STATUS_DIMENSION: &str = "Status";

pub const STATUS_CHANGE_METRIC: &str = "StatusChange";
pub const INSTANCE_COUNT_METRIC: &str = "InstanceCount";
pub const BILLABLE_TIME_METRIC: &str = "BillableTime";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricUnit {
    Count,
    Seconds,
    None,
}

impl fmt::Display for MetricUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Count => "Count",
            Self::Seconds => "Seconds",
            Self::None => "None",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDatum {
    pub namespace: String,
    pub name: String,
    pub value: f64,
    pub unit: MetricUnit,
    pub dimensions: Vec<(String, String)>,
}

#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn put_metric(&self, datum: MetricDatum) -> anyhow::Result<()>;
}

/// Emits metrics for one job under a fixed namespace.
///
/// Failed puts are logged and dropped.
#[derive(Clone)]
pub struct JobMetrics {
    sink: Arc<dyn MetricsSink>,
    namespace: String,
    job_name: JobName,
}

impl fmt::Debug for JobMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobMetrics")
            .field("namespace", &self.namespace)
            .field("job_name", &self.job_name)
            .finish_non_exhaustive()
    }
}

impl JobMetrics {
    pub fn new(sink: Arc<dyn MetricsSink>, namespace: impl Into<String>, job_name: JobName) -> Self {
        Self { sink, namespace: namespace.into(), job_name }
    }

    pub async fn status_change(&self, status: JobStatus) {
        self.put(STATUS_CHANGE_METRIC, 1.0, MetricUnit::Count, vec![(STATUS_DIMENSION.to_string(), status.to_string())])
            .await;
    }

    pub async fn instance_count(&self, count: u32) {
        self.put(INSTANCE_COUNT_METRIC, f64::from(count), MetricUnit::Count, Vec::new()).await;
    }

    pub async fn billable_time(&self, seconds: u64) {
        self.put(BILLABLE_TIME_METRIC, seconds as f64, MetricUnit::Seconds, Vec::new()).await;
    }

    async fn put(&self, name: &str, value: f64, unit: MetricUnit, extra: Vec<(String, String)>) {
        let mut dimensions = vec![(JOB_NAME_DIMENSION.to_string(), self.job_name.to_string())];
        dimensions.extend(extra);

        let datum = MetricDatum { namespace: self.namespace.clone(), name: name.to_string(), value, unit, dimensions };
        match self.sink.put_metric(datum).await {
            Ok(()) => debug!(metric = name, value, %unit, "Metric emitted"),
            Err(e) => error!(metric = name, error = %e, "Failed to emit metric"),
        }
    }
}

/// Sink that discards everything. For dry runs and hosts without metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

#[async_trait]
impl MetricsSink for NoopMetrics {
    async fn put_metric(&self, _datum: MetricDatum) -> anyhow::Result<()> {
        Ok(())
    }
}
