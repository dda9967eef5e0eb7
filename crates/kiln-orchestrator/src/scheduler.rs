//! Job-scheduling collaborator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::channels::DataChannel;
use crate::error::Result;
use crate::job::{JobName, JobStatus, ResourceSpec};

/// Everything the scheduler needs to start a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    pub name: JobName,
    pub image: String,
    pub role: String,
    pub channels: Vec<DataChannel>,
    pub resources: ResourceSpec,
    pub output_path: Option<String>,
    pub environment: BTreeMap<String, String>,
    pub hyperparameters: BTreeMap<String, String>,
}

/// Snapshot of a job as reported by the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescription {
    pub status: JobStatus,
    pub secondary_status: Option<String>,
    pub failure_reason: Option<String>,
    pub resources: Option<ResourceSpec>,
    pub billable_seconds: Option<u64>,
    pub output_location: Option<String>,
    /// Backend response as received.
    pub raw: serde_json::Value,
}

impl Default for JobDescription {
    fn default() -> Self {
        Self {
            status: JobStatus::Pending,
            secondary_status: None,
            failure_reason: None,
            resources: None,
            billable_seconds: None,
            output_location: None,
            raw: serde_json::Value::Null,
        }
    }
}

#[async_trait]
pub trait JobScheduler: Send + Sync {
    async fn create_job(&self, request: &JobRequest) -> Result<()>;

    async fn describe_job(&self, name: &JobName) -> Result<JobDescription>;
}
