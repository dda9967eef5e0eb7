//! Fake collaborators shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use kiln_orchestrator::{
    Clock, JobDescription, JobName, JobRequest, JobScheduler, JobStatus, MetricDatum, MetricsSink, ObjectMetadata,
    ObjectStore, OrchestrationError, S3Uri, StorageError,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// Object store answering from a fixed table. Unknown keys exist.
#[derive(Default)]
pub struct FakeStore {
    responses: HashMap<String, StorageError>,
    pub heads: Mutex<Vec<String>>,
}

impl FakeStore {
    pub fn failing(mut self, uri: &str, error: StorageError) -> Self {
        self.responses.insert(uri.to_string(), error);
        self
    }

    pub fn head_count(&self) -> usize {
        self.heads.lock().unwrap().len()
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn head_object(&self, uri: &S3Uri) -> Result<ObjectMetadata, StorageError> {
        self.heads.lock().unwrap().push(uri.to_string());
        match self.responses.get(&uri.to_string()) {
            Some(error) => Err(error.clone()),
            None => Ok(ObjectMetadata { content_length: Some(1024), ..Default::default() }),
        }
    }
}

/// Scheduler replaying a scripted sequence of describe results.
///
/// The last entry repeats once the script runs out.
#[derive(Default)]
pub struct FakeScheduler {
    script: Mutex<VecDeque<Result<JobDescription, String>>>,
    pub created: Mutex<Vec<JobRequest>>,
    pub describes: Mutex<usize>,
}

impl FakeScheduler {
    pub fn with_statuses(statuses: &[JobStatus]) -> Self {
        let script = statuses.iter().map(|s| Ok(description(*s))).collect();
        Self { script: Mutex::new(script), ..Default::default() }
    }

    pub fn with_script(script: Vec<Result<JobDescription, String>>) -> Self {
        Self { script: Mutex::new(script.into()), ..Default::default() }
    }

    pub fn describe_count(&self) -> usize {
        *self.describes.lock().unwrap()
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }
}

#[async_trait]
impl JobScheduler for FakeScheduler {
    async fn create_job(&self, request: &JobRequest) -> kiln_orchestrator::Result<()> {
        self.created.lock().unwrap().push(request.clone());
        Ok(())
    }

    async fn describe_job(&self, _name: &JobName) -> kiln_orchestrator::Result<JobDescription> {
        *self.describes.lock().unwrap() += 1;
        let mut script = self.script.lock().unwrap();
        let next = if script.len() > 1 { script.pop_front() } else { script.front().cloned() };
        match next {
            Some(Ok(description)) => Ok(description),
            Some(Err(message)) => Err(OrchestrationError::TransientService {
                operation: "describe_job".to_string(),
                message,
            }),
            None => Err(OrchestrationError::TransientService {
                operation: "describe_job".to_string(),
                message: "script exhausted".to_string(),
            }),
        }
    }
}

#[derive(Default)]
pub struct RecordingMetrics {
    pub data: Mutex<Vec<MetricDatum>>,
}

impl RecordingMetrics {
    pub fn named(&self, name: &str) -> Vec<MetricDatum> {
        self.data.lock().unwrap().iter().filter(|d| d.name == name).cloned().collect()
    }
}

#[async_trait]
impl MetricsSink for RecordingMetrics {
    async fn put_metric(&self, datum: MetricDatum) -> anyhow::Result<()> {
        self.data.lock().unwrap().push(datum);
        Ok(())
    }
}

/// Clock that records requested sleeps and returns immediately.
#[derive(Default)]
pub struct RecordingClock {
    pub sleeps: Mutex<Vec<Duration>>,
}

impl RecordingClock {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Clock for RecordingClock {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

pub fn description(status: JobStatus) -> JobDescription {
    JobDescription {
        status,
        secondary_status: Some(format!("{status}Secondary")),
        raw: serde_json::json!({ "TrainingJobStatus": status.to_string() }),
        ..Default::default()
    }
}
