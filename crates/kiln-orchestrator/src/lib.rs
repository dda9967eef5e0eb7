//! Kiln Orchestrator
//!
//! Control side of a fine-tuning job: verifies inputs, submits the job to a
//! scheduler and follows it to a terminal status. The scheduler, object
//! storage and metrics sink are traits; `AwsCli` implements all three.

pub mod aws;
pub mod channels;
pub mod config;
pub mod error;
pub mod job;
pub mod metrics;
pub mod monitor;
pub mod retry;
pub mod scheduler;
pub mod storage;
pub mod submitter;

pub use aws::AwsCli;
pub use channels::{ChannelSet, ChannelSource, DataChannel, REQUIRED_CHANNELS};
pub use config::{LauncherConfig, RetryConfig};
pub use error::{OrchestrationError, Result};
pub use job::{Job, JobName, JobStatus, ResourceSpec, StatusChange};
pub use metrics::{JobMetrics, MetricDatum, MetricUnit, MetricsSink, NoopMetrics};
pub use monitor::{Clock, JobMonitor, MonitorOutcome, TokioClock};
pub use retry::RetryPolicy;
pub use scheduler::{JobDescription, JobRequest, JobScheduler};
pub use storage::{ObjectMetadata, ObjectStore, S3Uri, StorageError};
pub use submitter::JobSubmitter;
