mod common;

use common::{description, FakeScheduler, RecordingClock, RecordingMetrics};
use kiln_orchestrator::metrics::{BILLABLE_TIME_METRIC, INSTANCE_COUNT_METRIC, STATUS_CHANGE_METRIC};
use kiln_orchestrator::{
    Job, JobDescription, JobMonitor, JobName, JobStatus, OrchestrationError, ResourceSpec, RetryPolicy,
};
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    scheduler: Arc<FakeScheduler>,
    metrics: Arc<RecordingMetrics>,
    clock: Arc<RecordingClock>,
    monitor: JobMonitor,
}

impl Harness {
    fn new(scheduler: FakeScheduler) -> Self {
        let scheduler = Arc::new(scheduler);
        let metrics = Arc::new(RecordingMetrics::default());
        let clock = Arc::new(RecordingClock::default());
        let monitor = JobMonitor::new(scheduler.clone(), metrics.clone()).with_clock(clock.clone());
        Self { scheduler, metrics, clock, monitor }
    }
}

fn job() -> Job {
    let resources = ResourceSpec { instance_count: 2, ..ResourceSpec::default() };
    Job::new(JobName::new("mf-test-job-20250101-000000-000").unwrap(), resources)
}

#[tokio::test]
async fn test_repeated_statuses_emit_once_per_transition() {
    use JobStatus::{Completed, InProgress};
    let harness = Harness::new(FakeScheduler::with_statuses(&[InProgress, InProgress, InProgress, Completed]));
    let mut job = job();

    let outcome = harness.monitor.monitor(&mut job).await.unwrap();

    assert_eq!(outcome.status, Completed);
    assert!(outcome.succeeded());
    assert_eq!(outcome.transitions.len(), 2);
    assert_eq!((outcome.transitions[0].from, outcome.transitions[0].to), (JobStatus::Pending, InProgress));
    assert_eq!((outcome.transitions[1].from, outcome.transitions[1].to), (InProgress, Completed));

    let status_changes = harness.metrics.named(STATUS_CHANGE_METRIC);
    assert_eq!(status_changes.len(), 2);
    assert_eq!(status_changes[1].dimensions[1], ("Status".to_string(), "Completed".to_string()));
    assert!(status_changes.iter().all(|d| d.namespace == "SageMaker/Training"));

    let instance_counts = harness.metrics.named(INSTANCE_COUNT_METRIC);
    assert_eq!(instance_counts.len(), 2);
    assert!(instance_counts.iter().all(|d| d.value == 2.0));

    assert_eq!(harness.scheduler.describe_count(), 4);
    assert_eq!(harness.clock.sleeps(), vec![Duration::from_secs(30); 3]);
    assert_eq!(job.status(), Completed);
}

#[tokio::test]
async fn test_failed_job_converges_with_reason() {
    let failed = JobDescription {
        failure_reason: Some("AlgorithmError: CUDA out of memory".to_string()),
        billable_seconds: Some(95),
        ..description(JobStatus::Failed)
    };
    let harness = Harness::new(FakeScheduler::with_script(vec![Ok(description(JobStatus::InProgress)), Ok(failed)]));
    let mut job = job();

    let outcome = harness.monitor.monitor(&mut job).await.unwrap();

    assert_eq!(outcome.status, JobStatus::Failed);
    assert!(!outcome.succeeded());
    assert_eq!(outcome.description.failure_reason.as_deref(), Some("AlgorithmError: CUDA out of memory"));
    assert_eq!(job.failure_reason(), Some("AlgorithmError: CUDA out of memory"));

    let billable = harness.metrics.named(BILLABLE_TIME_METRIC);
    assert_eq!(billable.len(), 1);
    assert_eq!(billable[0].value, 95.0);
}

#[tokio::test]
async fn test_monitoring_a_finished_job_returns_at_once() {
    let harness = Harness::new(FakeScheduler::with_statuses(&[JobStatus::Stopped]));
    let mut job = job();

    harness.monitor.monitor(&mut job).await.unwrap();
    let again = harness.monitor.monitor(&mut job).await.unwrap();

    assert_eq!(again.status, JobStatus::Stopped);
    assert!(again.transitions.is_empty());
    assert_eq!(harness.metrics.named(STATUS_CHANGE_METRIC).len(), 1);
    assert!(harness.clock.sleeps().is_empty());
}

#[tokio::test]
async fn test_out_of_order_status_is_ignored() {
    use JobStatus::{Completed, InProgress, Pending};
    let harness = Harness::new(FakeScheduler::with_statuses(&[InProgress, Pending, Completed]));
    let mut job = job();

    let outcome = harness.monitor.monitor(&mut job).await.unwrap();

    assert_eq!(outcome.transitions.iter().map(|t| t.to).collect::<Vec<_>>(), vec![InProgress, Completed]);
}

#[tokio::test]
async fn test_describe_failure_fails_fast_by_default() {
    let harness = Harness::new(FakeScheduler::with_script(vec![Err("ThrottlingException".to_string())]));
    let mut job = job();

    let err = harness.monitor.monitor(&mut job).await.unwrap_err();

    assert!(matches!(err, OrchestrationError::TransientService { ref message, .. } if message == "ThrottlingException"));
    assert_eq!(harness.scheduler.describe_count(), 1);
    assert_eq!(job.status(), JobStatus::Pending);
}

#[tokio::test]
async fn test_describe_failure_retries_with_backoff() {
    let scheduler = FakeScheduler::with_script(vec![
        Err("ThrottlingException".to_string()),
        Err("ThrottlingException".to_string()),
        Ok(description(JobStatus::Completed)),
    ]);
    let harness = Harness::new(scheduler);
    let monitor = JobMonitor::new(harness.scheduler.clone(), harness.metrics.clone())
        .with_clock(harness.clock.clone())
        .with_retry_policy(RetryPolicy::new(2, Duration::from_millis(100), Duration::from_secs(1), 2.0));
    let mut job = job();

    let outcome = monitor.monitor(&mut job).await.unwrap();

    assert_eq!(outcome.status, JobStatus::Completed);
    assert_eq!(harness.clock.sleeps(), vec![Duration::from_millis(100), Duration::from_millis(200)]);
}

#[tokio::test]
async fn test_retries_exhausted_returns_transient_error() {
    let scheduler = FakeScheduler::with_script(vec![Err("InternalFailure".to_string())]);
    let harness = Harness::new(scheduler);
    let monitor = JobMonitor::new(harness.scheduler.clone(), harness.metrics.clone())
        .with_clock(harness.clock.clone())
        .with_retry_policy(RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(15), 2.0));
    let mut job = job();

    let err = monitor.monitor(&mut job).await.unwrap_err();

    assert!(matches!(err, OrchestrationError::TransientService { .. }));
    assert_eq!(harness.scheduler.describe_count(), 4);
    assert_eq!(
        harness.clock.sleeps(),
        vec![Duration::from_millis(10), Duration::from_millis(15), Duration::from_millis(15)]
    );
}

#[tokio::test]
async fn test_custom_poll_interval_and_namespace() {
    let harness = Harness::new(FakeScheduler::with_statuses(&[JobStatus::InProgress, JobStatus::Completed]));
    let monitor = JobMonitor::new(harness.scheduler.clone(), harness.metrics.clone())
        .with_clock(harness.clock.clone())
        .with_poll_interval(Duration::from_secs(5))
        .with_namespace("Kiln/Test");
    let mut job = job();

    monitor.monitor(&mut job).await.unwrap();

    assert_eq!(harness.clock.sleeps(), vec![Duration::from_secs(5)]);
    assert!(harness.metrics.data.lock().unwrap().iter().all(|d| d.namespace == "Kiln/Test"));
}
