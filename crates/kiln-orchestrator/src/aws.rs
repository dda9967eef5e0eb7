//! AWS backend driven through the `aws` command line tool.
//!
//! Each collaborator call shells out to the CLI with JSON output and parses
//! the response. Credentials and region resolution are left to the CLI.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::debug;

use crate::channels::ChannelSource;
use crate::error::{OrchestrationError, Result};
use crate::job::{JobName, JobStatus, ResourceSpec};
use crate::metrics::{MetricDatum, MetricsSink};
use crate::scheduler::{JobDescription, JobRequest, JobScheduler};
use crate::storage::{ObjectMetadata, ObjectStore, S3Uri, StorageError};

static ERROR_CODE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"An error occurred \(([^)]+)\)").expect("error code regex should be valid")
});

/// Failed CLI invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CliFailure {
    code: String,
    message: String,
}

impl CliFailure {
    fn from_stderr(stderr: &str) -> Self {
        let message = stderr.trim().to_string();
        let code = ERROR_CODE_REGEX
            .captures(&message)
            .and_then(|c| c.get(1))
            .map_or_else(|| "Unknown".to_string(), |m| m.as_str().to_string());
        Self { code, message }
    }

    fn into_storage_error(self) -> StorageError {
        match self.code.as_str() {
            "404" | "NotFound" | "NoSuchKey" | "NoSuchBucket" => StorageError::NotFound,
            "403" | "AccessDenied" | "Forbidden" => StorageError::AccessDenied,
            _ => StorageError::Service { code: self.code, message: self.message },
        }
    }
}

#[derive(Debug, Clone)]
pub struct AwsCli {
    binary: String,
    region: Option<String>,
}

impl Default for AwsCli {
    fn default() -> Self {
        Self { binary: "aws".to_string(), region: None }
    }
}

impl AwsCli {
    #[must_use]
    pub fn new(region: Option<String>) -> Self {
        Self { region, ..Self::default() }
    }

    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    async fn run(&self, args: &[&str]) -> std::result::Result<Value, CliFailure> {
        let mut command = Command::new(&self.binary);
        command.args(args).args(["--output", "json"]);
        if let Some(ref region) = self.region {
            command.arg("--region").arg(region);
        }
        debug!(binary = %self.binary, args = ?args, "Running AWS CLI");

        let output = command.output().await.map_err(|e| CliFailure {
            code: "Spawn".to_string(),
            message: format!("failed to run {}: {e}", self.binary),
        })?;

        if !output.status.success() {
            return Err(CliFailure::from_stderr(&String::from_utf8_lossy(&output.stderr)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&stdout).map_err(|e| CliFailure {
            code: "InvalidOutput".to_string(),
            message: format!("unparseable CLI output: {e}"),
        })
    }
}

#[async_trait]
impl ObjectStore for AwsCli {
    async fn head_object(&self, uri: &S3Uri) -> std::result::Result<ObjectMetadata, StorageError> {
        let response = if uri.key.is_empty() {
            self.run(&["s3api", "head-bucket", "--bucket", &uri.bucket]).await
        } else {
            self.run(&["s3api", "head-object", "--bucket", &uri.bucket, "--key", &uri.key]).await
        };
        let response = response.map_err(CliFailure::into_storage_error)?;

        Ok(ObjectMetadata {
            content_length: response.get("ContentLength").and_then(Value::as_u64),
            etag: response.get("ETag").and_then(Value::as_str).map(str::to_string),
            last_modified: response.get("LastModified").and_then(Value::as_str).map(str::to_string),
        })
    }
}

#[async_trait]
impl JobScheduler for AwsCli {
    async fn create_job(&self, request: &JobRequest) -> Result<()> {
        let input = create_job_input(request)?.to_string();
        self.run(&["sagemaker", "create-training-job", "--cli-input-json", &input])
            .await
            .map_err(|f| OrchestrationError::transient("create_job", f.message))?;
        Ok(())
    }

    async fn describe_job(&self, name: &JobName) -> Result<JobDescription> {
        let response = self
            .run(&["sagemaker", "describe-training-job", "--training-job-name", name.as_str()])
            .await
            .map_err(|f| OrchestrationError::transient("describe_job", f.message))?;
        parse_description(response)
    }
}

#[async_trait]
impl MetricsSink for AwsCli {
    async fn put_metric(&self, datum: MetricDatum) -> anyhow::Result<()> {
        let dimensions: Vec<Value> =
            datum.dimensions.iter().map(|(name, value)| json!({ "Name": name, "Value": value })).collect();
        let data = json!([{
            "MetricName": datum.name,
            "Value": datum.value,
            "Unit": datum.unit.to_string(),
            "Dimensions": dimensions,
        }])
        .to_string();

        self.run(&["cloudwatch", "put-metric-data", "--namespace", &datum.namespace, "--metric-data", &data])
            .await
            .map_err(|f| anyhow::anyhow!("{}: {}", f.code, f.message))?;
        Ok(())
    }
}

/// Request body for `create-training-job`.
pub fn create_job_input(request: &JobRequest) -> Result<Value> {
    let output_path = request
        .output_path
        .as_deref()
        .ok_or_else(|| OrchestrationError::Configuration("output_path is required to create a job".to_string()))?;

    let mut channels = Vec::new();
    for channel in &request.channels {
        let ChannelSource::Remote(ref uri) = channel.source else {
            return Err(OrchestrationError::Configuration(format!(
                "channel '{}' is local; remote jobs need s3 inputs",
                channel.name
            )));
        };
        channels.push(json!({
            "ChannelName": channel.name,
            "DataSource": {
                "S3DataSource": {
                    "S3DataType": "S3Prefix",
                    "S3Uri": uri.to_string(),
                    "S3DataDistributionType": "FullyReplicated",
                }
            },
        }));
    }

    Ok(json!({
        "TrainingJobName": request.name.as_str(),
        "AlgorithmSpecification": {
            "TrainingImage": request.image,
            "TrainingInputMode": "File",
        },
        "RoleArn": request.role,
        "InputDataConfig": channels,
        "OutputDataConfig": { "S3OutputPath": output_path },
        "ResourceConfig": {
            "InstanceType": request.resources.instance_type,
            "InstanceCount": request.resources.instance_count,
            "VolumeSizeInGB": request.resources.volume_size_gb,
        },
        "StoppingCondition": { "MaxRuntimeInSeconds": request.resources.max_runtime_secs },
        "Environment": request.environment,
        "HyperParameters": request.hyperparameters,
    }))
}

/// Parse a `describe-training-job` response.
pub fn parse_description(raw: Value) -> Result<JobDescription> {
    let status = raw
        .get("TrainingJobStatus")
        .and_then(Value::as_str)
        .ok_or_else(|| OrchestrationError::transient("describe_job", "response has no TrainingJobStatus"))?
        .parse::<JobStatus>()?;

    let text = |key: &str| raw.get(key).and_then(Value::as_str).map(str::to_string);

    let resources = raw.get("ResourceConfig").map(|config| {
        let defaults = ResourceSpec::default();
        ResourceSpec {
            instance_type: config
                .get("InstanceType")
                .and_then(Value::as_str)
                .map_or(defaults.instance_type, str::to_string),
            instance_count: config
                .get("InstanceCount")
                .and_then(Value::as_u64)
                .map_or(defaults.instance_count, |c| c as u32),
            volume_size_gb: config
                .get("VolumeSizeInGB")
                .and_then(Value::as_u64)
                .map_or(defaults.volume_size_gb, |v| v as u32),
            max_runtime_secs: raw
                .pointer("/StoppingCondition/MaxRuntimeInSeconds")
                .and_then(Value::as_u64)
                .unwrap_or(defaults.max_runtime_secs),
        }
    });

    Ok(JobDescription {
        status,
        secondary_status: text("SecondaryStatus"),
        failure_reason: text("FailureReason"),
        resources,
        billable_seconds: raw.get("BillableTimeInSeconds").and_then(Value::as_u64),
        output_location: raw
            .pointer("/ModelArtifacts/S3ModelArtifacts")
            .and_then(Value::as_str)
            .map(str::to_string),
        raw,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::DataChannel;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn request(channels: Vec<DataChannel>) -> JobRequest {
        JobRequest {
            name: JobName::new("mf-test-job-20250101-000000-000").unwrap(),
            image: "registry/mf-test:latest".into(),
            role: "MistralFineTuneRole".into(),
            channels,
            resources: ResourceSpec::default(),
            output_path: Some("s3://bucket/output".into()),
            environment: BTreeMap::from([("WANDB_MODE".to_string(), "offline".to_string())]),
            hyperparameters: BTreeMap::new(),
        }
    }

    fn remote(name: &str, uri: &str) -> DataChannel {
        DataChannel { name: name.into(), source: ChannelSource::Remote(S3Uri::parse(uri).unwrap()) }
    }

    #[test]
    fn test_error_code_classification() {
        let not_found = CliFailure::from_stderr("\nAn error occurred (404) when calling the HeadObject operation: Not Found\n");
        assert_eq!(not_found.code, "404");
        assert_eq!(not_found.into_storage_error(), StorageError::NotFound);

        let denied = CliFailure::from_stderr("An error occurred (403) when calling the HeadObject operation: Forbidden");
        assert_eq!(denied.into_storage_error(), StorageError::AccessDenied);

        let throttled = CliFailure::from_stderr("An error occurred (SlowDown) when calling the HeadObject operation");
        assert!(matches!(throttled.into_storage_error(), StorageError::Service { ref code, .. } if code == "SlowDown"));

        let unknown = CliFailure::from_stderr("Unable to locate credentials");
        assert_eq!(unknown.code, "Unknown");
    }

    #[test]
    fn test_create_job_input() {
        let input = create_job_input(&request(vec![
            remote("train", "s3://bucket/data/train.jsonl"),
            remote("test", "s3://bucket/data/eval.jsonl"),
        ]))
        .unwrap();

        assert_eq!(input["TrainingJobName"], "mf-test-job-20250101-000000-000");
        assert_eq!(input["AlgorithmSpecification"]["TrainingImage"], "registry/mf-test:latest");
        assert_eq!(input["InputDataConfig"][0]["ChannelName"], "train");
        assert_eq!(
            input["InputDataConfig"][1]["DataSource"]["S3DataSource"]["S3Uri"],
            "s3://bucket/data/eval.jsonl"
        );
        assert_eq!(input["ResourceConfig"]["InstanceType"], "ml.m5.xlarge");
        assert_eq!(input["ResourceConfig"]["VolumeSizeInGB"], 100);
        assert_eq!(input["StoppingCondition"]["MaxRuntimeInSeconds"], 86_400);
        assert_eq!(input["Environment"]["WANDB_MODE"], "offline");
    }

    #[test]
    fn test_create_job_input_rejects_local_channels() {
        let local = DataChannel { name: "test".into(), source: ChannelSource::Local(PathBuf::from("/data/eval.jsonl")) };
        let err = create_job_input(&request(vec![local])).unwrap_err();
        assert!(matches!(err, OrchestrationError::Configuration(ref m) if m.contains("'test'")));
    }

    #[test]
    fn test_parse_description() {
        let raw = json!({
            "TrainingJobName": "mf-test-job-1",
            "TrainingJobStatus": "Failed",
            "SecondaryStatus": "Failed",
            "FailureReason": "AlgorithmError: exit code 1",
            "BillableTimeInSeconds": 311,
            "ResourceConfig": { "InstanceType": "ml.g5.12xlarge", "InstanceCount": 2, "VolumeSizeInGB": 200 },
            "StoppingCondition": { "MaxRuntimeInSeconds": 3600 },
            "ModelArtifacts": { "S3ModelArtifacts": "s3://bucket/output/model.tar.gz" }
        });
        let description = parse_description(raw).unwrap();

        assert_eq!(description.status, JobStatus::Failed);
        assert_eq!(description.failure_reason.as_deref(), Some("AlgorithmError: exit code 1"));
        assert_eq!(description.billable_seconds, Some(311));
        let resources = description.resources.unwrap();
        assert_eq!((resources.instance_type.as_str(), resources.instance_count), ("ml.g5.12xlarge", 2));
        assert_eq!(resources.max_runtime_secs, 3600);
        assert_eq!(description.output_location.as_deref(), Some("s3://bucket/output/model.tar.gz"));
    }

    #[test]
    fn test_parse_description_maps_stopping_to_in_progress() {
        let description = parse_description(json!({ "TrainingJobStatus": "Stopping" })).unwrap();
        assert_eq!(description.status, JobStatus::InProgress);
        assert!(description.resources.is_none());

        assert!(matches!(parse_description(json!({})), Err(OrchestrationError::TransientService { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cli_failures_map_to_storage_errors() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::TempDir::new().unwrap();
        let script = temp.path().join("aws");
        std::fs::write(
            &script,
            "#!/bin/sh\ncase \"$*\" in\n  *missing*) echo 'An error occurred (404) when calling the HeadObject operation: Not Found' >&2; exit 254 ;;\n  *) echo '{\"ContentLength\": 12, \"ETag\": \"\\\"abc\\\"\"}' ;;\nesac\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let cli = AwsCli::default().with_binary(script.display().to_string());
        let found = cli.head_object(&S3Uri::parse("s3://bucket/present.jsonl").unwrap()).await.unwrap();
        assert_eq!(found.content_length, Some(12));

        let err = cli.head_object(&S3Uri::parse("s3://bucket/missing.jsonl").unwrap()).await.unwrap_err();
        assert_eq!(err, StorageError::NotFound);
    }
}
