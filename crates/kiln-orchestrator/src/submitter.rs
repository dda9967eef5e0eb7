//! Input verification and job submission.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::channels::{ChannelSet, ChannelSource};
use crate::error::{OrchestrationError, Result};
use crate::job::{Job, JobName, ResourceSpec};
use crate::scheduler::{JobRequest, JobScheduler};
use crate::storage::{ObjectStore, S3Uri, StorageError};
use kiln_training::environment::IMAGE_VERSION_VAR;

/// Tag of a container image reference, `latest` when untagged.
#[must_use]
pub fn image_tag(image: &str) -> &str {
    let name_start = image.rfind('/').map_or(0, |i| i + 1);
    image[name_start..].rsplit_once(':').map_or("latest", |(_, tag)| tag)
}

/// Verifies every declared input and starts the job.
///
/// Nothing is submitted unless all inputs check out.
pub struct JobSubmitter {
    store: Arc<dyn ObjectStore>,
    scheduler: Arc<dyn JobScheduler>,
    base_job_name: String,
    output_path: Option<String>,
    hyperparameters: BTreeMap<String, String>,
}

impl fmt::Debug for JobSubmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobSubmitter")
            .field("base_job_name", &self.base_job_name)
            .field("output_path", &self.output_path)
            .finish_non_exhaustive()
    }
}

impl JobSubmitter {
    pub fn new(store: Arc<dyn ObjectStore>, scheduler: Arc<dyn JobScheduler>) -> Self {
        Self {
            store,
            scheduler,
            base_job_name: "mf-test-job".to_string(),
            output_path: None,
            hyperparameters: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_base_job_name(mut self, base: impl Into<String>) -> Self {
        self.base_job_name = base.into();
        self
    }

    #[must_use]
    pub fn with_output_path(mut self, output_path: Option<String>) -> Self {
        self.output_path = output_path;
        self
    }

    #[must_use]
    pub fn with_hyperparameters(mut self, hyperparameters: BTreeMap<String, String>) -> Self {
        self.hyperparameters = hyperparameters;
        self
    }

    pub async fn submit(
        &self,
        image: &str,
        role: &str,
        channels: &ChannelSet,
        resources: ResourceSpec,
        mut environment: BTreeMap<String, String>,
    ) -> Result<Job> {
        channels.check_required()?;

        for channel in channels.iter() {
            match channel.source {
                ChannelSource::Remote(ref uri) => self.verify(&channel.name, uri).await?,
                ChannelSource::Local(ref path) => {
                    warn!(channel = %channel.name, path = %path.display(), "Skipping verification of local channel");
                }
            }
        }

        let name = JobName::generate(&self.base_job_name)?;
        environment
            .entry(IMAGE_VERSION_VAR.to_string())
            .or_insert_with(|| image_tag(image).to_string());

        let request = JobRequest {
            name: name.clone(),
            image: image.to_string(),
            role: role.to_string(),
            channels: channels.iter().collect(),
            resources: resources.clone(),
            output_path: self.output_path.clone(),
            environment,
            hyperparameters: self.hyperparameters.clone(),
        };

        info!(
            job = %name,
            image,
            instance_type = %resources.instance_type,
            instance_count = resources.instance_count,
            "Starting training job"
        );
        for channel in &request.channels {
            info!(channel = %channel.name, source = %channel.source, "Input channel");
        }

        self.scheduler.create_job(&request).await?;
        info!(job = %name, "Training job submitted");

        Ok(Job::new(name, resources))
    }

    async fn verify(&self, channel: &str, uri: &S3Uri) -> Result<()> {
        match self.store.head_object(uri).await {
            Ok(metadata) => {
                info!(channel, %uri, size = ?metadata.content_length, "Verified input");
                Ok(())
            }
            Err(StorageError::NotFound) => {
                Err(OrchestrationError::MissingData { channel: channel.to_string(), uri: uri.to_string() })
            }
            Err(StorageError::AccessDenied) => {
                Err(OrchestrationError::Permission { channel: channel.to_string(), uri: uri.to_string() })
            }
            Err(e @ StorageError::Service { .. }) => {
                Err(OrchestrationError::transient("head_object", format!("{uri}: {e}")))
            }
        }
    }
}
