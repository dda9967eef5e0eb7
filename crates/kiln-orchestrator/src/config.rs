//! Launcher configuration file support.
//!
//! ```toml
//! image = "123456789012.dkr.ecr.us-west-2.amazonaws.com/mf-test:latest"
//! role = "arn:aws:iam::123456789012:role/MistralFineTuneRole"
//! instance_type = "ml.g5.12xlarge"
//!
//! [environment]
//! WANDB_PROJECT = "mistral-finetune"
//!
//! [retry]
//! max_retries = 3
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{OrchestrationError, Result};
use crate::job::{JobName, ResourceSpec, MAX_BASE_NAME_LEN};
use crate::retry::RetryPolicy;

pub const DEFAULT_CONFIG_FILE: &str = "kiln.toml";

/// Launcher configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    /// Prefix for generated job names
    pub base_job_name: String,

    /// Training container image
    pub image: Option<String>,

    /// Execution role the job runs under
    pub role: Option<String>,

    pub instance_type: String,
    pub instance_count: u32,
    pub volume_size_gb: u32,
    pub max_runtime_secs: u64,

    /// Where the scheduler writes job output
    pub output_path: Option<String>,

    /// YAML manifest of data channels
    pub channels_manifest: PathBuf,

    pub poll_interval_secs: u64,
    pub metrics_namespace: String,
    pub region: Option<String>,

    /// Extra environment for the training container
    pub environment: BTreeMap<String, String>,
    pub hyperparameters: BTreeMap<String, String>,

    pub retry: RetryConfig,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        let resources = ResourceSpec::default();
        Self {
            base_job_name: "mf-test-job".to_string(),
            image: None,
            role: None,
            instance_type: resources.instance_type,
            instance_count: resources.instance_count,
            volume_size_gb: resources.volume_size_gb,
            max_runtime_secs: resources.max_runtime_secs,
            output_path: None,
            channels_manifest: PathBuf::from("config/data-channels.yaml"),
            poll_interval_secs: 30,
            metrics_namespace: "SageMaker/Training".to_string(),
            region: None,
            environment: BTreeMap::new(),
            hyperparameters: BTreeMap::new(),
            retry: RetryConfig::default(),
        }
    }
}

/// Retry settings for scheduler calls made while monitoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_retries: policy.max_retries,
            initial_delay_ms: policy.initial_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
            multiplier: policy.multiplier,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.initial_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.multiplier,
        )
    }
}

impl LauncherConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(OrchestrationError::Configuration(format!(
                "configuration file not found: {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load `./kiln.toml` if present, otherwise defaults.
    pub fn discover_and_load() -> Result<Self> {
        let local = PathBuf::from(DEFAULT_CONFIG_FILE);
        if local.exists() { Self::load_from_file(&local) } else { Ok(Self::default()) }
    }

    /// Check the values a submission cannot do without.
    pub fn validate(&self) -> Result<()> {
        if self.image.as_deref().is_none_or(|i| i.trim().is_empty()) {
            return Err(OrchestrationError::Configuration("image is required".to_string()));
        }
        if self.role.as_deref().is_none_or(|r| r.trim().is_empty()) {
            return Err(OrchestrationError::Configuration("role is required".to_string()));
        }
        if self.base_job_name.len() > MAX_BASE_NAME_LEN {
            return Err(OrchestrationError::Configuration(format!(
                "base_job_name must be at most {MAX_BASE_NAME_LEN} characters"
            )));
        }
        JobName::generate(&self.base_job_name)?;

        for (field, value) in [
            ("instance_count", u64::from(self.instance_count)),
            ("volume_size_gb", u64::from(self.volume_size_gb)),
            ("max_runtime_secs", self.max_runtime_secs),
            ("poll_interval_secs", self.poll_interval_secs),
        ] {
            if value == 0 {
                return Err(OrchestrationError::Configuration(format!("{field} must be positive")));
            }
        }
        if self.retry.multiplier < 1.0 {
            return Err(OrchestrationError::Configuration("retry.multiplier must be at least 1.0".to_string()));
        }
        Ok(())
    }

    #[must_use]
    pub fn resources(&self) -> ResourceSpec {
        ResourceSpec {
            instance_type: self.instance_type.clone(),
            instance_count: self.instance_count,
            volume_size_gb: self.volume_size_gb,
            max_runtime_secs: self.max_runtime_secs,
        }
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(contents: &str) -> (TempDir, PathBuf) {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("kiln.toml");
        std::fs::write(&path, contents).unwrap();
        (temp, path)
    }

    #[test]
    fn test_defaults() {
        let config = LauncherConfig::default();
        assert_eq!(config.base_job_name, "mf-test-job");
        assert_eq!(config.instance_type, "ml.m5.xlarge");
        assert_eq!(config.instance_count, 1);
        assert_eq!(config.volume_size_gb, 100);
        assert_eq!(config.max_runtime_secs, 86_400);
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.metrics_namespace, "SageMaker/Training");
        assert_eq!(config.retry.policy().max_retries, 0);
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let (_temp, path) = write_config(
            r#"
image = "registry/mf-test:0.3"
role = "MistralFineTuneRole"
instance_count = 2

[environment]
WANDB_MODE = "offline"

[retry]
max_retries = 3
"#,
        );
        let config = LauncherConfig::load_from_file(&path).unwrap();
        assert_eq!(config.image.as_deref(), Some("registry/mf-test:0.3"));
        assert_eq!(config.instance_count, 2);
        assert_eq!(config.instance_type, "ml.m5.xlarge");
        assert_eq!(config.environment.get("WANDB_MODE").map(String::as_str), Some("offline"));
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.multiplier, 2.0);
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_requires_image_and_role() {
        let mut config = LauncherConfig::default();
        assert!(matches!(config.validate(), Err(OrchestrationError::Configuration(ref m)) if m.contains("image")));

        config.image = Some("img".into());
        assert!(matches!(config.validate(), Err(OrchestrationError::Configuration(ref m)) if m.contains("role")));

        config.role = Some("role".into());
        config.instance_count = 0;
        assert!(matches!(
            config.validate(),
            Err(OrchestrationError::Configuration(ref m)) if m.contains("instance_count")
        ));
    }

    #[test]
    fn test_missing_and_invalid_files() {
        assert!(matches!(
            LauncherConfig::load_from_file(Path::new("/nonexistent/kiln.toml")),
            Err(OrchestrationError::Configuration(_))
        ));

        let (_temp, path) = write_config("instance_count = \"two\"\n");
        let err = LauncherConfig::load_from_file(&path).unwrap_err();
        assert!(matches!(err, OrchestrationError::Toml(_)));
        assert_eq!(err.exit_code(), 2);
    }
}
