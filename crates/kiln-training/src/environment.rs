//! Environment contract between the control process and the training container.
//!
//! Variable names are shared with the execution backend and must not change.

use crate::error::{TrainingError, TrainingResult};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub const CHANNEL_TRAIN: &str = "train";
pub const CHANNEL_TEST: &str = "test";
pub const CHANNEL_MODEL: &str = "model";

pub const MODEL_DIR_VAR: &str = "SM_MODEL_DIR";
pub const RUN_DIR_VAR: &str = "RUN_DIR";
pub const IMAGE_VERSION_VAR: &str = "IMAGE_VERSION";

const DEFAULT_MODEL_DIR: &str = "/opt/ml/model";

/// Name of the variable the backend uses to expose a channel's local directory.
#[must_use]
pub fn channel_env_var(channel: &str) -> String {
    format!("SM_CHANNEL_{}", channel.to_uppercase())
}

/// Snapshot of the container environment, read once at startup.
#[derive(Debug, Clone, Default)]
pub struct ContainerEnvironment {
    vars: BTreeMap<String, String>,
}

impl ContainerEnvironment {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self { vars: vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str).filter(|v| !v.trim().is_empty())
    }

    #[must_use]
    pub fn channel_dir(&self, channel: &str) -> Option<PathBuf> {
        self.get(&channel_env_var(channel)).map(PathBuf::from)
    }

    /// Train and test channel directories; both are required.
    pub fn data_channels(&self) -> TrainingResult<(PathBuf, PathBuf)> {
        match (self.channel_dir(CHANNEL_TRAIN), self.channel_dir(CHANNEL_TEST)) {
            (Some(train), Some(test)) => Ok((train, test)),
            _ => Err(TrainingError::Configuration(format!(
                "{} and {} environment variables must be set",
                channel_env_var(CHANNEL_TRAIN),
                channel_env_var(CHANNEL_TEST)
            ))),
        }
    }

    #[must_use]
    pub fn model_channel(&self) -> Option<PathBuf> {
        self.channel_dir(CHANNEL_MODEL)
    }

    #[must_use]
    pub fn model_dir(&self) -> PathBuf {
        self.get(MODEL_DIR_VAR).map_or_else(|| PathBuf::from(DEFAULT_MODEL_DIR), PathBuf::from)
    }

    /// Run directory handed to the trainer; defaults to `<model_dir>/run`.
    #[must_use]
    pub fn run_dir(&self) -> PathBuf {
        self.get(RUN_DIR_VAR).map_or_else(|| self.model_dir().join("run"), PathBuf::from)
    }

    #[must_use]
    pub fn image_version(&self) -> Option<&str> {
        self.get(IMAGE_VERSION_VAR)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_env_var_names() {
        assert_eq!(channel_env_var(CHANNEL_TRAIN), "SM_CHANNEL_TRAIN");
        assert_eq!(channel_env_var(CHANNEL_TEST), "SM_CHANNEL_TEST");
        assert_eq!(channel_env_var(CHANNEL_MODEL), "SM_CHANNEL_MODEL");
    }

    #[test]
    fn test_data_channels_require_both() {
        let env = ContainerEnvironment::from_vars([("SM_CHANNEL_TRAIN", "/data/train")]);
        assert!(matches!(env.data_channels(), Err(TrainingError::Configuration(_))));

        let env = ContainerEnvironment::from_vars([
            ("SM_CHANNEL_TRAIN", "/data/train"),
            ("SM_CHANNEL_TEST", "/data/test"),
        ]);
        let (train, test) = env.data_channels().unwrap();
        assert_eq!(train, PathBuf::from("/data/train"));
        assert_eq!(test, PathBuf::from("/data/test"));
    }

    #[test]
    fn test_run_dir_defaults_under_model_dir() {
        let env = ContainerEnvironment::from_vars([("SM_MODEL_DIR", "/out")]);
        assert_eq!(env.run_dir(), PathBuf::from("/out/run"));

        let env = ContainerEnvironment::from_vars([("RUN_DIR", "/runs/7")]);
        assert_eq!(env.run_dir(), PathBuf::from("/runs/7"));
        assert_eq!(env.model_dir(), PathBuf::from("/opt/ml/model"));
    }

    #[test]
    fn test_blank_values_are_unset() {
        let env = ContainerEnvironment::from_vars([("SM_CHANNEL_MODEL", "  ")]);
        assert!(env.model_channel().is_none());
    }
}
