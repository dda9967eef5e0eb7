//! Data-channel manifest.
//!
//! A manifest maps channel roles to input locations:
//!
//! ```yaml
//! train: s3://bucket/data/train.jsonl
//! test: s3://bucket/data/eval.jsonl
//! model: s3://bucket/models/mistral-7b.tar.gz
//! ```

use crate::error::{OrchestrationError, Result};
use crate::storage::S3Uri;
use kiln_training::{CHANNEL_MODEL, CHANNEL_TEST, CHANNEL_TRAIN};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Channels every job needs.
pub const REQUIRED_CHANNELS: [&str; 2] = [CHANNEL_TRAIN, CHANNEL_TEST];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelSource {
    Remote(S3Uri),
    Local(PathBuf),
}

impl ChannelSource {
    pub fn parse(location: &str) -> Result<Self> {
        if S3Uri::is_s3(location) {
            return Ok(Self::Remote(S3Uri::parse(location)?));
        }
        let path = location.strip_prefix("file://").unwrap_or(location);
        Ok(Self::Local(PathBuf::from(path)))
    }
}

impl fmt::Display for ChannelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote(uri) => uri.fmt(f),
            Self::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataChannel {
    pub name: String,
    pub source: ChannelSource,
}

/// Channels for one run, keyed by role.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelSet {
    channels: BTreeMap<String, ChannelSource>,
}

impl ChannelSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_channel(mut self, name: impl Into<String>, source: ChannelSource) -> Self {
        self.channels.insert(name.into(), source);
        self
    }

    /// Load a YAML manifest and check that the required channels are declared.
    pub fn load_manifest(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            OrchestrationError::Configuration(format!("cannot read channel manifest {}: {e}", path.display()))
        })?;

        let value: serde_yaml::Value = serde_yaml::from_str(&content)?;
        let mapping = value.as_mapping().ok_or_else(|| {
            OrchestrationError::Configuration(format!("channel manifest {} is not a mapping", path.display()))
        })?;

        let mut set = Self::new();
        for (key, value) in mapping {
            let (Some(name), Some(location)) = (key.as_str(), value.as_str()) else {
                return Err(OrchestrationError::Configuration(format!(
                    "channel manifest {} must map names to location strings",
                    path.display()
                )));
            };
            set.channels.insert(name.to_string(), ChannelSource::parse(location)?);
        }

        set.check_required()?;
        Ok(set)
    }

    /// Fails on the first required channel that is not declared.
    pub fn check_required(&self) -> Result<()> {
        for name in REQUIRED_CHANNELS {
            if !self.channels.contains_key(name) {
                return Err(OrchestrationError::Configuration(format!("required channel '{name}' is not declared")));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ChannelSource> {
        self.channels.get(name)
    }

    #[must_use]
    pub fn model(&self) -> Option<&ChannelSource> {
        self.get(CHANNEL_MODEL)
    }

    pub fn iter(&self) -> impl Iterator<Item = DataChannel> + '_ {
        self.channels
            .iter()
            .map(|(name, source)| DataChannel { name: name.clone(), source: source.clone() })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
