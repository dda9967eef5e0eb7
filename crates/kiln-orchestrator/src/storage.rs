//! Object-storage collaborator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::error::OrchestrationError;

const SCHEME: &str = "s3://";

/// Location of an object as `s3://bucket/key`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct S3Uri {
    pub bucket: String,
    pub key: String,
}

impl S3Uri {
    /// Parse `s3://bucket/key`. The key may be empty (bucket root).
    pub fn parse(uri: &str) -> Result<Self, OrchestrationError> {
        let rest = uri
            .strip_prefix(SCHEME)
            .ok_or_else(|| OrchestrationError::Configuration(format!("not an s3 URI: {uri}")))?;
        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(OrchestrationError::Configuration(format!("s3 URI has no bucket: {uri}")));
        }
        Ok(Self { bucket: bucket.to_string(), key: key.to_string() })
    }

    #[must_use]
    pub fn is_s3(uri: &str) -> bool {
        uri.starts_with(SCHEME)
    }
}

impl FromStr for S3Uri {
    type Err = OrchestrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for S3Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}{}/{}", self.bucket, self.key)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub content_length: Option<u64>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("object not found")]
    NotFound,

    #[error("access denied")]
    AccessDenied,

    #[error("{code}: {message}")]
    Service { code: String, message: String },
}

/// Existence and metadata checks against object storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn head_object(&self, uri: &S3Uri) -> Result<ObjectMetadata, StorageError>;
}
