// Error types for job orchestration

use thiserror::Error;

/// Result type for orchestration operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

/// Orchestration errors
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// Invalid launcher config or channel manifest
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A declared input does not exist in object storage
    #[error("Missing data for channel '{channel}': {uri}")]
    MissingData {
        /// Channel role
        channel: String,
        /// Offending location
        uri: String,
    },

    /// A declared input exists but cannot be read
    #[error("Access denied for channel '{channel}': {uri}")]
    Permission {
        /// Channel role
        channel: String,
        /// Offending location
        uri: String,
    },

    /// Scheduler, storage or metrics backend failed in a way that may recover
    #[error("Service error during {operation}: {message}")]
    TransientService {
        /// Remote operation that failed
        operation: String,
        /// Backend message
        message: String,
    },

    /// Status change that would move a job backwards
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        /// Current status
        from: String,
        /// Rejected status
        to: String,
    },

    /// Job reached a terminal status other than Completed
    #[error("Job '{name}' ended with status {status}{}", .reason.as_ref().map(|r| format!(": {r}")).unwrap_or_default())]
    JobFailed {
        /// Job name
        name: String,
        /// Terminal status
        status: String,
        /// Failure reason reported by the scheduler
        reason: Option<String>,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl OrchestrationError {
    pub(crate) fn transient(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TransientService { operation: operation.into(), message: message.into() }
    }

    /// Process exit code to report when this error ends the run.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) | Self::Yaml(_) | Self::Toml(_) => 2,
            Self::MissingData { .. } => 3,
            Self::Permission { .. } => 4,
            Self::TransientService { .. } => 6,
            Self::JobFailed { .. } => 7,
            Self::InvalidTransition { .. } | Self::Io(_) => 1,
        }
    }
}
