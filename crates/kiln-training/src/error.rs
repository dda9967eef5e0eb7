use std::path::PathBuf;
use thiserror::Error;

pub type TrainingResult<T> = std::result::Result<T, TrainingError>;

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("no input data for channel '{channel}' at {location}")]
    MissingData { channel: String, location: String },

    #[error("path not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("archive member '{member}' escapes extraction root {}", .root.display())]
    PathTraversal { member: String, root: PathBuf },

    #[error("training process exited with code {exit_code}")]
    TrainingExecution { exit_code: i32, stdout: String, stderr: String },

    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl TrainingError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    /// Process exit code to report when this error ends the run.
    ///
    /// A failed training process propagates its own exit code.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) | Self::Yaml(_) => 2,
            Self::MissingData { .. } | Self::NotFound(_) => 3,
            Self::PathTraversal { .. } => 5,
            Self::TrainingExecution { exit_code, .. } if *exit_code > 0 => *exit_code,
            Self::TrainingExecution { .. } | Self::Io { .. } => 1,
        }
    }
}
