use crate::error::{TrainingError, TrainingResult};
use std::path::{Path, PathBuf};

/// Filesystem layout inside the training container.
///
/// Default layout is under `/opt/ml/code/...`
#[derive(Debug, Clone)]
pub struct ContainerLayout {
    code_dir: PathBuf,
}

impl ContainerLayout {
    pub const DEFAULT_CODE_DIR: &'static str = "/opt/ml/code";

    #[must_use]
    pub fn new(code_dir: PathBuf) -> Self {
        Self { code_dir }
    }

    #[must_use]
    pub fn code_dir(&self) -> &Path {
        &self.code_dir
    }

    /// Trainer config read by the training entry point.
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.code_dir.join("config.yaml")
    }

    /// Canonical directory for staged train/eval records.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.code_dir.join("data")
    }

    /// Root under which model archives are unpacked.
    #[must_use]
    pub fn model_extract_root(&self) -> PathBuf {
        self.code_dir.join("model")
    }

    pub fn ensure_dirs(&self) -> TrainingResult<()> {
        for dir in [self.data_dir(), self.model_extract_root()] {
            std::fs::create_dir_all(&dir).map_err(|e| TrainingError::io(&dir, e))?;
        }
        Ok(())
    }
}

impl Default for ContainerLayout {
    fn default() -> Self {
        Self::new(PathBuf::from(Self::DEFAULT_CODE_DIR))
    }
}
