//! Trainer configuration materialization.
//!
//! The base config ships with the image; runtime values (resolved model path,
//! run directory) are written over it right before launch.

use crate::error::{TrainingError, TrainingResult};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const MODEL_ID_OR_PATH: &str = "model_id_or_path";
pub const DATA: &str = "data";
pub const RUN_DIR: &str = "run_dir";

/// Keys that must be present in the final document.
pub const REQUIRED_KEYS: [&str; 2] = [MODEL_ID_OR_PATH, DATA];

/// Trainer config as a flat YAML mapping; nested values are passed through untouched.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrainingConfig {
    document: Mapping,
}

impl TrainingConfig {
    pub fn load(path: &Path) -> TrainingResult<Self> {
        if !path.is_file() {
            return Err(TrainingError::Configuration(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        let contents = std::fs::read_to_string(path).map_err(|e| TrainingError::io(path, e))?;
        Self::parse(&contents)
            .map_err(|e| TrainingError::Configuration(format!("{}: {e}", path.display())))
    }

    fn parse(contents: &str) -> Result<Self, String> {
        match serde_yaml::from_str::<Value>(contents) {
            Ok(Value::Mapping(document)) => Ok(Self { document }),
            Ok(_) => Err("expected a key-value document".to_string()),
            Err(e) => Err(e.to_string()),
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.document.get(key)
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.document.insert(Value::String(key.to_string()), value);
    }

    /// Required keys that are absent, null, or blank strings.
    #[must_use]
    pub fn missing_required(&self) -> Vec<&'static str> {
        REQUIRED_KEYS
            .into_iter()
            .filter(|key| match self.get(key) {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.trim().is_empty(),
                Some(_) => false,
            })
            .collect()
    }

    pub fn validate(&self) -> TrainingResult<()> {
        let missing = self.missing_required();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(TrainingError::Configuration(format!(
                "missing required config keys: {}",
                missing.join(", ")
            )))
        }
    }

    pub fn save(&self, path: &Path) -> TrainingResult<()> {
        let contents = serde_yaml::to_string(&self.document)?;
        std::fs::write(path, contents).map_err(|e| TrainingError::io(path, e))
    }
}

/// Runtime overrides; each key replaces the base value wholesale.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    values: BTreeMap<String, Value>,
}

impl ConfigOverrides {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn model_id_or_path(self, model: impl AsRef<Path>) -> Self {
        let model = model.as_ref().to_string_lossy().to_string();
        self.set(MODEL_ID_OR_PATH, model)
    }

    #[must_use]
    pub fn run_dir(self, run_dir: impl AsRef<Path>) -> Self {
        let run_dir = run_dir.as_ref().to_string_lossy().to_string();
        self.set(RUN_DIR, run_dir)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn apply(&self, config: &mut TrainingConfig) {
        for (key, value) in &self.values {
            config.set(key, value.clone());
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigMaterializer {
    output: Option<PathBuf>,
}

impl ConfigMaterializer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Write the merged document somewhere other than the base path.
    #[must_use]
    pub fn with_output(mut self, output: PathBuf) -> Self {
        self.output = Some(output);
        self
    }

    /// Merge `overrides` into the base config, validate, and persist it.
    ///
    /// Not safe to run concurrently against the same output path.
    pub fn materialize(&self, base_config: &Path, overrides: &ConfigOverrides) -> TrainingResult<PathBuf> {
        let mut config = TrainingConfig::load(base_config)?;
        overrides.apply(&mut config);
        config.validate()?;

        let output = self.output.clone().unwrap_or_else(|| base_config.to_path_buf());
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| TrainingError::io(parent, e))?;
        }
        config.save(&output)?;

        debug!(?overrides, "Applied config overrides");
        info!(config = %output.display(), "Training config materialized");
        Ok(output)
    }
}
