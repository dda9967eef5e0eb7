//! Staging of train/eval records into the canonical data directory.

use crate::digest::sha256_file;
use crate::environment::{CHANNEL_TEST, CHANNEL_TRAIN};
use crate::error::{TrainingError, TrainingResult};
use serde::{Deserialize, Serialize};
use std::fs::FileTimes;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Record format accepted by the trainer.
pub const RECORD_EXTENSION: &str = "jsonl";

pub const TRAIN_FILE: &str = "train.jsonl";
pub const EVAL_FILE: &str = "eval.jsonl";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedFile {
    pub source: PathBuf,
    pub path: PathBuf,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedInputs {
    pub train: StagedFile,
    pub eval: StagedFile,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InputStager;

impl InputStager {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Copy the first record file of each source into `dest_dir` under canonical names.
    ///
    /// Re-running with the same inputs overwrites the previous copies.
    pub fn stage(&self, train_source: &Path, eval_source: &Path, dest_dir: &Path) -> TrainingResult<StagedInputs> {
        if train_source.as_os_str().is_empty() || eval_source.as_os_str().is_empty() {
            return Err(TrainingError::Configuration(
                "both train and eval sources are required".to_string(),
            ));
        }

        let train_files = list_records(CHANNEL_TRAIN, train_source)?;
        let eval_files = list_records(CHANNEL_TEST, eval_source)?;
        info!(train = ?train_files, eval = ?eval_files, "Found record files");

        std::fs::create_dir_all(dest_dir).map_err(|e| TrainingError::io(dest_dir, e))?;

        let train = stage_file(&train_files[0], &dest_dir.join(TRAIN_FILE))?;
        let eval = stage_file(&eval_files[0], &dest_dir.join(EVAL_FILE))?;
        info!(dest = %dest_dir.display(), "Data files staged");

        Ok(StagedInputs { train, eval })
    }
}

/// Sorted record files in `source`; a source that is itself a record file is used directly.
fn list_records(channel: &str, source: &Path) -> TrainingResult<Vec<PathBuf>> {
    let missing = || TrainingError::MissingData {
        channel: channel.to_string(),
        location: source.display().to_string(),
    };

    if source.is_file() {
        let is_record = source.extension().and_then(|e| e.to_str()) == Some(RECORD_EXTENSION);
        return if is_record { Ok(vec![source.to_path_buf()]) } else { Err(missing()) };
    }

    let dir = glob::Pattern::escape(&source.to_string_lossy());
    let pattern = format!("{}/*.{RECORD_EXTENSION}", dir.trim_end_matches('/'));
    let mut files: Vec<PathBuf> = glob::glob(&pattern)
        .map_err(|e| TrainingError::Configuration(format!("invalid {channel} source {}: {e}", source.display())))?
        .filter_map(Result::ok)
        .filter(|p| p.is_file())
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(missing());
    }
    Ok(files)
}

/// Copy through a temp file in the destination directory, then rename over `dest`.
fn stage_file(source: &Path, dest: &Path) -> TrainingResult<StagedFile> {
    let dir = dest.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::Builder::new()
        .prefix(".staging-")
        .tempfile_in(dir)
        .map_err(|e| TrainingError::io(dir, e))?;

    let mut reader = std::fs::File::open(source).map_err(|e| TrainingError::io(source, e))?;
    std::io::copy(&mut reader, tmp.as_file_mut()).map_err(|e| TrainingError::io(dest, e))?;

    let metadata = reader.metadata().map_err(|e| TrainingError::io(source, e))?;
    let mut times = FileTimes::new();
    if let Ok(modified) = metadata.modified() {
        times = times.set_modified(modified);
    }
    if let Ok(accessed) = metadata.accessed() {
        times = times.set_accessed(accessed);
    }
    let file = tmp.as_file();
    file.set_times(times).map_err(|e| TrainingError::io(dest, e))?;
    file.set_permissions(metadata.permissions()).map_err(|e| TrainingError::io(dest, e))?;
    file.sync_all().map_err(|e| TrainingError::io(dest, e))?;

    // Dropping the temp file on any error above removes it.
    tmp.persist(dest).map_err(|e| TrainingError::io(dest, e.error))?;

    let sha256 = sha256_file(dest)?;
    debug!(source = %source.display(), dest = %dest.display(), sha256 = %sha256, "Staged file");
    Ok(StagedFile { source: source.to_path_buf(), path: dest.to_path_buf(), sha256 })
}
