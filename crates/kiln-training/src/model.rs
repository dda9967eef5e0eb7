//! Resolution of the model channel into a local path usable by the trainer.

use crate::archive::{ArchiveExtractor, ExtractionResult};
use crate::environment::CHANNEL_MODEL;
use crate::error::{TrainingError, TrainingResult};
use std::path::{Path, PathBuf};
use tracing::info;

const WEIGHT_EXTENSION: &str = "safetensors";
const ARCHIVE_SUFFIXES: [&str; 3] = [".tar.gz", ".tgz", ".tar"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedModel {
    /// Channel already holds unpacked weights.
    Directory(PathBuf),
    /// Channel held an archive that was extracted.
    Extracted(ExtractionResult),
}

impl ResolvedModel {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Directory(path) => path,
            Self::Extracted(result) => &result.path,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModelResolver {
    extractor: ArchiveExtractor,
}

impl ModelResolver {
    #[must_use]
    pub fn new(extractor: ArchiveExtractor) -> Self {
        Self { extractor }
    }

    pub fn resolve(&self, channel_dir: &Path, extract_root: &Path) -> TrainingResult<ResolvedModel> {
        let entries = sorted_files(channel_dir)?;

        if entries.iter().any(|p| has_extension(p, WEIGHT_EXTENSION)) {
            info!(model = %channel_dir.display(), "Using unpacked model weights");
            return Ok(ResolvedModel::Directory(channel_dir.to_path_buf()));
        }

        let archive = entries.iter().find(|p| {
            let name = p.file_name().map(|n| n.to_string_lossy().to_lowercase()).unwrap_or_default();
            ARCHIVE_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
        });

        match archive {
            Some(archive) => {
                info!(archive = %archive.display(), "Found model archive");
                Ok(ResolvedModel::Extracted(self.extractor.extract(archive, extract_root)?))
            }
            None => Err(TrainingError::MissingData {
                channel: CHANNEL_MODEL.to_string(),
                location: channel_dir.display().to_string(),
            }),
        }
    }
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension().and_then(|e| e.to_str()).is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

fn sorted_files(dir: &Path) -> TrainingResult<Vec<PathBuf>> {
    let read = std::fs::read_dir(dir).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => TrainingError::MissingData {
            channel: CHANNEL_MODEL.to_string(),
            location: dir.display().to_string(),
        },
        _ => TrainingError::io(dir, e),
    })?;

    let mut files = Vec::new();
    for entry in read {
        let path = entry.map_err(|e| TrainingError::io(dir, e))?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ExtractionStrategy;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempfile::TempDir;

    #[test]
    fn test_safetensors_directory_used_directly() {
        let temp = TempDir::new().unwrap();
        let channel = temp.path().join("model");
        std::fs::create_dir_all(&channel).unwrap();
        std::fs::write(channel.join("consolidated.safetensors"), b"w").unwrap();
        std::fs::write(channel.join("model.tar.gz"), b"ignored").unwrap();

        let resolved = ModelResolver::default().resolve(&channel, &temp.path().join("x")).unwrap();
        assert_eq!(resolved, ResolvedModel::Directory(channel));
    }

    #[test]
    fn test_archive_is_extracted() {
        let temp = TempDir::new().unwrap();
        let channel = temp.path().join("model");
        std::fs::create_dir_all(&channel).unwrap();

        let file = std::fs::File::create(channel.join("model.tar.gz")).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::fast()));
        let data = b"weights";
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, "mistral-7b/consolidated.safetensors", &data[..]).unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let root = temp.path().join("extracted");
        let resolved = ModelResolver::default().resolve(&channel, &root).unwrap();
        assert_eq!(resolved.path(), root.join("mistral-7b"));
        match resolved {
            ResolvedModel::Extracted(result) => assert_eq!(result.strategy, ExtractionStrategy::GzipTar),
            other => panic!("unexpected resolution: {other:?}"),
        }
    }

    #[test]
    fn test_empty_channel_is_missing_data() {
        let temp = TempDir::new().unwrap();
        let err = ModelResolver::default().resolve(temp.path(), &temp.path().join("x")).unwrap_err();
        assert!(matches!(err, TrainingError::MissingData { ref channel, .. } if channel == "model"));

        let err = ModelResolver::default()
            .resolve(&temp.path().join("absent"), &temp.path().join("x"))
            .unwrap_err();
        assert!(matches!(err, TrainingError::MissingData { .. }));
    }
}
