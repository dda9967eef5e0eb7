//! Safe extraction of model artifact archives.
//!
//! Format is sniffed from magic bytes. Extraction is attempted with an ordered
//! list of strategies: gzip-compressed tar, plain tar, then a raw byte copy that
//! treats the artifact as a single opaque file. Every tar member is resolved
//! against the extraction root before it is written.

use crate::error::{TrainingError, TrainingResult};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use tar::EntryType;
use tracing::{debug, info, warn};

/// File name used when the artifact is copied verbatim.
pub const RAW_ARTIFACT_FILE: &str = "model.bin";

const SNIFF_LEN: u64 = 512;
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const USTAR_OFFSET: usize = 257;
const USTAR_MAGIC: &[u8] = b"ustar";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Gzip,
    /// POSIX `ustar` signature present.
    Tar,
    /// No known signature. Old v7 tars carry none, so plain tar is still tried first.
    Unknown,
}

impl ArchiveFormat {
    #[must_use]
    pub fn sniff(prefix: &[u8]) -> Self {
        if prefix.starts_with(&GZIP_MAGIC) {
            Self::Gzip
        } else if prefix
            .get(USTAR_OFFSET..USTAR_OFFSET + USTAR_MAGIC.len())
            .is_some_and(|magic| magic == USTAR_MAGIC)
        {
            Self::Tar
        } else {
            Self::Unknown
        }
    }

    pub fn detect(path: &Path) -> TrainingResult<Self> {
        let file = File::open(path).map_err(|e| TrainingError::io(path, e))?;
        let mut prefix = Vec::with_capacity(SNIFF_LEN as usize);
        file.take(SNIFF_LEN)
            .read_to_end(&mut prefix)
            .map_err(|e| TrainingError::io(path, e))?;
        Ok(Self::sniff(&prefix))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStrategy {
    GzipTar,
    PlainTar,
    RawCopy,
}

impl ExtractionStrategy {
    fn first_for(format: ArchiveFormat) -> Self {
        match format {
            ArchiveFormat::Gzip => Self::GzipTar,
            ArchiveFormat::Tar | ArchiveFormat::Unknown => Self::PlainTar,
        }
    }
}

/// Outcome of a single strategy that did not hit a fatal error.
enum Attempt {
    Extracted,
    NotGzip,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionResult {
    /// Usable model content; always inside the extraction root.
    pub path: PathBuf,
    pub strategy: ExtractionStrategy,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveExtractor;

impl ArchiveExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Unpack `archive` under `dest_root`.
    ///
    /// Returns the single top-level entry when extraction produced exactly one,
    /// otherwise `dest_root` itself. Partially extracted content is left in place
    /// on failure.
    pub fn extract(&self, archive: &Path, dest_root: &Path) -> TrainingResult<ExtractionResult> {
        if !archive.exists() {
            return Err(TrainingError::NotFound(archive.to_path_buf()));
        }

        std::fs::create_dir_all(dest_root).map_err(|e| TrainingError::io(dest_root, e))?;
        let root = dest_root.canonicalize().map_err(|e| TrainingError::io(dest_root, e))?;

        let format = ArchiveFormat::detect(archive)?;
        info!(archive = %archive.display(), ?format, dest = %dest_root.display(), "Extracting model artifact");

        if format == ArchiveFormat::Unknown {
            debug!(archive = %archive.display(), "No archive signature, trying plain tar before a raw copy");
        }

        let mut strategy = ExtractionStrategy::first_for(format);
        loop {
            let attempt = match strategy {
                ExtractionStrategy::GzipTar => unpack_tar(GzDecoder::new(open(archive)?), &root)?,
                ExtractionStrategy::PlainTar => unpack_tar(open(archive)?, &root)?,
                ExtractionStrategy::RawCopy => {
                    raw_copy(archive, &root)?;
                    Attempt::Extracted
                }
            };

            match attempt {
                Attempt::Extracted => break,
                Attempt::NotGzip => {
                    debug!(archive = %archive.display(), "Not gzip-compressed, retrying as plain tar");
                    strategy = ExtractionStrategy::PlainTar;
                }
                Attempt::Failed(reason) => {
                    warn!(
                        archive = %archive.display(),
                        ?strategy,
                        reason = %reason,
                        "Unpack failed, copying artifact as a single file"
                    );
                    strategy = ExtractionStrategy::RawCopy;
                }
            }
        }

        let path = single_top_level_entry(dest_root)?.unwrap_or_else(|| dest_root.to_path_buf());
        info!(path = %path.display(), ?strategy, "Model artifact ready");
        Ok(ExtractionResult { path, strategy })
    }
}

fn open(path: &Path) -> TrainingResult<File> {
    File::open(path).map_err(|e| TrainingError::io(path, e))
}

fn is_not_gzip(err: &io::Error) -> bool {
    err.to_string().to_lowercase().contains("invalid gzip header")
}

fn classify(err: &io::Error) -> Attempt {
    if is_not_gzip(err) {
        Attempt::NotGzip
    } else {
        Attempt::Failed(err.to_string())
    }
}

fn unpack_tar<R: Read>(reader: R, root: &Path) -> TrainingResult<Attempt> {
    let mut archive = tar::Archive::new(reader);
    let entries = match archive.entries() {
        Ok(entries) => entries,
        Err(e) => return Ok(classify(&e)),
    };

    let mut members = 0usize;
    for entry in entries {
        let mut entry = match entry {
            Ok(entry) => entry,
            Err(e) => return Ok(classify(&e)),
        };
        let member = match entry.path() {
            Ok(path) => path.into_owned(),
            Err(e) => return Ok(classify(&e)),
        };
        let target = resolve_within(root, root, &member).ok_or_else(|| traversal(&member, root))?;
        let entry_type = entry.header().entry_type();

        match entry_type {
            EntryType::Directory => {
                ensure_on_disk_within(root, &target, &member)?;
                std::fs::create_dir_all(&target).map_err(|e| TrainingError::io(&target, e))?;
                ensure_on_disk_within(root, &target, &member)?;
            }
            EntryType::Symlink => {
                let link = match link_name(&entry, &member) {
                    Ok(link) => link,
                    Err(attempt) => return Ok(attempt),
                };
                // Relative to the directory the link actually lands in, not the member's lexical parent.
                let parent = prepare_parent(root, &target, &member)?;
                resolve_within(root, &parent, &link).ok_or_else(|| traversal(&link, root))?;
                ensure_on_disk_within(root, &parent.join(&link), &link)?;
                remove_existing(&target)?;
                if let Err(e) = entry.unpack(&target) {
                    return Ok(classify(&e));
                }
            }
            EntryType::Link => {
                let link = match link_name(&entry, &member) {
                    Ok(link) => link,
                    Err(attempt) => return Ok(attempt),
                };
                let lexical = resolve_within(root, root, &link).ok_or_else(|| traversal(&link, root))?;
                let source = lexical.canonicalize().map_err(|e| TrainingError::io(&lexical, e))?;
                if !source.starts_with(root) {
                    return Err(traversal(&link, root));
                }
                prepare_parent(root, &target, &member)?;
                remove_existing(&target)?;
                std::fs::hard_link(&source, &target).map_err(|e| TrainingError::io(&target, e))?;
            }
            EntryType::Regular | EntryType::Continuous | EntryType::GNUSparse => {
                prepare_parent(root, &target, &member)?;
                remove_existing(&target)?;
                if let Err(e) = entry.unpack(&target) {
                    return Ok(classify(&e));
                }
            }
            other => {
                debug!(member = %member.display(), entry_type = ?other, "Skipping unsupported archive member");
                continue;
            }
        }
        members += 1;
    }

    if members == 0 {
        return Ok(Attempt::Failed("archive contains no members".to_string()));
    }
    debug!(members, root = %root.display(), "Unpacked archive members");
    Ok(Attempt::Extracted)
}

fn traversal(member: &Path, root: &Path) -> TrainingError {
    TrainingError::PathTraversal { member: member.display().to_string(), root: root.to_path_buf() }
}

fn link_name<R: Read>(entry: &tar::Entry<'_, R>, member: &Path) -> Result<PathBuf, Attempt> {
    match entry.link_name() {
        Ok(Some(link)) => Ok(link.into_owned()),
        Ok(None) => Err(Attempt::Failed(format!("link without target: {}", member.display()))),
        Err(e) => Err(classify(&e)),
    }
}

/// Create the parent directory of `target` and return its real location.
///
/// Fails unless the parent, with every symlink followed, is `root` or below it.
fn prepare_parent(root: &Path, target: &Path, member: &Path) -> TrainingResult<PathBuf> {
    let parent = target.parent().unwrap_or(root);
    ensure_on_disk_within(root, parent, member)?;
    std::fs::create_dir_all(parent).map_err(|e| TrainingError::io(parent, e))?;
    let real = parent.canonicalize().map_err(|e| TrainingError::io(parent, e))?;
    if real.starts_with(root) { Ok(real) } else { Err(traversal(member, root)) }
}

/// Canonicalize the deepest existing ancestor of `path` and require it under `root`.
fn ensure_on_disk_within(root: &Path, path: &Path, member: &Path) -> TrainingResult<()> {
    let mut ancestor = path;
    loop {
        match ancestor.canonicalize() {
            Ok(real) if real.starts_with(root) => return Ok(()),
            Ok(_) => return Err(traversal(member, root)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                ancestor = ancestor.parent().ok_or_else(|| traversal(member, root))?;
            }
            Err(e) => return Err(TrainingError::io(ancestor, e)),
        }
    }
}

/// Unlink a file or symlink already at `target` so the write never follows it.
fn remove_existing(target: &Path) -> TrainingResult<()> {
    match target.symlink_metadata() {
        Ok(meta) if !meta.is_dir() => std::fs::remove_file(target).map_err(|e| TrainingError::io(target, e)),
        _ => Ok(()),
    }
}

/// Lexically resolve `relative` against `base`; `None` unless the result is `root` or below it.
///
/// Absolute paths are never accepted.
fn resolve_within(root: &Path, base: &Path, relative: &Path) -> Option<PathBuf> {
    let mut resolved = base.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => return None,
            Component::CurDir => {}
            Component::ParentDir => {
                if !resolved.pop() {
                    return None;
                }
            }
            Component::Normal(part) => resolved.push(part),
        }
    }
    resolved.starts_with(root).then_some(resolved)
}

fn raw_copy(archive: &Path, root: &Path) -> TrainingResult<()> {
    let target = root.join(RAW_ARTIFACT_FILE);
    std::fs::copy(archive, &target).map_err(|e| TrainingError::io(&target, e))?;
    Ok(())
}

fn single_top_level_entry(dir: &Path) -> TrainingResult<Option<PathBuf>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| TrainingError::io(dir, e))? {
        let entry = entry.map_err(|e| TrainingError::io(dir, e))?;
        names.push(entry.file_name());
        if names.len() > 1 {
            return Ok(None);
        }
    }
    Ok(names.pop().map(|name| dir.join(name)))
}
