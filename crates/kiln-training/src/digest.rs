use crate::error::{TrainingError, TrainingResult};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// Hex-encoded SHA-256 of a file's contents.
pub fn sha256_file(path: &Path) -> TrainingResult<String> {
    let mut file = std::fs::File::open(path).map_err(|e| TrainingError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(|e| TrainingError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
