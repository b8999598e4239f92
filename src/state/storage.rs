// File system operations for app data and exported files
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to get app data directory")]
    NoAppDataDir,
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Get the app data directory for chunkseq
pub fn get_app_data_dir() -> StorageResult<PathBuf> {
    let data_dir = dirs::data_dir().ok_or(StorageError::NoAppDataDir)?;
    let app_dir = data_dir.join("com.chunkseq.app");
    fs::create_dir_all(&app_dir)?;
    Ok(app_dir)
}

/// Default directory for exported files (user download dir, else app data)
pub fn get_exports_dir() -> StorageResult<PathBuf> {
    if let Some(downloads) = dirs::download_dir() {
        if downloads.is_dir() {
            return Ok(downloads);
        }
    }
    let exports = get_app_data_dir()?.join("exports");
    fs::create_dir_all(&exports)?;
    Ok(exports)
}

/// Write a file via a temporary sibling and rename, returning its path and SHA256 hash
///
/// The final path never holds a partially written file.
pub fn write_file_atomic(dir: &Path, filename: &str, data: &[u8]) -> StorageResult<(PathBuf, String)> {
    let file_path = dir.join(filename);
    let temp_path = dir.join(format!(".{}.part", filename));

    let result = (|| {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        fs::rename(&temp_path, &file_path)
    })();
    if let Err(e) = result {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }

    Ok((file_path, calculate_sha256(data)))
}

/// Calculate SHA256 hash of data
pub fn calculate_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
