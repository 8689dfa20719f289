// src/utils/fs.rs

//! Filesystem helpers shared by the file-backed stores.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Append a suffix to a path without touching its extension.
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Write bytes atomically (write to temp, then rename).
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    write_then_rename(&with_suffix(path, ".tmp"), path, bytes).await
}

/// Like [`write_atomic`], but stages the temp file under `tmp_dir`.
///
/// `tmp_dir` must be on the same filesystem as `path`.
pub async fn write_atomic_in(tmp_dir: &Path, path: &Path, bytes: &[u8]) -> Result<()> {
    tokio::fs::create_dir_all(tmp_dir).await?;
    let tmp = tmp_dir.join(format!("{}.tmp", Uuid::new_v4().simple()));
    let result = write_then_rename(&tmp, path, bytes).await;
    if result.is_err() {
        let _ = remove_if_exists(&tmp).await;
    }
    result
}

async fn write_then_rename(tmp: &Path, path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut file = tokio::fs::File::create(tmp).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    drop(file);

    tokio::fs::rename(tmp, path).await?;
    Ok(())
}

/// Read bytes, returning None if the file doesn't exist.
pub async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(AppError::Io(e)),
    }
}

/// Remove a file, treating absence as success.
pub async fn remove_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(AppError::Io(e)),
    }
}

/// Write a value as pretty JSON, atomically.
pub async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &bytes).await
}

/// Read a JSON value, `None` if the file doesn't exist.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match read_optional(path).await? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}
