//! One-time preparation of the quickstart distribution.
//!
//! A plain quickstart jar is used as is. An SDK zip is extracted once into the
//! shared dist directory; the extraction is keyed by the zip's checksum so a
//! replaced SDK file is picked up on the next run.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use walkdir::WalkDir;

use super::LocalOpts;
use crate::archive::extract_zip;
use crate::error::{AppError, Result};
use crate::lock::Lock;
use crate::paths;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SdkLock {
    source: String,
    checksum: String,
}

fn file_checksum(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path)
        .map_err(|e| AppError::io(format!("failed to open {}: {e}", path.display())))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

fn sdk_lock(opts: &LocalOpts) -> Result<Lock<SdkLock>> {
    Ok(Lock::new(
        paths::sdk_lock_path(&opts.unpack_dir),
        SdkLock {
            source: opts.dist_file.display().to_string(),
            checksum: file_checksum(&opts.dist_file)?,
        },
    ))
}

/// Extract the SDK if needed. Returns whether anything changed on disk.
pub fn prepare_distribution(opts: &LocalOpts) -> Result<bool> {
    if !opts.is_sdk() {
        return Ok(false);
    }
    if !opts.dist_file.is_file() {
        return Err(AppError::missing_artifact("distribution", &opts.dist_file));
    }

    let lock = sdk_lock(opts)?;
    if lock.is_up_to_date()? {
        log::debug!("SDK {} already extracted", opts.dist_file.display());
        return Ok(false);
    }

    let sdk_dir = paths::sdk_dir(&opts.unpack_dir);
    if sdk_dir.exists() {
        fs::remove_dir_all(&sdk_dir)
            .map_err(|e| AppError::io(format!("Failed to clean SDK dir: {}", e)))?;
    }
    log::info!(
        "Extracting SDK {} to {}",
        opts.dist_file.display(),
        sdk_dir.display()
    );
    extract_zip(&opts.dist_file, &sdk_dir)?;
    find_quickstart_jar(&sdk_dir)?;

    lock.lock()?;
    Ok(true)
}

/// Quickstart jar to unpack instances from.
pub fn quickstart_jar(opts: &LocalOpts) -> Result<PathBuf> {
    if opts.is_sdk() {
        find_quickstart_jar(&paths::sdk_dir(&opts.unpack_dir))
    } else {
        Ok(opts.dist_file.clone())
    }
}

fn find_quickstart_jar(sdk_dir: &Path) -> Result<PathBuf> {
    for entry in WalkDir::new(sdk_dir).sort_by_file_name() {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_ascii_lowercase();
        if entry.file_type().is_file() && name.contains("quickstart") && name.ends_with(".jar") {
            return Ok(entry.into_path());
        }
    }
    Err(AppError::missing_artifact("quickstart jar", sdk_dir))
}
