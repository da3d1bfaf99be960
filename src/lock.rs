//! File-persisted idempotency tokens.
//!
//! A [`Lock`] pairs a path with the data computed from live inputs. The lock is
//! up to date when the file exists and decodes to exactly that data. There is
//! no cross-process locking; one CLI process owns a given path.

use std::fs;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{AppError, Result};

#[derive(Debug, Clone)]
pub struct Lock<T> {
    path: PathBuf,
    current: T,
}

impl<T> Lock<T>
where
    T: Serialize + DeserializeOwned + PartialEq,
{
    pub fn new(path: impl Into<PathBuf>, current: T) -> Self {
        Self {
            path: path.into(),
            current,
        }
    }

    /// Persist the current data, replacing whatever was locked before.
    pub fn lock(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| AppError::lock(&self.path, e.to_string()))?;
        }
        let content = serde_yaml::to_string(&self.current)
            .map_err(|e| AppError::lock(&self.path, e.to_string()))?;

        let tmp = self.path.with_extension("yml.tmp");
        fs::write(&tmp, content).map_err(|e| AppError::lock(&tmp, e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| AppError::lock(&self.path, e.to_string()))
    }

    pub fn unlock(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::lock(&self.path, e.to_string())),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.path.is_file()
    }

    pub fn data_locked(&self) -> Result<T> {
        if !self.is_locked() {
            return Err(AppError::lock(&self.path, "lock file does not exist"));
        }
        let content =
            fs::read_to_string(&self.path).map_err(|e| AppError::lock(&self.path, e.to_string()))?;
        serde_yaml::from_str(&content).map_err(|e| {
            AppError::lock(&self.path, format!("cannot decode lock data: {e}"))
        })
    }

    pub fn is_up_to_date(&self) -> Result<bool> {
        if !self.is_locked() {
            return Ok(false);
        }
        Ok(self.data_locked()? == self.current)
    }
}
