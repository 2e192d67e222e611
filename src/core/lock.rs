//! core::lock
//!
//! Exclusive lock on a state file.
//!
//! # Architecture
//!
//! A file-backed store may be opened by several processes. The lock makes
//! sure only one of them holds the state for writing at a time, which is
//! how transactions from different processes are serialized.
//!
//! The lock lives next to the state file as `<state>.lock` and uses an
//! OS-level exclusive lock via `fs2`.
//!
//! # Invariants
//!
//! - The lock must be held for as long as the store may persist
//! - The lock is released on drop (RAII)
//! - Acquisition is non-blocking and fails fast if already held

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;

/// Errors from locking operations.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another process already holds the lock.
    #[error("state file is locked by another process: {0}")]
    AlreadyLocked(PathBuf),

    /// Failed to create lock file or directory.
    #[error("failed to create lock: {0}")]
    CreateFailed(String),

    /// Failed to acquire the OS lock.
    #[error("failed to acquire lock: {0}")]
    AcquireFailed(String),

    /// Failed to release the lock.
    #[error("failed to release lock: {0}")]
    ReleaseFailed(String),
}

/// An exclusive lock guarding one state file.
#[derive(Debug)]
pub struct StateLock {
    /// Path to the lock file.
    path: PathBuf,
    /// Open handle holding the lock; `None` once released.
    file: Option<File>,
}

impl StateLock {
    /// Lock file path for a state file.
    ///
    /// ```
    /// use std::path::Path;
    /// use infragraph::core::lock::StateLock;
    ///
    /// let lock = StateLock::lock_path_for(Path::new("/srv/state.json"));
    /// assert_eq!(lock, Path::new("/srv/state.json.lock"));
    /// ```
    pub fn lock_path_for(state_path: &Path) -> PathBuf {
        let mut name = state_path.as_os_str().to_os_string();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Acquire the lock for a state file.
    ///
    /// # Errors
    ///
    /// - [`LockError::AlreadyLocked`] if another handle holds the lock
    /// - [`LockError::CreateFailed`] if the lock file cannot be created
    /// - [`LockError::AcquireFailed`] if the OS lock cannot be acquired
    pub fn acquire(state_path: &Path) -> Result<Self, LockError> {
        if let Some(parent) = state_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    LockError::CreateFailed(format!("cannot create {}: {}", parent.display(), e))
                })?;
            }
        }

        let path = Self::lock_path_for(state_path);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| {
                LockError::CreateFailed(format!("cannot open {}: {}", path.display(), e))
            })?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self {
                path,
                file: Some(file),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                Err(LockError::AlreadyLocked(path))
            }
            Err(e) => Err(LockError::AcquireFailed(e.to_string())),
        }
    }

    /// Check if the lock is currently held.
    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    /// Get the path to the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock explicitly.
    pub fn release(&mut self) -> Result<(), LockError> {
        if let Some(file) = self.file.take() {
            file.unlock()
                .map_err(|e| LockError::ReleaseFailed(e.to_string()))?;
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = file.unlock();
        }
    }
}
