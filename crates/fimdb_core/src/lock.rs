//! Single-process guard for an on-disk database.

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Exclusive advisory lock on `<db>.lock`, held until dropped.
#[derive(Debug)]
pub struct DbLock {
    path: PathBuf,
    _file: File,
}

impl DbLock {
    /// Returns the lock file path used for the database at `db_path`.
    #[must_use]
    pub fn lock_path(db_path: &Path) -> PathBuf {
        let mut name = db_path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Takes the lock for the database at `db_path` without blocking.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseLocked` if another handle holds it, or an I/O error
    /// if the lock file cannot be created.
    pub fn acquire(db_path: &Path) -> CoreResult<Self> {
        let path = Self::lock_path(db_path);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        if file.try_lock_exclusive().is_err() {
            return Err(CoreError::DatabaseLocked {
                path: db_path.display().to_string(),
            });
        }
        Ok(Self { path, _file: file })
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}
