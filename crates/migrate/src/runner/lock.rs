//! Advisory lock serializing build-or-reuse decisions on one cache directory

use fs4::fs_std::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::MigrateResult;

const LOCK_FILE: &str = ".lock";

/// Exclusive lock on `<cache_dir>/.lock`, released on drop
#[derive(Debug)]
pub struct CacheLock {
    file: File,
    path: PathBuf,
}

impl CacheLock {
    /// Block until the lock is held
    pub fn acquire(cache_dir: &Path) -> MigrateResult<Self> {
        fs::create_dir_all(cache_dir)?;
        let path = cache_dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)?;

        tracing::debug!(lock = %path.display(), "waiting for cache lock");
        FileExt::lock_exclusive(&file)?;
        tracing::debug!(lock = %path.display(), "cache lock acquired");

        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(lock = %self.path.display(), "failed to release cache lock: {}", e);
        }
    }
}
