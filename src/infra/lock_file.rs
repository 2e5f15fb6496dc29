// ============================================================
// Layer 6 — Process Lock File
// ============================================================
// An advisory lock on a file inside the data directory, shared
// by every process that opens the same directory (the `schedule`
// daemon, a one-off `train`, an embedding service).
//
// Why a file lock on top of the Trainer's in-process flag?
//   The flag only sees callers in the same process. Two CLI
//   invocations each have their own flag, and would otherwise
//   both snapshot, fit and publish at the same time.
//
// The lock is released when the holder returns, or by the OS
// if the process dies, so a crash never leaves it stuck.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::domain::error::LifecycleResult;

/// Exclusive, non-blocking, cross-process lock.
#[derive(Debug)]
pub struct LockFile {
    path: PathBuf,
    file: Mutex<fd_lock::RwLock<File>>,
}

impl LockFile {
    /// Open (creating if needed) the lock file at `path`. Does not lock.
    pub fn open(path: impl Into<PathBuf>) -> LifecycleResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).write(true).truncate(false).open(&path)?;
        Ok(Self { path, file: Mutex::new(fd_lock::RwLock::new(file)) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` while holding the lock.
    ///
    /// Returns `Ok(None)` without calling `f` if another holder has it.
    pub fn try_with<R>(&self, f: impl FnOnce() -> R) -> LifecycleResult<Option<R>> {
        let mut file = self.file.lock();
        let guard = match file.try_write() {
            Ok(guard) => guard,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                tracing::debug!("Lock '{}' is held elsewhere", self.path.display());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let out = f();
        drop(guard);
        Ok(Some(out))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_handle_is_refused_while_held() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("training.lock");
        let a    = LockFile::open(&path).unwrap();
        let b    = LockFile::open(&path).unwrap();

        let inner = a.try_with(|| b.try_with(|| "b ran").unwrap()).unwrap();
        assert_eq!(inner, Some(None));

        // Released once the holder returns
        assert_eq!(b.try_with(|| 7).unwrap(), Some(7));
    }
}
