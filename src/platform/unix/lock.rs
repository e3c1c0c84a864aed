//! Single-instance lock backed by an exclusive `flock` on a well-known file.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;

use fs2::FileExt;
use log::debug;

use crate::instance::InstanceError;

/// An exclusive, non-blocking advisory lock. The kernel drops it when the
/// file descriptor is closed, including on process death.
#[derive(Debug)]
pub struct RawLock {
    file: File,
    path: PathBuf,
}

pub fn lock_path(name: &str) -> PathBuf {
    super::rendezvous_dir().join(format!("{name}.lock"))
}

pub fn try_acquire(name: &str) -> Result<RawLock, InstanceError> {
    let path = lock_path(name);
    let mut file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(&path)
        .map_err(InstanceError::Platform)?;

    if let Err(err) = file.try_lock_exclusive() {
        return Err(if is_contended(&err) {
            InstanceError::AlreadyRunning
        } else {
            InstanceError::Platform(err)
        });
    }

    // PID is only for humans poking at the lock file.
    if file.set_len(0).is_ok() {
        let _ = write!(file, "{}", std::process::id());
    }

    debug!("Acquired instance lock at {}", path.display());
    Ok(RawLock { file, path })
}

impl RawLock {
    /// Unlocks and closes the file. The file itself stays on disk: removing
    /// it would let a waiter holding the old inode and a newcomer creating a
    /// fresh one both succeed.
    pub fn release(self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            debug!("Unlock of {} failed: {}", self.path.display(), err);
        }
    }
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
