//! Machine-user scoped single-instance lock.

use std::io;

use log::debug;
use thiserror::Error;

use crate::platform::current::lock::{self, RawLock};

#[derive(Debug, Error)]
pub enum InstanceError {
    #[error("another instance is already running")]
    AlreadyRunning,
    #[error("unable to check for a running instance: {0}")]
    Platform(#[source] io::Error),
}

/// Exclusive claim on the application identity. Exactly one process can hold
/// a lock for a given name; the OS reclaims it if the holder dies.
#[derive(Debug)]
pub struct InstanceLock {
    name: String,
    raw: Option<RawLock>,
}

impl InstanceLock {
    /// Single non-blocking attempt. `InstanceError::AlreadyRunning` is the
    /// normal signal to hand off to the running instance instead.
    pub fn acquire(name: &str) -> Result<Self, InstanceError> {
        let raw = lock::try_acquire(name)?;
        Ok(Self {
            name: name.to_string(),
            raw: Some(raw),
        })
    }

    /// Probes without keeping the lock.
    pub fn is_running(name: &str) -> bool {
        match Self::acquire(name) {
            Ok(mut probe) => {
                probe.release();
                false
            }
            Err(InstanceError::AlreadyRunning) => true,
            Err(err) => {
                debug!("Instance probe for {} failed: {}", name, err);
                false
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_held(&self) -> bool {
        self.raw.is_some()
    }

    /// Idempotent.
    pub fn release(&mut self) {
        if let Some(raw) = self.raw.take() {
            raw.release();
            debug!("Released instance lock {}", self.name);
        }
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        self.release();
    }
}
