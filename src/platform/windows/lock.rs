//! Single-instance lock backed by a session-local named mutex.

use std::io;

use log::debug;
use windows::Win32::Foundation::{CloseHandle, ERROR_ALREADY_EXISTS, GetLastError, HANDLE};
use windows::Win32::System::Threading::CreateMutexW;
use windows::core::HSTRING;

use crate::instance::InstanceError;

/// Handle to the named mutex. Windows destroys the object once the last
/// handle closes, which also happens when the owning process dies.
#[derive(Debug)]
pub struct RawLock {
    handle: HANDLE,
}

// The handle is an opaque kernel object reference, valid from any thread.
unsafe impl Send for RawLock {}

/// `Local\` scopes the name to the current logon session.
pub fn mutex_name(name: &str) -> String {
    format!("Local\\{name}")
}

pub fn try_acquire(name: &str) -> Result<RawLock, InstanceError> {
    let wide = HSTRING::from(mutex_name(name));
    let handle = unsafe { CreateMutexW(None, false, &wide) }
        .map_err(|e| InstanceError::Platform(io::Error::other(e)))?;

    // CreateMutexW opens the existing object and reports it only through the
    // thread's last-error value.
    if unsafe { GetLastError() } == ERROR_ALREADY_EXISTS {
        unsafe {
            let _ = CloseHandle(handle);
        }
        return Err(InstanceError::AlreadyRunning);
    }

    debug!("Created named mutex {}", mutex_name(name));
    Ok(RawLock { handle })
}

impl RawLock {
    pub fn release(self) {
        if let Err(err) = unsafe { CloseHandle(self.handle) } {
            debug!("CloseHandle on instance mutex failed: {}", err);
        }
    }
}
