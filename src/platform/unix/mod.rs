//! Unix (Linux and macOS) primitives: advisory file lock, domain socket,
//! launch-at-login.

pub mod ipc;
pub mod launch;
pub mod lock;

use std::path::PathBuf;

/// Per-user directory for rendezvous files. Prefers `$XDG_RUNTIME_DIR`,
/// which is private to the user session, over the shared temp directory.
pub(crate) fn rendezvous_dir() -> PathBuf {
    dirs::runtime_dir().unwrap_or_else(std::env::temp_dir)
}
