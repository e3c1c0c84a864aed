//! Platform abstraction layer
//!
//! Each platform module provides the same three submodules:
//! - `lock`: exclusive per-user instance lock (`try_acquire` / `RawLock::release`)
//! - `ipc`: rendezvous `Endpoint` plus `bind` / `connect` / `unbind`
//! - `launch`: launch-at-login toggling
//!
//! Everything above this layer goes through `current` only.

#[cfg(unix)]
pub mod unix;

#[cfg(windows)]
pub mod windows;

// Re-export the current platform's modules
#[cfg(unix)]
pub use unix as current;

#[cfg(windows)]
pub use windows as current;
