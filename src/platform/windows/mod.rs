//! Windows primitives: named mutex, loopback TCP, registry Run key.

pub mod ipc;
pub mod launch;
pub mod lock;
