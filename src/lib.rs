pub mod app;
pub use app::{LaunchOptions, run};

pub mod browser;
pub mod config;
pub mod instance;
pub mod ipc;
pub mod model;

// Platform abstraction layer
pub mod platform;

// UI modules (cross-platform)
pub mod ui {
    pub mod icon;
    pub mod menu;
}

// Re-export platform-specific implementations through unified interface
pub mod launch {
    pub use crate::platform::current::launch::*;
}
