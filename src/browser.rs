use anyhow::{Context, Result};
use log::info;

/// Opens `url` in the user's default browser without waiting for it.
pub fn open_url(url: &str) -> Result<()> {
    info!("Opening {}", url);
    open::that_detached(url).with_context(|| format!("failed to open {}", url))
}
