//! Unix domain socket transport for the command channel.

use std::fmt;
use std::fs;
use std::io;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;

pub type Listener = UnixListener;
pub type Stream = UnixStream;

/// Socket file shared by every instance of the same application.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    path: PathBuf,
}

impl Endpoint {
    pub fn for_app(name: &str) -> Self {
        Self {
            path: super::rendezvous_dir().join(format!("{}.ipc", name.to_lowercase())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Binds the socket, clearing a stale file left by a crashed instance. A
/// socket that still accepts connections belongs to a live listener and is
/// left alone.
pub fn bind(endpoint: &Endpoint) -> io::Result<Listener> {
    if endpoint.path.exists() {
        if UnixStream::connect(&endpoint.path).is_ok() {
            return Err(io::Error::new(
                io::ErrorKind::AddrInUse,
                format!("{} already has a listener", endpoint),
            ));
        }
        debug!("Removing stale socket {}", endpoint);
        fs::remove_file(&endpoint.path)?;
    }
    UnixListener::bind(&endpoint.path)
}

/// Local sockets either connect or fail immediately, so the timeout only
/// bounds the subsequent write.
pub fn connect(endpoint: &Endpoint, timeout: Duration) -> io::Result<Stream> {
    let stream = UnixStream::connect(&endpoint.path)?;
    stream.set_write_timeout(Some(timeout))?;
    Ok(stream)
}

pub fn unbind(endpoint: &Endpoint) {
    if let Err(err) = fs::remove_file(&endpoint.path) {
        if err.kind() != io::ErrorKind::NotFound {
            debug!("Failed to remove socket {}: {}", endpoint, err);
        }
    }
}
