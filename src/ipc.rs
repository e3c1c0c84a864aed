//! One-shot text-line command channel between a second launch and the
//! running instance.
//!
//! The lock holder runs an [`IpcServer`]; a process that lost the lock race
//! calls [`notify`], which writes a single `OPEN_URL\n` line and disconnects.
//! Each connection is served on its own thread with a read deadline, so a
//! stalled peer never holds up the accept loop.

use std::io::{BufRead, BufReader, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, info, warn};

use crate::platform::current::ipc::{self, Stream};

pub use crate::platform::current::ipc::Endpoint;

pub const READ_TIMEOUT: Duration = Duration::from_secs(5);
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const MAX_LINE_BYTES: u64 = 256;
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    OpenUrl,
}

impl Command {
    /// Exact match on a full line including its terminator; anything else is
    /// not a command.
    pub fn parse(line: &str) -> Option<Self> {
        match line {
            "OPEN_URL\n" => Some(Command::OpenUrl),
            _ => None,
        }
    }

    pub fn as_line(self) -> &'static str {
        match self {
            Command::OpenUrl => "OPEN_URL\n",
        }
    }
}

type CommandHandler = Arc<dyn Fn(Command) + Send + Sync>;

/// Listening side. Dropping it stops the accept loop.
pub struct IpcServer {
    endpoint: Endpoint,
    stopping: Arc<AtomicBool>,
    accept_thread: Option<JoinHandle<()>>,
}

impl IpcServer {
    /// Binds `endpoint` and serves connections in the background.
    /// `on_command` runs on connection threads, never on the caller's.
    pub fn listen<F>(endpoint: Endpoint, on_command: F) -> Result<Self>
    where
        F: Fn(Command) + Send + Sync + 'static,
    {
        let listener = ipc::bind(&endpoint)
            .with_context(|| format!("failed to bind command endpoint {}", endpoint))?;
        let stopping = Arc::new(AtomicBool::new(false));
        let handler: CommandHandler = Arc::new(on_command);

        let accept_thread = {
            let stopping = stopping.clone();
            let endpoint = endpoint.clone();
            thread::Builder::new()
                .name("ipc-accept".into())
                .spawn(move || {
                    for conn in listener.incoming() {
                        if stopping.load(Ordering::SeqCst) {
                            break;
                        }
                        match conn {
                            Ok(stream) => spawn_connection(stream, handler.clone()),
                            Err(err) => {
                                warn!("Command channel accept failed: {}", err);
                                thread::sleep(ACCEPT_ERROR_BACKOFF);
                            }
                        }
                    }
                    debug!("Command channel on {} stopped", endpoint);
                })
                .context("failed to spawn command listener thread")?
        };

        info!("Listening for commands on {}", endpoint);
        Ok(Self {
            endpoint,
            stopping,
            accept_thread: Some(accept_thread),
        })
    }

    /// Stops accepting and waits for the accept loop to exit. Connections
    /// already being served finish on their own. Idempotent.
    pub fn shutdown(&mut self) {
        let Some(accept_thread) = self.accept_thread.take() else {
            return;
        };
        self.stopping.store(true, Ordering::SeqCst);
        // Unblock accept() with a throwaway connection.
        if let Err(err) = ipc::connect(&self.endpoint, CONNECT_TIMEOUT) {
            debug!("Wake-up connection to {} failed: {}", self.endpoint, err);
        }
        let _ = accept_thread.join();
        ipc::unbind(&self.endpoint);
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_connection(stream: Stream, handler: CommandHandler) {
    let spawned = thread::Builder::new()
        .name("ipc-conn".into())
        .spawn(move || {
            if let Err(err) = handle_connection(stream, &handler) {
                debug!("Dropped command connection: {}", err);
            }
        });
    if let Err(err) = spawned {
        warn!("Failed to spawn command connection thread: {}", err);
    }
}

fn handle_connection(stream: Stream, handler: &CommandHandler) -> std::io::Result<()> {
    stream.set_read_timeout(Some(READ_TIMEOUT))?;
    let mut line = String::new();
    BufReader::new(stream.take(MAX_LINE_BYTES)).read_line(&mut line)?;

    match Command::parse(&line) {
        Some(command) => handler(command),
        None if line.is_empty() => {}
        None => debug!("Ignoring unrecognized command {:?}", line.trim_end()),
    }
    Ok(())
}

/// Asks the instance listening on `endpoint` to run `command`. Errors mean
/// nothing is listening; callers report and carry on.
pub fn notify(endpoint: &Endpoint, command: Command) -> Result<()> {
    let mut stream = ipc::connect(endpoint, CONNECT_TIMEOUT)
        .with_context(|| format!("unable to reach running instance at {}", endpoint))?;
    stream
        .write_all(command.as_line().as_bytes())
        .and_then(|()| stream.flush())
        .with_context(|| format!("failed to send command to {}", endpoint))?;
    debug!("Sent {:?} to {}", command, endpoint);
    Ok(())
}
