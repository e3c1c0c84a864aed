//! Loopback TCP transport for the command channel.

use std::fmt;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpListener, TcpStream};
use std::time::Duration;

pub type Listener = TcpListener;
pub type Stream = TcpStream;

const PORT_BASE: u16 = 20000;
const PORT_SPAN: u32 = 10000;

/// Fixed loopback address shared by every instance of the same application.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    addr: SocketAddr,
}

impl Endpoint {
    pub fn for_app(name: &str) -> Self {
        let port = PORT_BASE + (fnv1a(name.to_lowercase().as_bytes()) % PORT_SPAN) as u16;
        Self {
            addr: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port)),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tcp://{}", self.addr)
    }
}

/// Stable across builds and platforms, unlike `DefaultHasher`.
fn fnv1a(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0x811c_9dc5_u32, |hash, b| {
        (hash ^ u32::from(*b)).wrapping_mul(0x0100_0193)
    })
}

pub fn bind(endpoint: &Endpoint) -> io::Result<Listener> {
    TcpListener::bind(endpoint.addr)
}

pub fn connect(endpoint: &Endpoint, timeout: Duration) -> io::Result<Stream> {
    let stream = TcpStream::connect_timeout(&endpoint.addr, timeout)?;
    stream.set_write_timeout(Some(timeout))?;
    Ok(stream)
}

pub fn unbind(_endpoint: &Endpoint) {}
