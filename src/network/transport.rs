//! Transport abstraction
//!
//! A duplex byte stream that can be split into independent read and write
//! halves and shut down from any of them.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};

use crate::config::Config;

/// Duplex stream an endpoint can own
///
/// Reads and writes happen concurrently on separate clones of the same
/// underlying socket, and `shutdown` on any clone affects all of them.
pub trait Transport: Read + Write + Send + Sync + Sized + 'static {
    /// Create another handle to the same stream
    fn try_clone(&self) -> io::Result<Self>;

    /// Shut down the read half, write half, or both
    fn shutdown(&self, how: Shutdown) -> io::Result<()>;

    /// Label used in logs
    fn peer_label(&self) -> String;

    /// Apply socket options from the config
    fn configure(&self, _config: &Config) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for TcpStream {
    fn try_clone(&self) -> io::Result<Self> {
        TcpStream::try_clone(self)
    }

    fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        TcpStream::shutdown(self, how)
    }

    fn peer_label(&self) -> String {
        self.peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string())
    }

    fn configure(&self, config: &Config) -> io::Result<()> {
        // Flush-per-message only pays off without Nagle's algorithm
        self.set_nodelay(config.nodelay)
    }
}

#[cfg(unix)]
impl Transport for std::os::unix::net::UnixStream {
    fn try_clone(&self) -> io::Result<Self> {
        std::os::unix::net::UnixStream::try_clone(self)
    }

    fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        std::os::unix::net::UnixStream::shutdown(self, how)
    }

    fn peer_label(&self) -> String {
        self.peer_addr()
            .ok()
            .and_then(|a| a.as_pathname().map(|p| p.display().to_string()))
            .unwrap_or_else(|| "unix:unnamed".to_string())
    }
}
