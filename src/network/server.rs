//! TCP Server
//!
//! Accepts connections and wraps each one in an [`Endpoint`].

use std::collections::HashMap;
use std::io::{ErrorKind, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::Sender;
use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{RelayError, Result};
use crate::protocol::Message;

use super::endpoint::Endpoint;

/// Sleep between accept attempts when no connection is pending
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Line sent to connections refused over the limit
const TOO_MANY_CONNECTIONS: &str = "ERROR :Too many connections\r\n";

/// TCP acceptor with a registry of live endpoints
pub struct Server {
    config: Config,

    listener: TcpListener,

    /// Live endpoints by id
    endpoints: Mutex<HashMap<u64, Arc<Endpoint>>>,

    /// Counter for placeholder nicknames
    guest_seq: AtomicU64,

    shutdown: AtomicBool,
}

impl Server {
    /// Bind the listener from `config.listen_addr`
    pub fn bind(config: Config) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen_addr)?;

        // Non-blocking accept so the loop can observe shutdown
        listener.set_nonblocking(true)?;

        tracing::info!("Listening on {}", listener.local_addr()?);

        Ok(Self {
            config,
            listener,
            endpoints: Mutex::new(HashMap::new()),
            guest_seq: AtomicU64::new(1),
            shutdown: AtomicBool::new(false),
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` is called (blocking)
    pub fn run(&self, inbound: Sender<Message>) -> Result<()> {
        while !self.shutdown.load(Ordering::Acquire) {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    if let Err(e) = self.accept(stream, addr, &inbound) {
                        tracing::warn!("Failed to set up endpoint for {}: {}", addr, e);
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    return Err(RelayError::Network(format!("Accept failed: {}", e)));
                }
            }
        }

        tracing::info!("Accept loop stopped");
        Ok(())
    }

    fn accept(
        &self,
        mut stream: TcpStream,
        addr: SocketAddr,
        inbound: &Sender<Message>,
    ) -> Result<()> {
        stream.set_nonblocking(false)?;

        if self.endpoint_count() >= self.config.max_connections {
            tracing::warn!("Refusing {}: connection limit reached", addr);
            let _ = stream.write_all(TOO_MANY_CONNECTIONS.as_bytes());
            return Ok(());
        }

        let nickname = format!("guest{}", self.guest_seq.fetch_add(1, Ordering::Relaxed));
        let endpoint = Endpoint::new(nickname, stream, inbound.clone(), &self.config)?;

        tracing::info!("Accepted {} as {}", addr, endpoint.nickname());
        self.endpoints.lock().insert(endpoint.id(), endpoint);
        Ok(())
    }

    /// Snapshot of the registered endpoints
    pub fn endpoints(&self) -> Vec<Arc<Endpoint>> {
        self.endpoints.lock().values().cloned().collect()
    }

    pub fn endpoint_count(&self) -> usize {
        self.endpoints.lock().len()
    }

    /// Drop endpoints whose peer has gone away
    ///
    /// Endpoints whose read loop exited are aborted (there is no one left to
    /// say goodbye to) and removed. Returns how many were removed.
    pub fn prune_finished(&self) -> usize {
        let finished: Vec<Arc<Endpoint>> = {
            let mut endpoints = self.endpoints.lock();
            let ids: Vec<u64> = endpoints
                .values()
                .filter(|e| e.read_finished())
                .map(|e| e.id())
                .collect();
            ids.iter().filter_map(|id| endpoints.remove(id)).collect()
        };

        for endpoint in &finished {
            tracing::debug!("Pruning endpoint {} ({})", endpoint.id(), endpoint.nickname());
            endpoint.abort();
        }
        finished.len()
    }

    /// Close every idle endpoint with `farewell`
    ///
    /// Returns how many endpoints were closed.
    pub fn reap_idle(&self, farewell: &str) -> usize {
        let idle: Vec<Arc<Endpoint>> = {
            let mut endpoints = self.endpoints.lock();
            let ids: Vec<u64> = endpoints
                .values()
                .filter(|e| e.is_idle())
                .map(|e| e.id())
                .collect();
            ids.iter().filter_map(|id| endpoints.remove(id)).collect()
        };

        // Close outside the registry lock; it may block on backpressure
        for endpoint in &idle {
            tracing::info!(
                "Closing idle endpoint {} ({}), last active {}",
                endpoint.id(),
                endpoint.nickname(),
                endpoint.idle_status()
            );
            if let Err(e) = endpoint.close(farewell) {
                tracing::debug!("Close of endpoint {} failed: {}", endpoint.id(), e);
                endpoint.abort();
            }
        }
        idle.len()
    }

    /// Close every endpoint with `farewell` and empty the registry
    pub fn close_all(&self, farewell: &str) {
        let all: Vec<Arc<Endpoint>> = self.endpoints.lock().drain().map(|(_, e)| e).collect();
        for endpoint in all {
            if let Err(e) = endpoint.close(farewell) {
                tracing::debug!("Close of endpoint {} failed: {}", endpoint.id(), e);
                endpoint.abort();
            }
        }
    }

    /// Signal the accept loop to stop
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}
