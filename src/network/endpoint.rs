//! Connection Endpoint
//!
//! One connected peer: a read loop feeding the server's inbound queue and a
//! write loop draining the endpoint's own outbound queue, each on its own
//! thread.

use std::fmt;
use std::io::{BufReader, BufWriter, ErrorKind};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use crossbeam::channel::{Receiver, Sender};
use parking_lot::{Mutex, RwLock};

use crate::config::Config;
use crate::error::{RelayError, Result};
use crate::protocol::{is_empty, read_line, trim_line, write_line, Message};

use super::idle::ActivityClock;
use super::outbound::Outbound;
use super::transport::Transport;

static NEXT_ENDPOINT_ID: AtomicU64 = AtomicU64::new(1);

/// Why the read loop stopped
#[derive(Debug)]
pub enum ReadExit {
    /// The peer closed or reset the connection
    PeerClosed,

    /// The endpoint was closed or aborted locally
    Closed,

    /// The inbound queue has no consumer
    ServerGone,

    /// A read failed for any other reason
    Failed(RelayError),
}

/// Why the write loop stopped
#[derive(Debug)]
pub enum WriteExit {
    /// The outbound queue was closed and fully written
    Drained,

    /// A write or flush failed; the transport was shut down
    Failed(RelayError),
}

/// Exit reasons of both loops, collected by [`Endpoint::wait`]
#[derive(Debug)]
pub struct Termination {
    pub read: ReadExit,
    pub write: WriteExit,
}

/// A single connected peer
///
/// ## Concurrency Model
///
/// - **Read loop**: sole writer of the activity clock, sole producer of
///   [`Message`]s for this endpoint. Blocks on the socket and on a full
///   inbound queue.
/// - **Write loop**: sole consumer of the outbound queue. Writes and flushes
///   each value in FIFO order.
/// - **Everyone else**: `receive`, `close`, `abort`, idle queries and
///   accessors, from any thread.
///
/// Neither loop can be interrupted cooperatively while blocked on I/O;
/// `close` and `abort` shut the socket down to wake them.
pub struct Endpoint<T: Transport = TcpStream> {
    /// Process-unique id
    id: u64,

    /// Cached display name (the registry holds the authoritative one)
    nickname: RwLock<String>,

    /// Cached real name
    realname: RwLock<String>,

    /// Control handle, used for shutdown
    transport: T,

    /// Peer address for logging
    peer_addr: String,

    outbound: Outbound,

    activity: ActivityClock,

    idle_threshold: Duration,

    /// Set once by `close` or `abort`
    closed: AtomicBool,

    reader: Mutex<Option<JoinHandle<ReadExit>>>,
    writer: Mutex<Option<JoinHandle<WriteExit>>>,
}

impl<T: Transport> Endpoint<T> {
    /// Create an endpoint and start its read and write loops
    ///
    /// Returns as soon as both threads are running. Every non-empty line the
    /// peer sends is pushed to `inbound` as a [`Message`].
    pub fn new(
        nickname: impl Into<String>,
        transport: T,
        inbound: Sender<Message<T>>,
        config: &Config,
    ) -> Result<Arc<Self>> {
        transport.configure(config)?;

        let read_half = transport.try_clone()?;
        let write_half = transport.try_clone()?;
        let (outbound, output) = Outbound::bounded(config.outbound_capacity);

        let id = NEXT_ENDPOINT_ID.fetch_add(1, Ordering::Relaxed);
        let peer_addr = transport.peer_label();

        let endpoint = Arc::new(Self {
            id,
            nickname: RwLock::new(nickname.into()),
            realname: RwLock::new(String::new()),
            transport,
            peer_addr,
            outbound,
            activity: ActivityClock::new(),
            idle_threshold: config.idle_threshold,
            closed: AtomicBool::new(false),
            reader: Mutex::new(None),
            writer: Mutex::new(None),
        });

        let writer = thread::Builder::new()
            .name(format!("relayd-write-{}", id))
            .spawn(move || send_output(id, BufWriter::new(write_half), output))
            .map_err(|e| RelayError::Network(format!("Failed to spawn write loop: {}", e)))?;
        *endpoint.writer.lock() = Some(writer);

        let max_line_length = config.max_line_length;
        let spawned = thread::Builder::new().name(format!("relayd-read-{}", id)).spawn({
            let endpoint = Arc::clone(&endpoint);
            move || endpoint.process_input(BufReader::new(read_half), inbound, max_line_length)
        });

        match spawned {
            Ok(reader) => *endpoint.reader.lock() = Some(reader),
            Err(e) => {
                endpoint.abort();
                return Err(RelayError::Network(format!("Failed to spawn read loop: {}", e)));
            }
        }

        tracing::debug!("Endpoint {} established for {}", id, endpoint.peer_addr);
        Ok(endpoint)
    }

    /// Read lines until the transport closes or fails
    fn process_input(
        self: Arc<Self>,
        mut reader: BufReader<T>,
        inbound: Sender<Message<T>>,
        max_line_length: usize,
    ) -> ReadExit {
        let exit = loop {
            let line = read_line(&mut reader, max_line_length);
            self.activity.touch();

            let raw = match line {
                Ok(Some(raw)) => raw,
                Ok(None) => break self.classify_eof(),
                Err(e) => break self.classify_read_error(e),
            };

            let text = trim_line(&raw);
            if is_empty(text) {
                continue;
            }

            tracing::trace!("Received line from {}: {:?}", self.peer_addr, text);

            let message = Message::new(Arc::clone(&self), text);
            if inbound.send(message).is_err() {
                break ReadExit::ServerGone;
            }
        };

        match &exit {
            ReadExit::Failed(e) => {
                tracing::warn!("Read loop for {} failed: {}", self.peer_addr, e)
            }
            other => tracing::debug!("Read loop for {} stopped: {:?}", self.peer_addr, other),
        }
        exit
    }

    fn classify_eof(&self) -> ReadExit {
        if self.is_closed() {
            ReadExit::Closed
        } else {
            ReadExit::PeerClosed
        }
    }

    fn classify_read_error(&self, error: RelayError) -> ReadExit {
        if self.is_closed() {
            return ReadExit::Closed;
        }
        match &error {
            RelayError::Io(e)
                if matches!(
                    e.kind(),
                    ErrorKind::UnexpectedEof
                        | ErrorKind::ConnectionReset
                        | ErrorKind::ConnectionAborted
                ) =>
            {
                ReadExit::PeerClosed
            }
            _ => ReadExit::Failed(error),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Send a farewell and tear the endpoint down
    ///
    /// The farewell is the last value the write loop writes. Blocks until the
    /// outbound queue accepts it, so it must not be called from the write
    /// loop. A second call fails with `AlreadyClosed`.
    pub fn close(&self, farewell: impl Into<String>) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(RelayError::AlreadyClosed);
        }

        tracing::debug!("Closing endpoint {} ({})", self.id, self.peer_addr);

        let pushed = self.outbound.close_with(Some(farewell.into()));

        // Wakes the read loop; the write loop shuts the write half down once
        // the farewell is flushed
        if let Err(e) = self.transport.shutdown(Shutdown::Read) {
            tracing::debug!("Shutdown of {} read half failed: {}", self.peer_addr, e);
        }

        pushed
    }

    /// Stop both loops without a farewell
    ///
    /// Safe to call any number of times, also after `close`.
    pub fn abort(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!("Aborting endpoint {} ({})", self.id, self.peer_addr);
        }

        // Shut down first: a write loop stuck on a full socket fails out,
        // which releases any `close` blocked on the outbound queue
        if let Err(e) = self.transport.shutdown(Shutdown::Both) {
            tracing::trace!("Shutdown of {} failed: {}", self.peer_addr, e);
        }
        let _ = self.outbound.close_with(None);
    }

    /// Wait for both loops to exit
    ///
    /// The write loop only exits after `close`, `abort` or a write error,
    /// so this blocks until one of those happens. Fails if the loops were
    /// already collected by an earlier call or a loop panicked.
    pub fn wait(&self) -> Result<Termination> {
        let reader = self.reader.lock().take();
        let writer = self.writer.lock().take();

        let (reader, writer) = match (reader, writer) {
            (Some(r), Some(w)) => (r, w),
            _ => {
                return Err(RelayError::Network(format!(
                    "Endpoint {} loops already joined",
                    self.id
                )))
            }
        };

        let read = reader
            .join()
            .map_err(|_| RelayError::Network(format!("Endpoint {} read loop panicked", self.id)))?;
        let write = writer
            .join()
            .map_err(|_| RelayError::Network(format!("Endpoint {} write loop panicked", self.id)))?;

        Ok(Termination { read, write })
    }

    /// Whether `close` or `abort` has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Whether the read loop has exited
    pub fn read_finished(&self) -> bool {
        self.reader.lock().as_ref().map_or(true, |h| h.is_finished())
    }

    /// Whether either loop is still running
    pub fn is_live(&self) -> bool {
        let writing = self.writer.lock().as_ref().map_or(false, |h| !h.is_finished());
        writing || !self.read_finished()
    }

    // =========================================================================
    // Output
    // =========================================================================

    /// Queue a string for the peer
    ///
    /// Blocks while the outbound queue is full. Fails with `EndpointClosed`
    /// after the endpoint is closed.
    pub fn receive(&self, text: impl Into<String>) -> Result<()> {
        self.outbound.send(text)
    }

    // =========================================================================
    // Idle Tracking
    // =========================================================================

    /// Whether the peer has been silent for at least the idle threshold
    pub fn is_idle(&self) -> bool {
        self.activity.is_idle_at(SystemTime::now(), self.idle_threshold)
    }

    /// "active", or the time of the last input once idle
    pub fn idle_status(&self) -> String {
        if self.is_idle() {
            self.activity.format_last()
        } else {
            "active".to_string()
        }
    }

    /// Time of the last input (or of construction)
    pub fn last_activity(&self) -> SystemTime {
        self.activity.last()
    }

    pub fn idle_threshold(&self) -> Duration {
        self.idle_threshold
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn nickname(&self) -> String {
        self.nickname.read().clone()
    }

    pub fn set_nickname(&self, nickname: impl Into<String>) {
        *self.nickname.write() = nickname.into();
    }

    pub fn realname(&self) -> String {
        self.realname.read().clone()
    }

    pub fn set_realname(&self, realname: impl Into<String>) {
        *self.realname.write() = realname.into();
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    /// The underlying transport handle
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Handle to the outbound queue for senders that bypass `receive`
    pub fn outbound(&self) -> Outbound {
        self.outbound.clone()
    }
}

impl<T: Transport> fmt::Debug for Endpoint<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("id", &self.id)
            .field("nickname", &*self.nickname.read())
            .field("peer_addr", &self.peer_addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Drain the outbound queue into the transport
///
/// A failed write ends the loop and shuts the whole transport down, which
/// also stops the read loop.
fn send_output<T: Transport>(
    id: u64,
    mut writer: BufWriter<T>,
    output: Receiver<String>,
) -> WriteExit {
    while let Ok(data) = output.recv() {
        if let Err(e) = write_line(&mut writer, &data) {
            tracing::warn!("Write loop for endpoint {} failed: {}", id, e);
            drop(output);
            let _ = writer.get_ref().shutdown(Shutdown::Both);
            return WriteExit::Failed(e);
        }
    }

    if let Err(e) = writer.get_ref().shutdown(Shutdown::Both) {
        tracing::trace!("Shutdown after drain for endpoint {} failed: {}", id, e);
    }
    tracing::debug!("Write loop for endpoint {} drained", id);
    WriteExit::Drained
}
