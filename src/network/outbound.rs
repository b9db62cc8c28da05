//! Outbound queue
//!
//! Endpoint-owned FIFO of strings waiting for the write loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::RwLock;

use crate::error::{RelayError, Result};

/// Cloneable handle to an endpoint's outbound queue
///
/// Sends share a read lock on the sender slot; closing takes the write lock,
/// so nothing can slip in behind the final value pushed by
/// [`Outbound::close_with`].
#[derive(Clone)]
pub struct Outbound {
    inner: Arc<Inner>,
}

struct Inner {
    sender: RwLock<Option<Sender<String>>>,
    closed: AtomicBool,
}

impl Outbound {
    /// Create a queue and its consuming end
    ///
    /// A capacity of 0 makes every send wait for the consumer.
    pub fn bounded(capacity: usize) -> (Self, Receiver<String>) {
        let (tx, rx) = channel::bounded(capacity);
        let outbound = Self {
            inner: Arc::new(Inner {
                sender: RwLock::new(Some(tx)),
                closed: AtomicBool::new(false),
            }),
        };
        (outbound, rx)
    }

    /// Push a value, blocking while the queue is full
    ///
    /// Fails with `EndpointClosed` once the queue is closed or its consumer
    /// has gone away.
    pub fn send(&self, text: impl Into<String>) -> Result<()> {
        let guard = self.inner.sender.read();
        match guard.as_ref() {
            Some(tx) => tx.send(text.into()).map_err(|_| RelayError::EndpointClosed),
            None => Err(RelayError::EndpointClosed),
        }
    }

    /// Push an optional final value and close the queue
    ///
    /// The queue is closed even when the final push fails.
    pub fn close_with(&self, last: Option<String>) -> Result<()> {
        let mut guard = self.inner.sender.write();
        let tx = guard.take().ok_or(RelayError::EndpointClosed)?;
        self.inner.closed.store(true, Ordering::Release);

        match last {
            Some(text) => tx.send(text).map_err(|_| RelayError::EndpointClosed),
            None => Ok(()),
        }
    }

    /// Whether the queue has been closed
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Number of values waiting for the write loop
    pub fn len(&self) -> usize {
        self.inner.sender.read().as_ref().map_or(0, |tx| tx.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
