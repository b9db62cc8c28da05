//! Network Module
//!
//! Per-connection endpoints and a minimal TCP acceptor.
//!
//! ## Architecture
//! - Single acceptor thread
//! - Two threads per endpoint (read loop, write loop)
//! - Decoded lines funneled into one server-owned inbound queue

mod endpoint;
mod idle;
mod outbound;
mod server;
mod transport;

pub use endpoint::{Endpoint, ReadExit, Termination, WriteExit};
pub use idle::ActivityClock;
pub use outbound::Outbound;
pub use server::Server;
pub use transport::Transport;

use crossbeam::channel::{self, Receiver, Sender};

use crate::protocol::Message;

/// Create the server's inbound queue
///
/// With a capacity, read loops block once the queue is full, throttling fast
/// peers against a slow dispatcher. `None` never blocks and never drops, at
/// the cost of unbounded memory.
pub fn inbound_queue<T: Transport>(
    capacity: Option<usize>,
) -> (Sender<Message<T>>, Receiver<Message<T>>) {
    match capacity {
        Some(n) => channel::bounded(n),
        None => channel::unbounded(),
    }
}
