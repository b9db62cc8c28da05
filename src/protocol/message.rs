//! Message envelope
//!
//! Pairs a decoded line with the endpoint it arrived on.

use std::fmt;
use std::net::TcpStream;
use std::sync::Arc;

use crate::network::{Endpoint, Transport};

/// A trimmed, non-empty input line from one endpoint
pub struct Message<T: Transport = TcpStream> {
    endpoint: Arc<Endpoint<T>>,
    text: String,
}

impl<T: Transport> Message<T> {
    /// Create a new message
    pub fn new(endpoint: Arc<Endpoint<T>>, text: impl Into<String>) -> Self {
        Self {
            endpoint,
            text: text.into(),
        }
    }

    /// The originating endpoint
    pub fn endpoint(&self) -> &Arc<Endpoint<T>> {
        &self.endpoint
    }

    /// The line, without its terminator
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Split into endpoint and text
    pub fn into_parts(self) -> (Arc<Endpoint<T>>, String) {
        (self.endpoint, self.text)
    }
}

impl<T: Transport> fmt::Debug for Message<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("endpoint", &self.endpoint.id())
            .field("text", &self.text)
            .finish()
    }
}
