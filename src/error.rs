//! Error types for relayd
//!
//! Provides a unified error type for all endpoint operations.

use thiserror::Error;

/// Result type alias using RelayError
pub type Result<T> = std::result::Result<T, RelayError>;

/// Unified error type for relayd operations
#[derive(Debug, Error)]
pub enum RelayError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Endpoint Lifecycle Errors
    // -------------------------------------------------------------------------
    /// A value was pushed onto an outbound queue that is already closed
    #[error("Endpoint outbound queue is closed")]
    EndpointClosed,

    /// `close` was called on an endpoint that was already closed
    #[error("Endpoint already closed")]
    AlreadyClosed,

    /// The server-owned inbound queue has no consumer left
    #[error("Server inbound queue disconnected")]
    ServerGone,

    // -------------------------------------------------------------------------
    // Framing Errors
    // -------------------------------------------------------------------------
    #[error("Line exceeds {limit} bytes")]
    LineTooLong { limit: usize },

    // -------------------------------------------------------------------------
    // Network Errors
    // -------------------------------------------------------------------------
    #[error("Network error: {0}")]
    Network(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}
