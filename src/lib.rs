//! # relayd
//!
//! Per-connection transport endpoints for line-oriented text protocol
//! servers (IRC-style):
//! - Newline-delimited framing with CR/LF trimming
//! - Independent read and write loops per connection
//! - Backpressure through bounded queues
//! - Race-free idle tracking and one-shot close
//!
//! ## Architecture Overview
//!
//! ```text
//!            peer socket
//!       ┌─────────┴─────────┐
//!       │                   ▲
//!       ▼                   │
//! ┌─────────────┐    ┌─────────────┐
//! │  Read Loop  │    │ Write Loop  │
//! │ (trim, drop │    │ (flush per  │
//! │   empties)  │    │  message)   │
//! └──────┬──────┘    └──────▲──────┘
//!        │                  │
//!        ▼                  │
//! ┌─────────────┐    ┌─────────────┐
//! │   Inbound   │    │  Outbound   │
//! │ (server's)  │    │ (endpoint's)│
//! └──────┬──────┘    └──────▲──────┘
//!        │                  │
//!        ▼                  │
//! ┌─────────────────────────┴───────┐
//! │           Dispatcher            │
//! │    (receive / close / reap)     │
//! └─────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod network;
pub mod protocol;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{RelayError, Result};
pub use config::Config;
pub use network::{inbound_queue, Endpoint, Server};
pub use protocol::Message;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of relayd
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
