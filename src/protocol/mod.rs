//! Protocol Module
//!
//! Transport-level framing for the line protocol.
//!
//! ## Protocol Format
//!
//! Every message is a single line terminated by `\n`, optionally preceded
//! by `\r`. The terminator is trimmed on input; empty lines are dropped.
//! Command grammar is left to the dispatcher consuming [`Message`]s.

mod codec;
mod message;

pub use codec::{is_empty, read_line, trim_line, write_line, DELIMITER};
pub use message::Message;
