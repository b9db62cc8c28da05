//! Line codec
//!
//! Framing functions for the newline-delimited wire format.
//!
//! ## Wire Format
//!
//! ```text
//! ┌─────────────────────────────────┬──────────┬──────────┐
//! │           Payload               │ CR (opt) │    LF    │
//! └─────────────────────────────────┴──────────┴──────────┘
//! ```
//!
//! The payload is opaque to this layer. Outbound strings are written
//! verbatim, so callers supply their own terminator.

use std::io::{BufRead, Read, Write};

use crate::error::{RelayError, Result};

/// Line delimiter
pub const DELIMITER: u8 = b'\n';

// =============================================================================
// Trimming
// =============================================================================

/// Strip every trailing carriage return and newline from a line
pub fn trim_line(line: &str) -> &str {
    line.trim_end_matches(['\r', '\n'])
}

/// Check whether a line carries no payload once trimmed
pub fn is_empty(line: &str) -> bool {
    trim_line(line).is_empty()
}

// =============================================================================
// Reading / Writing
// =============================================================================

/// Read one line from a buffered reader
///
/// Returns `Ok(None)` on EOF with nothing buffered. A trailing fragment
/// without a delimiter is returned once before EOF. `max_len` bounds the raw
/// line, delimiter included.
pub fn read_line<R: BufRead>(reader: &mut R, max_len: usize) -> Result<Option<String>> {
    let mut buf = Vec::new();
    let read = reader.by_ref().take(max_len as u64).read_until(DELIMITER, &mut buf)?;

    if read == 0 {
        return Ok(None);
    }

    if buf.last() != Some(&DELIMITER) && buf.len() >= max_len {
        return Err(RelayError::LineTooLong { limit: max_len });
    }

    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

/// Write a string and flush immediately
pub fn write_line<W: Write>(writer: &mut W, text: &str) -> Result<()> {
    writer.write_all(text.as_bytes())?;
    writer.flush()?;
    Ok(())
}
