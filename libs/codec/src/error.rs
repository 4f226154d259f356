//! Protocol-level errors for wire decoding.
//!
//! Every variant here is non-fatal to the pipeline: a failed decode causes the
//! offending buffer to be dropped with a log entry, never a crash. Garbled and
//! truncated datagrams are expected traffic on UDP.

use thiserror::Error;

/// Wire decode errors with diagnostic context.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame magic validation failed - buffer is not a gateway frame
    #[error("invalid frame magic: expected {expected:#010x}, got {actual:#010x}")]
    BadMagic { expected: u32, actual: u32 },

    /// Tag record buffer is not the fixed 38-byte wire size
    #[error("wrong tag record length: expected {expected} bytes, got {got}")]
    WrongLength { expected: usize, got: usize },

    /// Buffer ends before the declared layout does
    #[error("truncated buffer: need {need} bytes, got {got} (context: {context})")]
    Truncated {
        need: usize,
        got: usize,
        context: &'static str,
    },
}

impl ProtocolError {
    pub fn bad_magic(expected: u32, actual: u32) -> Self {
        Self::BadMagic { expected, actual }
    }

    pub fn wrong_length(expected: usize, got: usize) -> Self {
        Self::WrongLength { expected, got }
    }

    pub fn truncated(need: usize, got: usize, context: &'static str) -> Self {
        Self::Truncated { need, got, context }
    }
}

/// Result type for codec operations.
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;
