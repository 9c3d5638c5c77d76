//! Error types for the protocol layer.
//!
//! Each crate in hexlink defines its own error enum. When you see a
//! `ProtocolError`, the problem is in encoding or decoding bytes, not in
//! networking or in the simulation.

use crate::PacketKey;

/// Errors that can occur in the protocol layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The buffered bytes end before the field being read.
    ///
    /// This is not corruption: the channel treats it as "read more bytes
    /// from the stream and try the frame again".
    #[error("incomplete frame: needed {needed} more bytes, {remaining} buffered")]
    Incomplete {
        /// Bytes required by the field being read.
        needed: usize,
        /// Bytes still available in the buffer.
        remaining: usize,
    },

    /// No deserializer is registered for this key.
    ///
    /// Since frames carry no length prefix, the receiver cannot skip the
    /// payload. The stream is unusable after this.
    #[error("unknown packet kind: {0}")]
    UnknownPacketKind(PacketKey),

    /// A string is longer than the `u16` length prefix can describe.
    #[error("string of {0} bytes exceeds the 65535 byte limit")]
    StringTooLong(usize),

    /// A string field did not contain valid UTF-8.
    #[error("invalid utf-8 in string field")]
    InvalidUtf8,

    /// The bytes decode, but violate the packet's own rules, e.g. an
    /// enum tag outside the known range.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl ProtocolError {
    /// Returns `true` if more input could turn this error into a success.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::Incomplete { .. })
    }
}
