use hexlink_protocol::{PacketKey, ProtocolError};

use crate::ChannelId;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The channel was closed; no further frames can be sent.
    #[error("channel {0} is closed")]
    ConnectionClosed(ChannelId),

    /// Writing a frame to the stream failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Reading from the stream failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding or accepting connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// Connecting to a remote peer failed.
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// A packet could not be encoded, or an inbound frame could not be
    /// decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// An inbound frame grew past the configured limit without completing.
    #[error("frame exceeds {limit} bytes")]
    FrameTooLarge { limit: usize },

    /// `start` was called on a channel whose receive loop already ran.
    #[error("channel {0} was already started")]
    AlreadyStarted(ChannelId),
}

/// Errors reported by a listener while handling a decoded packet.
///
/// These never close the channel: the frame was fully consumed before the
/// listener ran, so the stream is still aligned.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// The packet registered under `key` is not the type the listener
    /// expected.
    #[error("unexpected packet type for {key}")]
    UnexpectedPacket { key: PacketKey },

    /// The listener's own handling failed.
    #[error("listener failed: {0}")]
    Handler(String),
}
