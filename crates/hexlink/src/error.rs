//! Unified error type for hexlink.

use hexlink_command::CommandError;
use hexlink_protocol::ProtocolError;
use hexlink_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `hexlink` meta-crate, you deal with this single error
/// type instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each variant lets `?` convert sub-crate errors.
#[derive(Debug, thiserror::Error)]
pub enum HexlinkError {
    /// A channel-level error (closed, send, receive, connect).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, unknown key).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A command-level error (queue closed, save failed).
    #[error(transparent)]
    Command(#[from] CommandError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexlink_transport::ChannelId;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed(ChannelId::new(4));
        let hexlink_err: HexlinkError = err.into();
        assert!(matches!(hexlink_err, HexlinkError::Transport(_)));
        assert!(hexlink_err.to_string().contains("chan-4"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let hexlink_err: HexlinkError = err.into();
        assert!(matches!(hexlink_err, HexlinkError::Protocol(_)));
    }

    #[test]
    fn test_from_command_error() {
        let hexlink_err: HexlinkError = CommandError::QueueClosed.into();
        assert!(matches!(hexlink_err, HexlinkError::Command(_)));
        assert_eq!(hexlink_err.to_string(), "task queue is closed");
    }
}
