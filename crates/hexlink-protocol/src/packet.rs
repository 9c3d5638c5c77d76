//! The [`Packet`] trait and the keys that identify packet types on the wire.

use std::any::Any;
use std::fmt;

use crate::{ProtocolError, WireReader, WireWriter};

// ---------------------------------------------------------------------------
// PacketKey
// ---------------------------------------------------------------------------

/// Numeric identifier of a packet type on the wire.
///
/// This is a newtype wrapper around the `i32` that prefixes every frame.
/// Application keys are non-negative; negative keys are reserved for
/// packets the channel handles itself (see [`keys`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PacketKey(i32);

impl PacketKey {
    /// Creates a key from its raw wire value.
    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    /// Returns the raw wire value.
    pub const fn get(self) -> i32 {
        self.0
    }

    /// Returns `true` for keys reserved by the channel (negative values).
    pub const fn is_reserved(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for PacketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key-{}", self.0)
    }
}

/// Well-known packet keys.
pub mod keys {
    use super::PacketKey;

    /// Ping request. Reserved; handled by the channel's ping listener.
    pub const PING_REQUEST: PacketKey = PacketKey::new(-1);

    /// Ping response (echo of a request). Reserved.
    pub const PING_RESPONSE: PacketKey = PacketKey::new(-2);

    /// Player announcement ([`PlayerInfoPacket`](crate::PlayerInfoPacket)).
    pub const PLAYER_INFO: PacketKey = PacketKey::new(1);

    /// Player-issued simulation task.
    pub const TASK: PacketKey = PacketKey::new(2);

    /// A task stamped with its sender's logical clock, or a bare clock
    /// update. Used to give tasks from both peers one shared order.
    pub const TASK_SEQUENCE: PacketKey = PacketKey::new(3);
}

// ---------------------------------------------------------------------------
// AsAny
// ---------------------------------------------------------------------------

/// Lets a `Box<dyn Packet>` be turned back into its concrete type.
///
/// Blanket-implemented for every `Send + Sync + 'static` type, so packet
/// authors never implement it by hand.
pub trait AsAny: Any + Send + Sync {
    /// Borrows `self` as `&dyn Any`.
    fn as_any(&self) -> &dyn Any;

    /// Converts the box into `Box<dyn Any>` for `downcast`.
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

// ---------------------------------------------------------------------------
// Packet
// ---------------------------------------------------------------------------

/// A self-describing, keyed message unit.
///
/// `serialize` writes the payload only; the channel writes the key in front
/// of it. `deserialize` must mirror `serialize` field for field, with the
/// same widths and order, because nothing else on the wire says where the
/// payload ends.
///
/// ```rust
/// use hexlink_protocol::{Packet, PacketKey, ProtocolError, WireReader, WireWriter};
///
/// #[derive(Debug, PartialEq)]
/// struct Chat {
///     text: String,
/// }
///
/// impl Packet for Chat {
///     fn key(&self) -> PacketKey {
///         PacketKey::new(10)
///     }
///
///     fn serialize(&self, out: &mut WireWriter) -> Result<(), ProtocolError> {
///         out.write_utf(&self.text)
///     }
///
///     fn deserialize(_key: PacketKey, reader: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
///         Ok(Self { text: reader.read_utf()? })
///     }
/// }
///
/// let mut out = WireWriter::new();
/// Chat { text: "hi".into() }.serialize(&mut out).unwrap();
/// let bytes = out.into_bytes();
/// let decoded = Chat::deserialize(PacketKey::new(10), &mut WireReader::new(&bytes)).unwrap();
/// assert_eq!(decoded.text, "hi");
/// ```
pub trait Packet: AsAny + fmt::Debug {
    /// The key identifying this packet's wire type. Fixed at construction.
    fn key(&self) -> PacketKey;

    /// Writes the payload (not the key).
    fn serialize(&self, out: &mut WireWriter) -> Result<(), ProtocolError>;

    /// Rebuilds a packet from a payload. `key` is the key the frame
    /// arrived with, for types that are registered under several keys.
    fn deserialize(key: PacketKey, reader: &mut WireReader<'_>) -> Result<Self, ProtocolError>
    where
        Self: Sized;
}
