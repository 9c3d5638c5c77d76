//! Listeners: the handlers a channel invokes for inbound packets.

use std::fmt;
use std::marker::PhantomData;

use hexlink_protocol::{DeserializerRegistry, Packet, PacketKey};

use crate::ListenerError;

/// A handler bound to one or more packet keys.
///
/// The channel calls [`receive`](Self::receive) on its receive task, one
/// packet at a time, in wire order. A slow `receive` stalls every later
/// frame on that channel, so listeners that do real work should hand the
/// packet off (e.g. over an `mpsc` channel) and return.
pub trait ChannelListener: Send + Sync {
    /// Keys this listener claims.
    fn keys(&self) -> Vec<PacketKey>;

    /// Factories for every claimed key. The channel installs them when the
    /// listener is registered.
    fn deserializers(&self) -> DeserializerRegistry;

    /// Handles one decoded packet.
    fn receive(&self, packet: Box<dyn Packet>) -> Result<(), ListenerError>;
}

/// A [`ChannelListener`] that decodes every claimed key as `P` and passes
/// the typed packet to a closure.
///
/// ```rust
/// use hexlink_protocol::{keys, PlayerInfoPacket};
/// use hexlink_transport::{ChannelListener, PacketListener};
///
/// let listener = PacketListener::new(keys::PLAYER_INFO, |info: PlayerInfoPacket| {
///     println!("{} joined", info.name());
///     Ok(())
/// });
/// assert_eq!(listener.keys(), vec![keys::PLAYER_INFO]);
/// ```
pub struct PacketListener<P, F> {
    keys: Vec<PacketKey>,
    deserializers: DeserializerRegistry,
    handler: F,
    _packet: PhantomData<fn() -> P>,
}

impl<P, F> PacketListener<P, F>
where
    P: Packet,
    F: Fn(P) -> Result<(), ListenerError> + Send + Sync,
{
    /// Creates a listener for a single key.
    pub fn new(key: PacketKey, handler: F) -> Self {
        Self::with_keys(&[key], handler)
    }

    /// Creates a listener that decodes each of `keys` as `P`.
    pub fn with_keys(keys: &[PacketKey], handler: F) -> Self {
        let mut deserializers = DeserializerRegistry::new();
        for key in keys {
            deserializers.register::<P>(*key);
        }
        Self {
            keys: keys.to_vec(),
            deserializers,
            handler,
            _packet: PhantomData,
        }
    }
}

impl<P, F> ChannelListener for PacketListener<P, F>
where
    P: Packet,
    F: Fn(P) -> Result<(), ListenerError> + Send + Sync,
{
    fn keys(&self) -> Vec<PacketKey> {
        self.keys.clone()
    }

    fn deserializers(&self) -> DeserializerRegistry {
        self.deserializers.clone()
    }

    fn receive(&self, packet: Box<dyn Packet>) -> Result<(), ListenerError> {
        let key = packet.key();
        let packet = packet
            .into_any()
            .downcast::<P>()
            .map_err(|_| ListenerError::UnexpectedPacket { key })?;
        (self.handler)(*packet)
    }
}

impl<P, F> fmt::Debug for PacketListener<P, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketListener")
            .field("keys", &self.keys)
            .finish_non_exhaustive()
    }
}
