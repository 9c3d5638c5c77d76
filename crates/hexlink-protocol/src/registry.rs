//! The deserializer registry: which factory rebuilds which key.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::{Packet, PacketKey, ProtocolError, WireReader};

/// A factory that rebuilds a packet from the payload of a frame.
pub type DeserializeFn = dyn Fn(PacketKey, &mut WireReader<'_>) -> Result<Box<dyn Packet>, ProtocolError>
    + Send
    + Sync;

/// Maps packet keys to the factories that decode them.
///
/// Cheap to clone: factories are shared behind `Arc`. A channel keeps one
/// registry; listeners bring their own and the channel merges them in with
/// [`extend`](Self::extend) when the listener is registered.
#[derive(Clone, Default)]
pub struct DeserializerRegistry {
    factories: HashMap<PacketKey, Arc<DeserializeFn>>,
}

impl DeserializerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `P::deserialize` under `key`. Replaces any earlier factory.
    pub fn register<P: Packet>(&mut self, key: PacketKey) -> &mut Self {
        self.register_fn(key, |key, reader| {
            P::deserialize(key, reader).map(|p| Box::new(p) as Box<dyn Packet>)
        })
    }

    /// Registers an arbitrary factory under `key`.
    pub fn register_fn<F>(&mut self, key: PacketKey, factory: F) -> &mut Self
    where
        F: Fn(PacketKey, &mut WireReader<'_>) -> Result<Box<dyn Packet>, ProtocolError>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(key, Arc::new(factory));
        self
    }

    /// Copies every factory of `other` into `self`, overwriting shared keys.
    pub fn extend(&mut self, other: &DeserializerRegistry) {
        for (key, factory) in &other.factories {
            self.factories.insert(*key, Arc::clone(factory));
        }
    }

    /// Removes the factory for `key`. Returns `true` if one was present.
    pub fn remove(&mut self, key: PacketKey) -> bool {
        self.factories.remove(&key).is_some()
    }

    pub fn contains(&self, key: PacketKey) -> bool {
        self.factories.contains_key(&key)
    }

    /// Returns every registered key, in ascending order.
    pub fn keys(&self) -> Vec<PacketKey> {
        let mut keys: Vec<PacketKey> = self.factories.keys().copied().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    pub fn clear(&mut self) {
        self.factories.clear();
    }

    /// Decodes one payload with the factory registered for `key`.
    ///
    /// # Errors
    /// [`ProtocolError::UnknownPacketKind`] if no factory is registered,
    /// otherwise whatever the factory reports.
    pub fn deserialize(
        &self,
        key: PacketKey,
        reader: &mut WireReader<'_>,
    ) -> Result<Box<dyn Packet>, ProtocolError> {
        let factory = self
            .factories
            .get(&key)
            .ok_or(ProtocolError::UnknownPacketKind(key))?;
        factory(key, reader)
    }
}

impl fmt::Debug for DeserializerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeserializerRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}
