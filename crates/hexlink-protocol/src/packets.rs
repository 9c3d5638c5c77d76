//! Packets shipped with the protocol crate.

use crate::{keys, Packet, PacketKey, ProtocolError, WireReader, WireWriter};

/// Announces a player to the peer: a stable id and a display name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlayerInfoPacket {
    id: String,
    name: String,
}

impl PlayerInfoPacket {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Packet for PlayerInfoPacket {
    fn key(&self) -> PacketKey {
        keys::PLAYER_INFO
    }

    fn serialize(&self, out: &mut WireWriter) -> Result<(), ProtocolError> {
        out.write_utf(&self.id)?;
        out.write_utf(&self.name)
    }

    fn deserialize(_key: PacketKey, reader: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        let id = reader.read_utf()?;
        let name = reader.read_utf()?;
        Ok(Self { id, name })
    }
}
