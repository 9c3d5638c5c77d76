//! Wire protocol for hexlink.
//!
//! This crate defines what travels between two peers and how it is turned
//! into bytes:
//!
//! - **Packets** ([`Packet`], [`PacketKey`]): self-describing message units.
//!   Every packet carries a numeric key that tells the receiver which
//!   deserializer to use.
//! - **Wire primitives** ([`WireWriter`], [`WireReader`]): big-endian
//!   fixed-width fields and length-prefixed strings.
//! - **Registry** ([`DeserializerRegistry`]): maps a key to the factory
//!   that rebuilds a packet from bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong while encoding or
//!   decoding.
//!
//! # Frame layout
//!
//! ```text
//! ┌──────────────────────┬──────────────────────────────────────┐
//! │ key: i32 big-endian  │ payload (length implied by the key's │
//! │                      │ own deserializer)                    │
//! └──────────────────────┴──────────────────────────────────────┘
//! ```
//!
//! There is no length prefix. A deserializer must consume exactly the bytes
//! its serializer wrote, otherwise the stream desynchronizes for good.
//!
//! # Architecture
//!
//! The protocol layer sits between the channel (raw bytes) and the command
//! layer (typed game actions). It knows nothing about sockets or tasks.
//!
//! ```text
//! Channel (bytes) → Protocol (Packet) → Command (GuiTask)
//! ```

mod codec;
mod error;
mod packet;
mod packets;
mod registry;

pub use codec::{decode_frame, encode_frame, WireReader, WireWriter};
pub use error::ProtocolError;
pub use packet::{keys, AsAny, Packet, PacketKey};
pub use packets::PlayerInfoPacket;
pub use registry::{DeserializeFn, DeserializerRegistry};
