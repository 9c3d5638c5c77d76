//! Wire primitives: turning fields into bytes and back.
//!
//! [`WireWriter`] appends big-endian fields to a growable buffer.
//! [`WireReader`] walks a borrowed byte slice and reports
//! [`ProtocolError::Incomplete`] instead of panicking when the slice ends
//! early. The channel relies on that: it hands the reader whatever bytes it
//! has buffered so far, and if decoding runs out it reads more from the
//! socket and starts the frame over.
//!
//! Strings use a `u16` byte-length prefix followed by UTF-8 bytes.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{DeserializerRegistry, Packet, PacketKey, ProtocolError};

// ---------------------------------------------------------------------------
// WireWriter
// ---------------------------------------------------------------------------

/// Appends wire fields to an in-memory buffer.
#[derive(Debug, Default)]
pub struct WireWriter {
    buf: BytesMut,
}

impl WireWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty writer with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn write_i8(&mut self, value: i8) {
        self.buf.put_i8(value);
    }

    /// Writes `1` for `true`, `0` for `false`.
    pub fn write_bool(&mut self, value: bool) {
        self.buf.put_u8(u8::from(value));
    }

    pub fn write_i16(&mut self, value: i16) {
        self.buf.put_i16(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buf.put_u16(value);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.put_i32(value);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.put_u32(value);
    }

    pub fn write_i64(&mut self, value: i64) {
        self.buf.put_i64(value);
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buf.put_u64(value);
    }

    pub fn write_f32(&mut self, value: f32) {
        self.buf.put_f32(value);
    }

    pub fn write_f64(&mut self, value: f64) {
        self.buf.put_f64(value);
    }

    /// Writes a `u16` byte length followed by the UTF-8 bytes.
    ///
    /// # Errors
    /// [`ProtocolError::StringTooLong`] if the string exceeds 65535 bytes.
    pub fn write_utf(&mut self, value: &str) -> Result<(), ProtocolError> {
        let len = u16::try_from(value.len())
            .map_err(|_| ProtocolError::StringTooLong(value.len()))?;
        self.buf.put_u16(len);
        self.buf.put_slice(value.as_bytes());
        Ok(())
    }

    /// Writes a `u32` byte length followed by the raw bytes.
    pub fn write_bytes(&mut self, value: &[u8]) -> Result<(), ProtocolError> {
        let len = u32::try_from(value.len()).map_err(|_| {
            ProtocolError::InvalidMessage(format!(
                "byte field of {} bytes is too long",
                value.len()
            ))
        })?;
        self.buf.put_u32(len);
        self.buf.put_slice(value);
        Ok(())
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Borrows the bytes written so far.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Freezes the buffer into immutable [`Bytes`].
    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }
}

// ---------------------------------------------------------------------------
// WireReader
// ---------------------------------------------------------------------------

/// Reads wire fields from a borrowed byte slice.
///
/// Tracks how many bytes have been consumed so the caller can advance its
/// own buffer by exactly one frame.
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    /// Creates a reader positioned at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Takes the next `n` bytes, or fails with `Incomplete` without moving.
    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        let remaining = self.remaining();
        if remaining < n {
            return Err(ProtocolError::Incomplete {
                needed: n,
                remaining,
            });
        }
        let chunk = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(chunk)
    }

    pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take(1)?.get_u8())
    }

    pub fn read_i8(&mut self) -> Result<i8, ProtocolError> {
        Ok(self.take(1)?.get_i8())
    }

    /// Any non-zero byte reads as `true`.
    pub fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_i16(&mut self) -> Result<i16, ProtocolError> {
        Ok(self.take(2)?.get_i16())
    }

    pub fn read_u16(&mut self) -> Result<u16, ProtocolError> {
        Ok(self.take(2)?.get_u16())
    }

    pub fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        Ok(self.take(4)?.get_i32())
    }

    pub fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        Ok(self.take(4)?.get_u32())
    }

    pub fn read_i64(&mut self) -> Result<i64, ProtocolError> {
        Ok(self.take(8)?.get_i64())
    }

    pub fn read_u64(&mut self) -> Result<u64, ProtocolError> {
        Ok(self.take(8)?.get_u64())
    }

    pub fn read_f32(&mut self) -> Result<f32, ProtocolError> {
        Ok(self.take(4)?.get_f32())
    }

    pub fn read_f64(&mut self) -> Result<f64, ProtocolError> {
        Ok(self.take(8)?.get_f64())
    }

    /// Reads a string written by [`WireWriter::write_utf`].
    pub fn read_utf(&mut self) -> Result<String, ProtocolError> {
        let start = self.pos;
        let len = usize::from(self.read_u16()?);
        let raw = match self.take(len) {
            Ok(raw) => raw,
            Err(e) => {
                // Rewind so a retry after more input sees the prefix again.
                self.pos = start;
                return Err(e);
            }
        };
        std::str::from_utf8(raw)
            .map(str::to_owned)
            .map_err(|_| ProtocolError::InvalidUtf8)
    }

    /// Reads a byte field written by [`WireWriter::write_bytes`].
    pub fn read_bytes(&mut self) -> Result<Vec<u8>, ProtocolError> {
        let start = self.pos;
        let len = self.read_u32()? as usize;
        match self.take(len) {
            Ok(raw) => Ok(raw.to_vec()),
            Err(e) => {
                self.pos = start;
                Err(e)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

/// Encodes one complete frame: the packet's key followed by its payload.
pub fn encode_frame(packet: &dyn Packet) -> Result<Bytes, ProtocolError> {
    let mut out = WireWriter::with_capacity(64);
    out.write_i32(packet.key().get());
    packet.serialize(&mut out)?;
    Ok(out.into_bytes())
}

/// Decodes one frame from the front of `data`.
///
/// Returns the packet and the number of bytes it occupied. Fails with
/// [`ProtocolError::Incomplete`] when `data` holds only part of a frame,
/// and with [`ProtocolError::UnknownPacketKind`] when the key has no
/// deserializer.
pub fn decode_frame(
    registry: &DeserializerRegistry,
    data: &[u8],
) -> Result<(Box<dyn Packet>, usize), ProtocolError> {
    let mut reader = WireReader::new(data);
    let key = PacketKey::new(reader.read_i32()?);
    let packet = registry.deserialize(key, &mut reader)?;
    Ok((packet, reader.position()))
}
