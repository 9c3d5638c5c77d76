//! Packet channels for hexlink.
//!
//! A [`Channel`] wraps one duplex byte stream (a TCP socket, or an in-memory
//! pipe in tests) and turns it into a stream of typed packets:
//!
//! - **Sending** is serialized by a lock, so frames from concurrent callers
//!   never interleave on the wire.
//! - **Receiving** runs on a background task started by [`Channel::start`].
//!   Each frame's key selects a deserializer; the decoded packet goes to the
//!   [`ChannelListener`] registered for that key.
//! - **Pinging** is built in: every channel answers ping requests and can
//!   measure its own round-trip time ([`Channel::init_pinging`]).
//!
//! # Feature Flags
//!
//! - `tcp` (default): [`TcpTransport`] and [`Channel::connect`]

#![allow(async_fn_in_trait)]

mod channel;
mod config;
mod error;
mod listener;
mod ping;
#[cfg(feature = "tcp")]
mod tcp;

pub use channel::{Channel, ChannelSender, ChannelState};
pub use config::{ChannelConfig, PingConfig};
pub use error::{ListenerError, TransportError};
pub use listener::{ChannelListener, PacketListener};
pub use ping::{PingPacket, RoundTripTime};
#[cfg(feature = "tcp")]
pub use tcp::TcpTransport;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a channel, used in logs and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(u64);

impl ChannelId {
    /// Creates a `ChannelId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates a process-unique id.
    pub(crate) fn next() -> Self {
        Self(NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chan-{}", self.0)
    }
}

/// Accepts inbound peers and wraps each one in a [`Channel`].
pub trait Transport: Send + Sync + 'static {
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for the next peer and returns an unstarted channel for it.
    async fn accept(&mut self) -> Result<Channel, Self::Error>;

    /// Stops accepting new peers.
    async fn shutdown(&self) -> Result<(), Self::Error>;
}
