//! The packet channel: framed, typed messaging over one duplex stream.
//!
//! # Lifecycle
//!
//! ```text
//! Created ──start()──► Started ──close() / EOF / fatal frame──► Closed
//!    │                                                            ▲
//!    └──────────────────────────close()───────────────────────────┘
//! ```
//!
//! `Closed` is terminal. Sending is allowed in `Created` and `Started` and
//! fails with [`TransportError::ConnectionClosed`] afterwards.
//!
//! # Concurrency
//!
//! - The write half sits behind an async mutex. A frame is encoded in full
//!   before the lock is taken, then written and flushed while holding it,
//!   so concurrent senders never interleave bytes.
//! - The read half is owned by a single receive task. Listeners run inline
//!   on that task, in wire order.
//! - The registry is a plain `RwLock`; it is never held across an await or
//!   while a listener runs, so listeners may register and remove listeners.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use bytes::{Buf, BytesMut};
use hexlink_protocol::{decode_frame, encode_frame, DeserializerRegistry, Packet, PacketKey};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;

use crate::ping::PingListener;
use crate::{ChannelConfig, ChannelId, ChannelListener, RoundTripTime, TransportError};

type BoxReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Where a channel is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Wrapping a connected stream; the receive loop is not running yet.
    Created,
    /// The receive loop is running.
    Started,
    /// Terminal. The stream has been released.
    Closed,
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Registry {
    deserializers: DeserializerRegistry,
    listeners: HashMap<PacketKey, Weak<dyn ChannelListener>>,
}

struct Shared {
    id: ChannelId,
    config: ChannelConfig,
    writer: tokio::sync::Mutex<Option<BoxWriter>>,
    reader: Mutex<Option<BoxReader>>,
    registry: RwLock<Registry>,
    state: watch::Sender<ChannelState>,
    finished: watch::Sender<bool>,
}

impl Shared {
    fn registry(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn registry_mut(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn reader(&self) -> MutexGuard<'_, Option<BoxReader>> {
        self.reader.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    fn is_closed(&self) -> bool {
        self.state() == ChannelState::Closed
    }

    /// Moves to `Closed`. Returns `false` if the channel already was.
    fn close(&self) -> bool {
        if self.state.send_replace(ChannelState::Closed) == ChannelState::Closed {
            return false;
        }

        {
            let mut registry = self.registry_mut();
            registry.listeners.clear();
            registry.deserializers.clear();
        }

        // Never started: nothing else will release the read half or
        // signal `join`.
        if self.reader().take().is_some() {
            self.finished.send_replace(true);
        }

        // A write in flight keeps the writer and releases it itself once
        // the frame is out.
        if let Ok(mut writer) = self.writer.try_lock() {
            writer.take();
        }

        tracing::debug!(channel = %self.id, "channel closed");
        true
    }

    /// Encodes `packet` and hands the frame to a spawned write.
    ///
    /// The write runs to completion even if the caller stops waiting, so a
    /// cancelled send never leaves part of a frame on the stream.
    async fn send(self: &Arc<Self>, packet: &dyn Packet) -> Result<(), TransportError> {
        let frame = encode_frame(packet)?;
        if self.is_closed() {
            return Err(TransportError::ConnectionClosed(self.id));
        }

        let key = packet.key();
        let shared = Arc::clone(self);
        let write = tokio::spawn(async move { shared.write_frame(&frame).await });
        match write.await {
            Ok(Ok(bytes)) => {
                tracing::trace!(channel = %self.id, %key, bytes, "frame sent");
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(e) => Err(TransportError::SendFailed(io::Error::other(e))),
        }
    }

    async fn write_frame(&self, frame: &[u8]) -> Result<usize, TransportError> {
        let mut guard = self.writer.lock().await;
        let result = match guard.as_mut() {
            Some(writer) if !self.is_closed() => {
                let written = match writer.write_all(frame).await {
                    Ok(()) => writer.flush().await,
                    Err(e) => Err(e),
                };
                written
                    .map(|()| frame.len())
                    .map_err(TransportError::SendFailed)
            }
            _ => Err(TransportError::ConnectionClosed(self.id)),
        };

        // `close` skips a writer that is busy; release it here instead.
        if self.is_closed() {
            if let Some(mut writer) = guard.take() {
                if let Err(e) = writer.shutdown().await {
                    tracing::debug!(channel = %self.id, error = %e, "shutdown of write half failed");
                }
            }
        }
        result
    }

    /// Decodes and delivers every complete frame at the front of `buf`.
    fn dispatch_buffered(&self, buf: &mut BytesMut) -> Result<(), TransportError> {
        while !buf.is_empty() && !self.is_closed() {
            let decoded = {
                let registry = self.registry();
                decode_frame(&registry.deserializers, &buf[..])
            };
            match decoded {
                Ok((packet, used)) => {
                    buf.advance(used);
                    self.deliver(packet);
                }
                Err(e) if e.is_incomplete() => {
                    if buf.len() > self.config.max_frame_size {
                        return Err(TransportError::FrameTooLarge {
                            limit: self.config.max_frame_size,
                        });
                    }
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn deliver(&self, packet: Box<dyn Packet>) {
        let key = packet.key();
        let listener = self.registry().listeners.get(&key).and_then(Weak::upgrade);

        let Some(listener) = listener else {
            tracing::warn!(channel = %self.id, %key, "no listener for packet, dropping it");
            return;
        };
        if let Err(e) = listener.receive(packet) {
            tracing::warn!(channel = %self.id, %key, error = %e, "listener failed");
        }
    }
}

/// Read errors that mean the peer went away rather than that something
/// broke.
fn is_disconnect(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
    )
}

async fn receive_loop(shared: Arc<Shared>, mut reader: BoxReader) {
    let mut state_rx = shared.state.subscribe();
    let mut buf = BytesMut::with_capacity(shared.config.read_buffer_capacity);

    tracing::debug!(channel = %shared.id, "receive loop started");

    let failure = loop {
        if let Err(e) = shared.dispatch_buffered(&mut buf) {
            break Some(e);
        }

        tokio::select! {
            biased;

            _ = state_rx.wait_for(|state| *state == ChannelState::Closed) => break None,

            read = reader.read_buf(&mut buf) => match read {
                Ok(0) => break None,
                Ok(_) => {}
                Err(e) if matches!(e.kind(), io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock) => {}
                Err(e) if is_disconnect(e.kind()) => break None,
                Err(e) => break Some(TransportError::ReceiveFailed(e)),
            },
        }
    };

    match &failure {
        Some(e) => tracing::error!(channel = %shared.id, error = %e, "receive loop failed"),
        None => tracing::debug!(channel = %shared.id, "receive loop finished"),
    }

    shared.close();
    drop(reader);
    let writer = shared.writer.lock().await.take();
    if let Some(mut writer) = writer {
        if let Err(e) = writer.shutdown().await {
            tracing::debug!(channel = %shared.id, error = %e, "shutdown of write half failed");
        }
    }
    shared.finished.send_replace(true);

    tracing::info!(channel = %shared.id, "channel shut down");
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// A logical packet connection to one peer.
///
/// Dropping the channel closes it. Use [`sender`](Self::sender) for a
/// cloneable handle that can send from other tasks.
pub struct Channel {
    shared: Arc<Shared>,
    ping: Arc<PingListener>,
}

impl Channel {
    /// Wraps an already-connected stream with the default configuration.
    pub fn new<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        Self::with_config(stream, ChannelConfig::default())
    }

    /// Wraps an already-connected stream.
    ///
    /// The channel starts in [`ChannelState::Created`]: packets can be sent
    /// right away, but nothing is read until [`start`](Self::start).
    pub fn with_config<S>(stream: S, config: ChannelConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let (state, _) = watch::channel(ChannelState::Created);
        let (finished, _) = watch::channel(false);

        let ping_config = config.ping.clone();
        let shared = Arc::new(Shared {
            id: ChannelId::next(),
            config,
            writer: tokio::sync::Mutex::new(Some(Box::new(writer))),
            reader: Mutex::new(Some(Box::new(reader))),
            registry: RwLock::new(Registry::default()),
            state,
            finished,
        });

        let sender = ChannelSender {
            shared: Arc::clone(&shared),
        };
        let ping = Arc::new(PingListener::new(sender, ping_config));
        let channel = Self { shared, ping };
        channel.register_listener(&channel.ping);

        tracing::debug!(channel = %channel.shared.id, "channel created");
        channel
    }

    /// Connects to `addr` over TCP with the default configuration.
    #[cfg(feature = "tcp")]
    pub async fn connect(addr: impl tokio::net::ToSocketAddrs) -> Result<Self, TransportError> {
        Self::connect_with_config(addr, ChannelConfig::default()).await
    }

    /// Connects to `addr` over TCP.
    #[cfg(feature = "tcp")]
    pub async fn connect_with_config(
        addr: impl tokio::net::ToSocketAddrs,
        config: ChannelConfig,
    ) -> Result<Self, TransportError> {
        let stream = tokio::net::TcpStream::connect(addr)
            .await
            .map_err(TransportError::ConnectFailed)?;
        stream.set_nodelay(true).map_err(TransportError::ConnectFailed)?;
        if let Ok(peer) = stream.peer_addr() {
            tracing::info!(%peer, "connected");
        }
        Ok(Self::with_config(stream, config))
    }

    pub fn id(&self) -> ChannelId {
        self.shared.id
    }

    pub fn state(&self) -> ChannelState {
        self.shared.state()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Returns a cloneable handle for sending on this channel.
    pub fn sender(&self) -> ChannelSender {
        ChannelSender {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Spawns the receive loop. Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// [`TransportError::AlreadyStarted`] on a second call, or
    /// [`TransportError::ConnectionClosed`] if the channel was closed first.
    pub fn start(&self) -> Result<(), TransportError> {
        let reader = self.shared.reader().take();
        let Some(reader) = reader else {
            return Err(if self.is_closed() {
                TransportError::ConnectionClosed(self.shared.id)
            } else {
                TransportError::AlreadyStarted(self.shared.id)
            });
        };

        self.shared.state.send_if_modified(|state| {
            if *state == ChannelState::Created {
                *state = ChannelState::Started;
                true
            } else {
                false
            }
        });

        tokio::spawn(receive_loop(Arc::clone(&self.shared), reader));
        Ok(())
    }

    /// Frames `packet` and writes it atomically.
    ///
    /// The frame is written whole even if this future is dropped before it
    /// resolves; a dropped send simply loses its result.
    ///
    /// # Errors
    /// [`TransportError::ConnectionClosed`] once the channel is closed,
    /// [`TransportError::SendFailed`] if the write itself fails. A failed
    /// write does not close the channel; the caller decides.
    pub async fn send(&self, packet: &dyn Packet) -> Result<(), TransportError> {
        self.shared.send(packet).await
    }

    /// Routes every key `listener` claims to it, replacing earlier
    /// listeners for those keys, and installs its deserializers.
    ///
    /// The channel keeps only a weak reference: once the caller drops its
    /// last `Arc`, frames for those keys are decoded and dropped.
    pub fn register_listener<L>(&self, listener: &Arc<L>)
    where
        L: ChannelListener + 'static,
    {
        let keys = listener.keys();
        let deserializers = listener.deserializers();
        let weak: Weak<dyn ChannelListener> = Arc::downgrade(listener) as Weak<dyn ChannelListener>;

        let mut registry = self.shared.registry_mut();
        registry.deserializers.extend(&deserializers);
        for key in &keys {
            registry.listeners.insert(*key, weak.clone());
        }
        drop(registry);

        tracing::debug!(channel = %self.shared.id, ?keys, "listener registered");
    }

    /// Stops routing `key` to its listener. Returns `true` if one was
    /// registered.
    ///
    /// The key's deserializer stays installed, so later frames for it are
    /// still consumed whole and the stream stays aligned.
    pub fn remove_listener(&self, key: PacketKey) -> bool {
        let removed = self.shared.registry_mut().listeners.remove(&key).is_some();
        if removed {
            tracing::debug!(channel = %self.shared.id, %key, "listener removed");
        }
        removed
    }

    /// Closes the channel. Idempotent, and safe to call while the receive
    /// loop is blocked in a read.
    ///
    /// A frame being written when the channel closes is finished first; that
    /// write then shuts the write half down, so an unstarted channel releases
    /// its stream as soon as the write completes.
    pub fn close(&self) {
        self.shared.close();
    }

    /// Waits until the receive loop has exited and the stream is released.
    ///
    /// Returns immediately for a channel that was closed without ever
    /// being started.
    pub async fn join(&self) {
        let mut finished = self.shared.finished.subscribe();
        // The sender lives in `self.shared`, so this cannot fail.
        let _ = finished.wait_for(|done| *done).await;
    }

    /// The current round-trip measurement.
    pub fn round_trip_time(&self) -> RoundTripTime {
        self.ping.round_trip_time()
    }

    /// A receiver that sees every new round-trip sample.
    pub fn subscribe_round_trip_time(&self) -> watch::Receiver<RoundTripTime> {
        self.ping.subscribe()
    }

    /// Sends the first ping request. With periodic pinging enabled, the
    /// response to each request schedules the next one.
    ///
    /// Does nothing while a request is still unanswered, so calling this
    /// again never starts a second ping loop.
    pub async fn init_pinging(&self) -> Result<(), TransportError> {
        let Some(request) = self.ping.begin_request() else {
            tracing::debug!(channel = %self.shared.id, "ping already in flight");
            return Ok(());
        };
        tracing::debug!(channel = %self.shared.id, "pinging started");
        let sent = self.shared.send(&request).await;
        if sent.is_err() {
            self.ping.abandon_request();
        }
        sent
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.shared.close();
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.shared.id)
            .field("state", &self.shared.state())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// ChannelSender
// ---------------------------------------------------------------------------

/// A cloneable send-only handle to a [`Channel`].
///
/// Outliving the channel is fine: once it is closed, sends fail with
/// [`TransportError::ConnectionClosed`].
#[derive(Clone)]
pub struct ChannelSender {
    shared: Arc<Shared>,
}

impl ChannelSender {
    pub fn id(&self) -> ChannelId {
        self.shared.id
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// See [`Channel::send`].
    pub async fn send(&self, packet: &dyn Packet) -> Result<(), TransportError> {
        self.shared.send(packet).await
    }
}

impl fmt::Debug for ChannelSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelSender")
            .field("id", &self.shared.id)
            .finish_non_exhaustive()
    }
}
