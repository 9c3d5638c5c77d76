//! Round-trip measurement riding on the packet stream.
//!
//! A ping request carries the sender's timestamp; the peer echoes it back
//! unchanged in a ping response. When the response arrives, the elapsed
//! time since that timestamp is one sample. Only the timestamp ties a
//! response to its request, so responses may arrive in any order and
//! interleave freely with application traffic.
//!
//! Timestamps are microseconds since the *sender's* channel was created.
//! The receiver never interprets them, it only echoes them.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use hexlink_protocol::{
    keys, DeserializerRegistry, Packet, PacketKey, ProtocolError, WireReader, WireWriter,
};
use tokio::sync::watch;

use crate::{ChannelListener, ChannelSender, ListenerError, PingConfig};

// ---------------------------------------------------------------------------
// PingPacket
// ---------------------------------------------------------------------------

/// A ping request or response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingPacket {
    key: PacketKey,
    sent_at_us: u64,
}

impl PingPacket {
    /// A request stamped with `sent_at_us`.
    pub fn request(sent_at_us: u64) -> Self {
        Self {
            key: keys::PING_REQUEST,
            sent_at_us,
        }
    }

    /// The echo of a request stamped with `sent_at_us`.
    pub fn response(sent_at_us: u64) -> Self {
        Self {
            key: keys::PING_RESPONSE,
            sent_at_us,
        }
    }

    pub fn is_request(&self) -> bool {
        self.key == keys::PING_REQUEST
    }

    pub fn sent_at_us(&self) -> u64 {
        self.sent_at_us
    }
}

impl Packet for PingPacket {
    fn key(&self) -> PacketKey {
        self.key
    }

    fn serialize(&self, out: &mut WireWriter) -> Result<(), ProtocolError> {
        out.write_u64(self.sent_at_us);
        Ok(())
    }

    fn deserialize(key: PacketKey, reader: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        if key != keys::PING_REQUEST && key != keys::PING_RESPONSE {
            return Err(ProtocolError::InvalidMessage(format!(
                "{key} is not a ping key"
            )));
        }
        let sent_at_us = reader.read_u64()?;
        Ok(Self { key, sent_at_us })
    }
}

// ---------------------------------------------------------------------------
// RoundTripTime
// ---------------------------------------------------------------------------

/// The latest round-trip measurement of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RoundTripTime {
    /// Most recent sample.
    pub latest: Duration,

    /// Exponentially weighted average of all samples.
    pub smoothed: Duration,

    /// Smoothed absolute difference between consecutive samples.
    pub jitter: Duration,

    /// Number of samples taken. Zero means nothing has been measured yet
    /// and the durations above are all zero.
    pub samples: u64,

    /// When the latest sample was taken.
    pub last_updated: Option<Instant>,
}

impl RoundTripTime {
    pub fn is_measured(&self) -> bool {
        self.samples > 0
    }

    /// Folds one sample in. The first sample seeds `smoothed` directly.
    pub(crate) fn record(&mut self, sample: Duration, smoothing: f64, at: Instant) {
        if self.samples == 0 {
            self.smoothed = sample;
            self.jitter = Duration::ZERO;
        } else {
            let delta = if sample > self.latest {
                sample - self.latest
            } else {
                self.latest - sample
            };
            self.smoothed = blend(self.smoothed, sample, smoothing);
            self.jitter = blend(self.jitter, delta, smoothing);
        }
        self.latest = sample;
        self.samples += 1;
        self.last_updated = Some(at);
    }
}

fn blend(old: Duration, new: Duration, weight: f64) -> Duration {
    let mixed = old.as_secs_f64() * (1.0 - weight) + new.as_secs_f64() * weight;
    Duration::from_secs_f64(mixed.max(0.0))
}

// ---------------------------------------------------------------------------
// PingListener
// ---------------------------------------------------------------------------

/// Answers ping requests and records round-trip samples from responses.
///
/// Owned by the channel and registered under both reserved keys. Sending
/// from inside `receive` would stall the receive loop behind the send lock,
/// so echoes and follow-up requests go out on spawned tasks.
///
/// At most one request is outstanding at a time. Only the response to that
/// request schedules the next one, so extra responses (or a second
/// `init_pinging`) never start another ping loop.
pub(crate) struct PingListener {
    sender: ChannelSender,
    epoch: Instant,
    config: PingConfig,
    rtt: watch::Sender<RoundTripTime>,
    outstanding: Arc<Mutex<Option<u64>>>,
}

impl PingListener {
    pub(crate) fn new(sender: ChannelSender, config: PingConfig) -> Self {
        let (rtt, _) = watch::channel(RoundTripTime::default());
        Self {
            sender,
            epoch: Instant::now(),
            config: config.validated(),
            rtt,
            outstanding: Arc::new(Mutex::new(None)),
        }
    }

    pub(crate) fn round_trip_time(&self) -> RoundTripTime {
        *self.rtt.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<RoundTripTime> {
        self.rtt.subscribe()
    }

    /// Stamps a new request, or returns `None` while one is outstanding.
    pub(crate) fn begin_request(&self) -> Option<PingPacket> {
        begin_request(&self.outstanding, self.epoch)
    }

    /// Forgets the outstanding request, e.g. because it could not be sent.
    pub(crate) fn abandon_request(&self) {
        *lock(&self.outstanding) = None;
    }

    pub(crate) fn on_response(&self, sent_at_us: u64) {
        let elapsed_us = micros_since(self.epoch).saturating_sub(sent_at_us);
        let sample = Duration::from_micros(elapsed_us);
        let smoothing = self.config.smoothing;
        let now = Instant::now();
        self.rtt
            .send_modify(|rtt| rtt.record(sample, smoothing, now));
        tracing::trace!(
            channel = %self.sender.id(),
            rtt_us = elapsed_us,
            "round-trip sample"
        );

        {
            let mut outstanding = lock(&self.outstanding);
            if *outstanding != Some(sent_at_us) {
                tracing::debug!(channel = %self.sender.id(), "unsolicited ping response");
                return;
            }
            *outstanding = None;
        }

        if self.config.periodic {
            let sender = self.sender.clone();
            let interval = self.config.interval;
            let epoch = self.epoch;
            let outstanding = Arc::clone(&self.outstanding);
            tokio::spawn(async move {
                tokio::time::sleep(interval).await;
                if sender.is_closed() {
                    return;
                }
                let Some(request) = begin_request(&outstanding, epoch) else {
                    return;
                };
                if let Err(e) = sender.send(&request).await {
                    *lock(&outstanding) = None;
                    tracing::debug!(channel = %sender.id(), error = %e, "ping request not sent");
                }
            });
        }
    }

    fn on_request(&self, sent_at_us: u64) {
        let sender = self.sender.clone();
        tokio::spawn(async move {
            if let Err(e) = sender.send(&PingPacket::response(sent_at_us)).await {
                tracing::debug!(channel = %sender.id(), error = %e, "ping echo not sent");
            }
        });
    }
}

fn lock(outstanding: &Mutex<Option<u64>>) -> MutexGuard<'_, Option<u64>> {
    outstanding.lock().unwrap_or_else(PoisonError::into_inner)
}

fn micros_since(epoch: Instant) -> u64 {
    u64::try_from(epoch.elapsed().as_micros()).unwrap_or(u64::MAX)
}

fn begin_request(outstanding: &Mutex<Option<u64>>, epoch: Instant) -> Option<PingPacket> {
    let mut outstanding = lock(outstanding);
    if outstanding.is_some() {
        return None;
    }
    let sent_at_us = micros_since(epoch);
    *outstanding = Some(sent_at_us);
    Some(PingPacket::request(sent_at_us))
}

impl ChannelListener for PingListener {
    fn keys(&self) -> Vec<PacketKey> {
        vec![keys::PING_REQUEST, keys::PING_RESPONSE]
    }

    fn deserializers(&self) -> DeserializerRegistry {
        let mut registry = DeserializerRegistry::new();
        registry
            .register::<PingPacket>(keys::PING_REQUEST)
            .register::<PingPacket>(keys::PING_RESPONSE);
        registry
    }

    fn receive(&self, packet: Box<dyn Packet>) -> Result<(), ListenerError> {
        let key = packet.key();
        let ping = (*packet)
            .as_any()
            .downcast_ref::<PingPacket>()
            .ok_or(ListenerError::UnexpectedPacket { key })?;
        if ping.is_request() {
            self.on_request(ping.sent_at_us());
        } else {
            self.on_response(ping.sent_at_us());
        }
        Ok(())
    }
}
