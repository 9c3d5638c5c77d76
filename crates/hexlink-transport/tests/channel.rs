//! Integration tests for the packet channel.
//!
//! Two channels are wired back to back over `tokio::io::duplex`, an
//! in-memory pipe with a small buffer. The small buffer matters: it forces
//! partial reads and writes, so frames regularly arrive split across
//! several reads, the same way they would over a real socket.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use hexlink_protocol::{
    keys, Packet, PacketKey, PlayerInfoPacket, ProtocolError, WireReader, WireWriter,
};
use hexlink_transport::{
    Channel, ChannelConfig, ChannelState, ListenerError, PacketListener, PingConfig, PingPacket,
    TransportError,
};
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

// ===========================================================================
// Test packets
// ===========================================================================

const SEQ: PacketKey = PacketKey::new(10);
const BLOB: PacketKey = PacketKey::new(11);

/// A bare sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Seq(u32);

impl Packet for Seq {
    fn key(&self) -> PacketKey {
        SEQ
    }

    fn serialize(&self, out: &mut WireWriter) -> Result<(), ProtocolError> {
        out.write_u32(self.0);
        Ok(())
    }

    fn deserialize(_key: PacketKey, reader: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Seq(reader.read_u32()?))
    }
}

/// A payload much larger than the pipe buffer, filled with its own id.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Blob {
    id: u8,
    data: Vec<u8>,
}

impl Blob {
    fn new(id: u8, len: usize) -> Self {
        Self {
            id,
            data: vec![id; len],
        }
    }
}

impl Packet for Blob {
    fn key(&self) -> PacketKey {
        BLOB
    }

    fn serialize(&self, out: &mut WireWriter) -> Result<(), ProtocolError> {
        out.write_u8(self.id);
        out.write_bytes(&self.data)
    }

    fn deserialize(_key: PacketKey, reader: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        let id = reader.read_u8()?;
        let data = reader.read_bytes()?;
        Ok(Self { id, data })
    }
}

// ===========================================================================
// Helpers
// ===========================================================================

fn pair() -> (Channel, Channel) {
    pair_with(ChannelConfig::default())
}

fn pair_with(config: ChannelConfig) -> (Channel, Channel) {
    let (a, b) = tokio::io::duplex(64);
    (
        Channel::with_config(a, config.clone()),
        Channel::with_config(b, config),
    )
}

/// A listener that forwards every `P` it receives into a queue.
fn forwarding<P: Packet>(
    key: PacketKey,
) -> (
    Arc<PacketListener<P, impl Fn(P) -> Result<(), ListenerError> + Send + Sync>>,
    mpsc::UnboundedReceiver<P>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let listener = PacketListener::new(key, move |packet: P| {
        tx.send(packet)
            .map_err(|e| ListenerError::Handler(e.to_string()))
    });
    (Arc::new(listener), rx)
}

async fn recv<P>(rx: &mut mpsc::UnboundedReceiver<P>) -> P {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for a packet")
        .expect("listener queue closed")
}

// ===========================================================================
// Ordering
// ===========================================================================

#[tokio::test]
async fn test_packets_arrive_in_order_exactly_once() {
    let (a, b) = pair();
    let (listener, mut rx) = forwarding::<Seq>(SEQ);
    b.register_listener(&listener);
    a.start().unwrap();
    b.start().unwrap();

    for n in 0..200 {
        a.send(&Seq(n)).await.unwrap();
    }
    a.close();
    timeout(WAIT, b.join()).await.expect("peer should shut down");

    let mut seen = Vec::new();
    while let Ok(packet) = rx.try_recv() {
        seen.push(packet.0);
    }
    assert_eq!(seen, (0..200).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_idle_channel_closes_cleanly() {
    let (a, b) = pair();
    let (listener, mut rx) = forwarding::<Seq>(SEQ);
    b.register_listener(&listener);
    a.start().unwrap();
    b.start().unwrap();

    a.close();
    timeout(WAIT, a.join()).await.expect("closer should finish");
    timeout(WAIT, b.join()).await.expect("peer should see EOF");

    assert_eq!(b.state(), ChannelState::Closed);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_frames_larger_than_pipe_buffer_reassemble() {
    let (a, b) = pair();
    let (listener, mut rx) = forwarding::<Blob>(BLOB);
    b.register_listener(&listener);
    a.start().unwrap();
    b.start().unwrap();

    a.send(&Blob::new(9, 10_000)).await.unwrap();
    let blob = recv(&mut rx).await;
    assert_eq!(blob, Blob::new(9, 10_000));
}

// ===========================================================================
// Concurrent senders
// ===========================================================================

#[tokio::test]
async fn test_concurrent_senders_do_not_interleave() {
    let (a, b) = pair();
    let (listener, mut rx) = forwarding::<Blob>(BLOB);
    b.register_listener(&listener);
    a.start().unwrap();
    b.start().unwrap();

    let mut tasks = Vec::new();
    for id in 0..16u8 {
        let sender = a.sender();
        tasks.push(tokio::spawn(async move {
            sender.send(&Blob::new(id, 500)).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let mut ids = Vec::new();
    for _ in 0..16 {
        let blob = recv(&mut rx).await;
        // A corrupted frame would mix bytes from two senders.
        assert!(blob.data.iter().all(|byte| *byte == blob.id));
        assert_eq!(blob.data.len(), 500);
        ids.push(blob.id);
    }
    ids.sort_unstable();
    assert_eq!(ids, (0..16).collect::<Vec<_>>());
}

// ===========================================================================
// Ping
// ===========================================================================

#[tokio::test]
async fn test_ping_measures_round_trip_time() {
    let config = ChannelConfig {
        ping: PingConfig {
            periodic: false,
            ..PingConfig::default()
        },
        ..ChannelConfig::default()
    };
    let (a, b) = pair_with(config);
    a.start().unwrap();
    b.start().unwrap();

    let mut rtt = a.subscribe_round_trip_time();
    a.init_pinging().await.unwrap();
    timeout(WAIT, rtt.wait_for(|rtt| rtt.is_measured()))
        .await
        .expect("no ping response")
        .unwrap();

    let measured = a.round_trip_time();
    assert_eq!(measured.samples, 1);
    assert!(measured.last_updated.is_some());
    // The peer only echoed; it measured nothing itself.
    assert!(!b.round_trip_time().is_measured());
}

#[tokio::test]
async fn test_periodic_ping_survives_interleaved_traffic() {
    let config = ChannelConfig {
        ping: PingConfig {
            periodic: true,
            interval: Duration::from_millis(5),
            ..PingConfig::default()
        },
        ..ChannelConfig::default()
    };
    let (a, b) = pair_with(config);
    let (listener, mut rx) = forwarding::<Seq>(SEQ);
    b.register_listener(&listener);
    a.start().unwrap();
    b.start().unwrap();

    let mut rtt = a.subscribe_round_trip_time();
    a.init_pinging().await.unwrap();
    for n in 0..100 {
        a.send(&Seq(n)).await.unwrap();
        if n % 10 == 0 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    for n in 0..100 {
        assert_eq!(recv(&mut rx).await, Seq(n));
    }
    timeout(WAIT, rtt.wait_for(|rtt| rtt.samples >= 3))
        .await
        .expect("periodic pinging stalled")
        .unwrap();
}

#[tokio::test]
async fn test_repeated_init_pinging_keeps_one_request_in_flight() {
    let config = ChannelConfig {
        ping: PingConfig {
            periodic: false,
            ..PingConfig::default()
        },
        ..ChannelConfig::default()
    };
    let (a, b) = pair_with(config);
    a.start().unwrap();
    b.start().unwrap();

    let mut rtt = a.subscribe_round_trip_time();
    a.init_pinging().await.unwrap();
    a.init_pinging().await.unwrap();
    timeout(WAIT, rtt.wait_for(|rtt| rtt.is_measured()))
        .await
        .expect("no ping response")
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(a.round_trip_time().samples, 1);
}

#[tokio::test]
async fn test_unsolicited_ping_responses_start_no_ping_loop() {
    let config = ChannelConfig {
        ping: PingConfig {
            periodic: true,
            interval: Duration::from_millis(50),
            ..PingConfig::default()
        },
        ..ChannelConfig::default()
    };
    let (a, b) = pair_with(config);
    a.start().unwrap();
    b.start().unwrap();

    let mut rtt = a.subscribe_round_trip_time();
    for _ in 0..5 {
        b.send(&PingPacket::response(0)).await.unwrap();
    }
    timeout(WAIT, rtt.wait_for(|rtt| rtt.samples == 5))
        .await
        .expect("responses not recorded")
        .unwrap();

    // A follow-up request would come back well within this window.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(a.round_trip_time().samples, 5);
}

// ===========================================================================
// Listener management
// ===========================================================================

#[tokio::test]
async fn test_unknown_key_closes_channel() {
    let (a, b) = pair();
    a.start().unwrap();
    b.start().unwrap();

    // `b` has no deserializer for player info, so it cannot tell where the
    // frame ends and must give up on the stream.
    a.send(&PlayerInfoPacket::new("1", "Ann")).await.unwrap();
    timeout(WAIT, b.join()).await.expect("peer should close");
    assert!(b.is_closed());

    timeout(WAIT, a.join()).await.expect("sender should see EOF");
    let err = a.send(&Seq(1)).await.unwrap_err();
    assert!(matches!(err, TransportError::ConnectionClosed(_)));
}

#[tokio::test]
async fn test_removed_listener_frames_are_dropped_without_closing() {
    let (a, b) = pair();
    let (seq_listener, mut seq_rx) = forwarding::<Seq>(SEQ);
    let (info_listener, mut info_rx) = forwarding::<PlayerInfoPacket>(keys::PLAYER_INFO);
    b.register_listener(&seq_listener);
    b.register_listener(&info_listener);
    assert!(b.remove_listener(SEQ));
    a.start().unwrap();
    b.start().unwrap();

    a.send(&Seq(1)).await.unwrap();
    a.send(&PlayerInfoPacket::new("7", "Bo")).await.unwrap();

    // The player info behind the dropped frame still decodes, so the
    // stream stayed aligned.
    let info = recv(&mut info_rx).await;
    assert_eq!(info.name(), "Bo");
    assert!(seq_rx.try_recv().is_err());
    assert!(!b.is_closed());
}

#[tokio::test]
async fn test_dropped_listener_is_not_kept_alive() {
    let (a, b) = pair();
    let (seq_listener, seq_rx) = forwarding::<Seq>(SEQ);
    let (info_listener, mut info_rx) = forwarding::<PlayerInfoPacket>(keys::PLAYER_INFO);
    b.register_listener(&seq_listener);
    b.register_listener(&info_listener);
    drop(seq_listener);
    drop(seq_rx);
    a.start().unwrap();
    b.start().unwrap();

    a.send(&Seq(1)).await.unwrap();
    a.send(&PlayerInfoPacket::new("7", "Bo")).await.unwrap();
    assert_eq!(recv(&mut info_rx).await.id(), "7");
    assert!(!b.is_closed());
}

#[tokio::test]
async fn test_listener_error_does_not_close_channel() {
    let (a, b) = pair();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let listener = Arc::new(PacketListener::new(SEQ, move |seq: Seq| {
        if seq.0 == 0 {
            return Err(ListenerError::Handler("zero is not allowed".into()));
        }
        sink.lock().unwrap().push(seq.0);
        Ok(())
    }));
    let (info_listener, mut info_rx) = forwarding::<PlayerInfoPacket>(keys::PLAYER_INFO);
    b.register_listener(&listener);
    b.register_listener(&info_listener);
    a.start().unwrap();
    b.start().unwrap();

    for n in 0..3 {
        a.send(&Seq(n)).await.unwrap();
    }
    a.send(&PlayerInfoPacket::new("done", "")).await.unwrap();
    recv(&mut info_rx).await;

    assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    assert!(!b.is_closed());
}

#[tokio::test]
async fn test_later_registration_overwrites_key() {
    let (a, b) = pair();
    let (first, mut first_rx) = forwarding::<Seq>(SEQ);
    let (second, mut second_rx) = forwarding::<Seq>(SEQ);
    b.register_listener(&first);
    b.register_listener(&second);
    a.start().unwrap();
    b.start().unwrap();

    a.send(&Seq(5)).await.unwrap();
    assert_eq!(recv(&mut second_rx).await, Seq(5));
    assert!(first_rx.try_recv().is_err());
}

// ===========================================================================
// Lifecycle
// ===========================================================================

#[tokio::test]
async fn test_join_returns_after_close() {
    let (a, _b) = pair();
    a.start().unwrap();
    a.close();
    timeout(WAIT, a.join()).await.expect("join should return");
    assert_eq!(a.state(), ChannelState::Closed);
}

#[tokio::test]
async fn test_oversized_incomplete_frame_closes_channel() {
    let config = ChannelConfig {
        max_frame_size: 256,
        ..ChannelConfig::default()
    };
    let (a, b) = pair_with(config);
    let (listener, _rx) = forwarding::<Blob>(BLOB);
    b.register_listener(&listener);
    a.start().unwrap();
    b.start().unwrap();

    // The peer gives up long before the write would finish, so the write
    // may fail part way through.
    let _ = a.send(&Blob::new(1, 4096)).await;
    timeout(WAIT, b.join()).await.expect("peer should close");
    assert!(b.is_closed());
}

#[tokio::test]
async fn test_sends_before_start_are_delivered_after_start() {
    let (a, b) = pair();
    let (listener, mut rx) = forwarding::<Seq>(SEQ);
    b.register_listener(&listener);
    b.start().unwrap();

    assert_eq!(a.state(), ChannelState::Created);
    a.send(&Seq(42)).await.unwrap();
    assert_eq!(recv(&mut rx).await, Seq(42));
}

#[tokio::test]
async fn test_abandoned_send_still_writes_whole_frame() {
    let (a, b) = tokio::io::duplex(16);
    let (a, b) = (Channel::new(a), Channel::new(b));
    let (listener, mut rx) = forwarding::<PlayerInfoPacket>(keys::PLAYER_INFO);
    b.register_listener(&listener);

    // Nobody reads yet, so the frame cannot fit and the caller gives up.
    let big = PlayerInfoPacket::new("x".repeat(200), "Big");
    let abandoned = timeout(Duration::from_millis(50), a.send(&big)).await;
    assert!(abandoned.is_err());

    b.start().unwrap();
    a.send(&PlayerInfoPacket::new("1", "Ann")).await.unwrap();

    assert_eq!(recv(&mut rx).await, big);
    assert_eq!(recv(&mut rx).await, PlayerInfoPacket::new("1", "Ann"));
    assert!(!b.is_closed());
}

// ===========================================================================
// TCP
// ===========================================================================

#[cfg(feature = "tcp")]
mod tcp {
    use super::*;
    use hexlink_transport::{TcpTransport, Transport};

    #[tokio::test]
    async fn test_tcp_accept_and_exchange() {
        // Port 0 lets the OS pick a free port.
        let mut transport = TcpTransport::bind("127.0.0.1:0").await.unwrap();
        let addr = transport.local_addr().unwrap();

        let server = tokio::spawn(async move { transport.accept().await });
        let client = Channel::connect(addr).await.unwrap();
        let server = server.await.unwrap().unwrap();

        let (listener, mut rx) = forwarding::<PlayerInfoPacket>(keys::PLAYER_INFO);
        server.register_listener(&listener);
        server.start().unwrap();
        client.start().unwrap();

        client
            .send(&PlayerInfoPacket::new("c1", "Client"))
            .await
            .unwrap();
        assert_eq!(recv(&mut rx).await.name(), "Client");

        client.close();
        timeout(WAIT, server.join()).await.expect("server side should close");
    }

    #[tokio::test]
    async fn test_accept_after_shutdown_fails() {
        let mut transport = TcpTransport::bind("127.0.0.1:0").await.unwrap();
        transport.shutdown().await.unwrap();
        assert!(matches!(
            transport.accept().await,
            Err(TransportError::AcceptFailed(_))
        ));
    }
}
