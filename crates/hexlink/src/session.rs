//! `PeerSession` builder and session wiring.
//!
//! A session ties the layers together for one peer connection:
//! channel → task sequencer → executor queue. Every peer builds its own
//! session; nothing here distinguishes the side that connected from the
//! side that accepted.
//!
//! Tasks from both players reach both executors in the same order. Ties are
//! broken by player id, so the two sessions must use different ids.

use std::sync::Arc;

use hexlink_command::{
    DispatcherConfig, GuiTask, GuiTaskExecutor, PlayerId, SimulationGrid, TaskListener, TaskPacket,
    TaskSequencer,
};
use hexlink_protocol::{keys, PlayerInfoPacket};
use hexlink_transport::{
    Channel, ChannelConfig, ChannelListener, ChannelSender, PacketListener, RoundTripTime,
    Transport, TransportError,
};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};

use crate::HexlinkError;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for a [`PeerSession`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Settings for the underlying channel, including pinging.
    pub channel: ChannelConfig,

    /// Settings for executors built with [`PeerSession::executor`].
    pub dispatcher: DispatcherConfig,

    /// Send the first ping as soon as the session is established.
    pub start_pinging: bool,

    /// Queue tasks submitted on this peer for local execution too, so the
    /// local simulation applies the same tasks as the remote one. Local
    /// tasks are queued once the peer has confirmed their place in the
    /// shared order.
    pub apply_local_tasks: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            channel: ChannelConfig::default(),
            dispatcher: DispatcherConfig::default(),
            start_pinging: true,
            apply_local_tasks: true,
        }
    }
}

// ---------------------------------------------------------------------------
// PeerSessionBuilder
// ---------------------------------------------------------------------------

/// Builder for a [`PeerSession`].
///
/// # Example
///
/// ```rust,no_run
/// use hexlink::prelude::*;
///
/// # async fn run() -> Result<(), HexlinkError> {
/// let session = PeerSession::builder()
///     .player(PlayerInfoPacket::new("p-1", "Alice"))
///     .player_id(PlayerId(1))
///     .connect("127.0.0.1:7777")
///     .await?;
/// let peer = session.wait_for_peer().await?;
/// println!("playing against {}", peer.name());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct PeerSessionBuilder {
    config: SessionConfig,
    player: Option<PlayerInfoPacket>,
    player_id: PlayerId,
}

impl PeerSessionBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the session configuration.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Announces `info` to the peer once the session is up.
    pub fn player(mut self, info: PlayerInfoPacket) -> Self {
        self.player = Some(info);
        self
    }

    /// Sets the player that tasks submitted on this session act for. The
    /// peer must use a different id.
    pub fn player_id(mut self, id: PlayerId) -> Self {
        self.player_id = id;
        self
    }

    /// Builds a session over an already-connected stream.
    pub async fn attach<S>(self, stream: S) -> Result<PeerSession, HexlinkError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let channel = Channel::with_config(stream, self.config.channel.clone());
        self.establish(channel).await
    }

    /// Connects to `addr` over TCP and builds a session on the connection.
    #[cfg(feature = "tcp")]
    pub async fn connect(
        self,
        addr: impl tokio::net::ToSocketAddrs,
    ) -> Result<PeerSession, HexlinkError> {
        let channel = Channel::connect_with_config(addr, self.config.channel.clone()).await?;
        self.establish(channel).await
    }

    /// Waits for the next peer on `transport` and builds a session for it.
    ///
    /// The transport's own channel configuration applies to the accepted
    /// channel.
    pub async fn accept<T>(self, transport: &mut T) -> Result<PeerSession, HexlinkError>
    where
        T: Transport<Error = TransportError>,
    {
        let channel = transport.accept().await?;
        self.establish(channel).await
    }

    async fn establish(self, channel: Channel) -> Result<PeerSession, HexlinkError> {
        let (released, queue) = TaskListener::channel();
        let tasks = Arc::new(TaskSequencer::with_local_apply(
            channel.sender(),
            self.player_id,
            released,
            self.config.apply_local_tasks,
        ));
        channel.register_listener(&tasks);

        let (peer_tx, peer_info) = watch::channel(None);
        let player_info = Arc::new(PacketListener::new(
            keys::PLAYER_INFO,
            move |info: PlayerInfoPacket| {
                tracing::info!(peer = %info.id(), name = %info.name(), "peer announced");
                peer_tx.send_replace(Some(info));
                Ok(())
            },
        ));
        channel.register_listener(&player_info);

        channel.start()?;
        if let Some(info) = &self.player {
            channel.send(info).await?;
        }
        if self.config.start_pinging {
            channel.init_pinging().await?;
        }

        tracing::debug!(channel = %channel.id(), player = %self.player_id, "session established");

        let listeners: Vec<Arc<dyn ChannelListener>> = vec![player_info as Arc<dyn ChannelListener>];
        Ok(PeerSession {
            channel,
            tasks,
            _listeners: listeners,
            peer_info,
            local_player: self.player_id,
            config: self.config,
            queue: Some(queue),
        })
    }
}

// ---------------------------------------------------------------------------
// PeerSession
// ---------------------------------------------------------------------------

/// One established peer connection.
///
/// Owns the channel and the listeners registered on it. Tasks arriving from
/// the peer (and, with `apply_local_tasks`, tasks submitted locally) land in
/// a queue the caller takes once with [`take_tasks`](Self::take_tasks) and
/// feeds to a [`GuiTaskExecutor`]. Dropping the session closes the channel.
pub struct PeerSession {
    channel: Channel,
    tasks: Arc<TaskSequencer>,
    // The channel holds listeners weakly; these keep them alive.
    _listeners: Vec<Arc<dyn ChannelListener>>,
    peer_info: watch::Receiver<Option<PlayerInfoPacket>>,
    local_player: PlayerId,
    config: SessionConfig,
    queue: Option<mpsc::UnboundedReceiver<TaskPacket>>,
}

impl PeerSession {
    /// Creates a new builder.
    pub fn builder() -> PeerSessionBuilder {
        PeerSessionBuilder::new()
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn sender(&self) -> ChannelSender {
        self.channel.sender()
    }

    pub fn local_player(&self) -> PlayerId {
        self.local_player
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Sends `task` to the peer on behalf of the local player.
    ///
    /// With `apply_local_tasks` the task is also queued locally, in the
    /// same position among the peer's tasks as on the peer.
    pub async fn submit(&self, task: GuiTask) -> Result<(), HexlinkError> {
        let packet = TaskPacket::gui(self.local_player, task);
        self.tasks.submit(packet).await?;
        Ok(())
    }

    /// Takes the receiving end of the task queue. Returns `None` after the
    /// first call.
    pub fn take_tasks(&mut self) -> Option<mpsc::UnboundedReceiver<TaskPacket>> {
        self.queue.take()
    }

    /// Builds an executor over `grid` with this session's dispatcher
    /// settings.
    pub fn executor<G: SimulationGrid>(&self, grid: G) -> GuiTaskExecutor<G> {
        GuiTaskExecutor::with_config(grid, self.config.dispatcher.clone())
    }

    /// The peer's announcement, if it arrived yet.
    pub fn peer_info(&self) -> Option<PlayerInfoPacket> {
        self.peer_info.borrow().clone()
    }

    /// Waits for the peer's announcement.
    ///
    /// # Errors
    /// [`TransportError::ConnectionClosed`] if the channel ends first.
    pub async fn wait_for_peer(&self) -> Result<PlayerInfoPacket, HexlinkError> {
        let mut peer_info = self.peer_info.clone();
        let announced = async move {
            peer_info
                .wait_for(Option::is_some)
                .await
                .ok()
                .and_then(|info| info.clone())
        };
        tokio::select! {
            Some(info) = announced => return Ok(info),
            () = self.channel.join() => {}
        }
        // The channel may have finished right after the announcement.
        self.peer_info()
            .ok_or_else(|| TransportError::ConnectionClosed(self.channel.id()).into())
    }

    pub fn round_trip_time(&self) -> RoundTripTime {
        self.channel.round_trip_time()
    }

    pub fn subscribe_round_trip_time(&self) -> watch::Receiver<RoundTripTime> {
        self.channel.subscribe_round_trip_time()
    }

    pub fn close(&self) {
        self.channel.close();
    }

    /// Waits until the channel's receive loop has exited.
    pub async fn join(&self) {
        self.channel.join().await;
    }
}

impl std::fmt::Debug for PeerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerSession")
            .field("channel", &self.channel)
            .field("local_player", &self.local_player)
            .finish_non_exhaustive()
    }
}
