//! # hexlink
//!
//! Peer-to-peer synchronization core for lockstep multiplayer games.
//!
//! Every peer keeps its own copy of the simulation. Player actions travel
//! between peers as tasks over a packet channel and are applied to each copy
//! in the same order, so the copies stay in step. This crate wires the
//! layers together:
//!
//! - [`hexlink_protocol`]: packets, wire primitives, deserializer registry
//! - [`hexlink_transport`]: the framed channel, listeners, pinging
//! - [`hexlink_command`]: tasks and the executor that applies them
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hexlink::prelude::*;
//!
//! # async fn run() -> Result<(), HexlinkError> {
//! hexlink::init_tracing();
//!
//! let mut session = PeerSession::builder()
//!     .player(PlayerInfoPacket::new("p-1", "Alice"))
//!     .player_id(PlayerId(1))
//!     .connect("127.0.0.1:7777")
//!     .await?;
//!
//! session.submit(GuiTask::QuickSave).await?;
//! let tasks = session.take_tasks();
//! // Feed `tasks` to a GuiTaskExecutor built over your simulation:
//! // let mut executor = session.executor(my_grid);
//! // executor.run(&mut tasks.unwrap()).await;
//! # Ok(())
//! # }
//! ```

mod error;
mod session;

pub use error::HexlinkError;
pub use session::{PeerSession, PeerSessionBuilder, SessionConfig};

pub use hexlink_command;
pub use hexlink_protocol;
pub use hexlink_transport;

/// Installs a `tracing` subscriber that prints to stderr.
///
/// The filter comes from `RUST_LOG` and falls back to `info`. Does nothing
/// if a global subscriber is already set.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init();
}

/// Common imports for applications built on hexlink.
pub mod prelude {
    pub use crate::{HexlinkError, PeerSession, PeerSessionBuilder, SessionConfig};

    pub use hexlink_command::{
        BuildingControl, BuildingType, DispatcherConfig, GarrisonControl, GuiTask,
        GuiTaskExecutor, MaterialProductionControl, MaterialType, MovableControl, MovableId,
        MovableType, MoveSpreadConfig, PartitionId, PlayerId, Position, Priority, SimulationGrid,
        SoldierType, StockControl, TaskPacket, TradingControl,
    };
    pub use hexlink_protocol::{keys, Packet, PacketKey, PlayerInfoPacket};
    pub use hexlink_transport::{
        Channel, ChannelConfig, ChannelListener, PacketListener, PingConfig, RoundTripTime,
        Transport,
    };

    #[cfg(feature = "tcp")]
    pub use hexlink_transport::TcpTransport;
}
