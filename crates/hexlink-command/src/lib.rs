//! Command dispatch for hexlink.
//!
//! Players act through tasks. A task is issued on one peer, sent to every
//! peer as a [`TaskPacket`], and executed against each peer's own copy of the
//! simulation. Because every peer applies the same tasks to the same state,
//! all peers converge on the same outcome.
//!
//! # Key types
//!
//! - [`GuiTask`]: the closed set of player actions and their fields
//! - [`TaskPacket`]: the wire packet that carries a task
//! - [`SimulationGrid`]: the capability interface the simulation implements
//! - [`GuiTaskExecutor`]: applies tasks through that interface
//! - [`TaskListener`]: queues tasks arriving on a channel for the executor
//! - [`TaskSequencer`]: gives local and remote tasks one order on both peers
//! - [`DispatcherConfig`]: executor settings (group move spreading)

mod config;
mod error;
mod executor;
mod grid;
mod listener;
mod ring;
mod sequencer;
mod task;
mod types;

pub use config::{DispatcherConfig, MoveSpreadConfig};
pub use error::CommandError;
pub use executor::GuiTaskExecutor;
pub use grid::{
    BuildingControl, GarrisonControl, MaterialProductionControl, MovableControl,
    SimulationGrid, StockControl, TradingControl,
};
pub use listener::TaskListener;
pub use ring::HexRing;
pub use sequencer::{SequencePacket, TaskSequencer};
pub use task::{GuiAction, GuiTask, ProductionAction, SoldierChange, TaskPacket, WaypointType};
pub use types::{
    BuildingType, MaterialType, MovableId, MovableType, PartitionId, PlayerId, Position, Priority,
    SoldierType,
};
