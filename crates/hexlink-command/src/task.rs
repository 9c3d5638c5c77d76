//! Task packets: player-issued actions on the wire.
//!
//! ```text
//! TaskPacket (key TASK)
//! ┌────────────┬────────────────────────────────────────────────┐
//! │ family: u8 │ 0 = Gui:    player: u8, action: u8, fields...  │
//! │            │ 1 = Opaque: kind: u16, len: u32, bytes         │
//! └────────────┴────────────────────────────────────────────────┘
//! ```
//!
//! Selections and other lists carry a `u16` element count. Positions are two
//! `i16`s. Every field is written in declaration order.

use std::fmt;

use hexlink_protocol::{keys, Packet, PacketKey, ProtocolError, WireReader, WireWriter};

use crate::types::wire_enum;
use crate::{BuildingType, MaterialType, MovableId, MovableType, PlayerId, Position, Priority, SoldierType};

// ---------------------------------------------------------------------------
// Action enums
// ---------------------------------------------------------------------------

/// What a production change does to a material's planned output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProductionAction {
    Increase,
    Decrease,
    /// Set the absolute number of future units (the task's `ratio`,
    /// truncated).
    SetProduction,
    SetRatio,
}

wire_enum!(ProductionAction {
    Increase = 0,
    Decrease = 1,
    SetProduction = 2,
    SetRatio = 3,
});

/// How a garrison's soldier count changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoldierChange {
    /// Request soldiers until every slot is filled.
    Full,
    /// Request one more soldier of the given type.
    More,
    /// Release everyone but one soldier.
    One,
    /// Release one soldier of the given type.
    Less,
}

wire_enum!(SoldierChange {
    Full = 0,
    More = 1,
    One = 2,
    Less = 3,
});

/// Which leg of a trade route a waypoint sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaypointType {
    Waypoint1,
    Waypoint2,
    Waypoint3,
    Destination,
}

wire_enum!(WaypointType {
    Waypoint1 = 0,
    Waypoint2 = 1,
    Waypoint3 = 2,
    Destination = 3,
});

// ---------------------------------------------------------------------------
// GuiTask
// ---------------------------------------------------------------------------

/// The kind of a [`GuiTask`], without its fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuiAction {
    SetWorkArea,
    Build,
    MoveTo,
    QuickSave,
    DestroyBuilding,
    DestroyMovables,
    StartWorking,
    StopWorking,
    Convert,
    SetBuildingPriority,
    SetMaterialDistributionSettings,
    SetMaterialPriorities,
    UpgradeSoldiers,
    ChangeTrading,
    SetTradingWaypoint,
    SetMaterialProduction,
    ChangeTowerSoldiers,
    SetAcceptedStockMaterial,
}

wire_enum!(GuiAction {
    SetWorkArea = 0,
    Build = 1,
    MoveTo = 2,
    QuickSave = 3,
    DestroyBuilding = 4,
    DestroyMovables = 5,
    StartWorking = 6,
    StopWorking = 7,
    Convert = 8,
    SetBuildingPriority = 9,
    SetMaterialDistributionSettings = 10,
    SetMaterialPriorities = 11,
    UpgradeSoldiers = 12,
    ChangeTrading = 13,
    SetTradingWaypoint = 14,
    SetMaterialProduction = 15,
    ChangeTowerSoldiers = 16,
    SetAcceptedStockMaterial = 17,
});

impl fmt::Display for GuiAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One player action, with exactly the fields needed to replay it on every
/// peer.
#[derive(Debug, Clone, PartialEq)]
pub enum GuiTask {
    /// Move the work area of the building at `building` to `center`.
    SetWorkArea { building: Position, center: Position },
    Build {
        position: Position,
        building_type: BuildingType,
    },
    MoveTo {
        target: Position,
        selection: Vec<MovableId>,
    },
    QuickSave,
    DestroyBuilding { position: Position },
    DestroyMovables { selection: Vec<MovableId> },
    StartWorking { selection: Vec<MovableId> },
    StopWorking { selection: Vec<MovableId> },
    Convert {
        selection: Vec<MovableId>,
        target_type: MovableType,
    },
    SetBuildingPriority {
        position: Position,
        priority: Priority,
    },
    /// Per-consumer probabilities for distributing `material` from the
    /// manager at `manager`.
    SetMaterialDistributionSettings {
        manager: Position,
        material: MaterialType,
        probabilities: Vec<f32>,
    },
    /// Materials in priority order, highest first.
    SetMaterialPriorities {
        manager: Position,
        materials: Vec<MaterialType>,
    },
    UpgradeSoldiers { soldier_type: SoldierType },
    /// Change how much of `material` a trading building requests.
    /// `relative` adds `amount` instead of setting it.
    ChangeTrading {
        building: Position,
        material: MaterialType,
        amount: i32,
        relative: bool,
    },
    SetTradingWaypoint {
        building: Position,
        waypoint: WaypointType,
        position: Position,
    },
    SetMaterialProduction {
        position: Position,
        material: MaterialType,
        action: ProductionAction,
        ratio: f32,
    },
    ChangeTowerSoldiers {
        building: Position,
        change: SoldierChange,
        soldier_type: SoldierType,
    },
    /// With `local` set, applies to the stock building at `position` only;
    /// otherwise to the whole grid region around `position`.
    SetAcceptedStockMaterial {
        position: Position,
        material: MaterialType,
        accepted: bool,
        local: bool,
    },
}

impl GuiTask {
    pub fn action(&self) -> GuiAction {
        match self {
            Self::SetWorkArea { .. } => GuiAction::SetWorkArea,
            Self::Build { .. } => GuiAction::Build,
            Self::MoveTo { .. } => GuiAction::MoveTo,
            Self::QuickSave => GuiAction::QuickSave,
            Self::DestroyBuilding { .. } => GuiAction::DestroyBuilding,
            Self::DestroyMovables { .. } => GuiAction::DestroyMovables,
            Self::StartWorking { .. } => GuiAction::StartWorking,
            Self::StopWorking { .. } => GuiAction::StopWorking,
            Self::Convert { .. } => GuiAction::Convert,
            Self::SetBuildingPriority { .. } => GuiAction::SetBuildingPriority,
            Self::SetMaterialDistributionSettings { .. } => {
                GuiAction::SetMaterialDistributionSettings
            }
            Self::SetMaterialPriorities { .. } => GuiAction::SetMaterialPriorities,
            Self::UpgradeSoldiers { .. } => GuiAction::UpgradeSoldiers,
            Self::ChangeTrading { .. } => GuiAction::ChangeTrading,
            Self::SetTradingWaypoint { .. } => GuiAction::SetTradingWaypoint,
            Self::SetMaterialProduction { .. } => GuiAction::SetMaterialProduction,
            Self::ChangeTowerSoldiers { .. } => GuiAction::ChangeTowerSoldiers,
            Self::SetAcceptedStockMaterial { .. } => GuiAction::SetAcceptedStockMaterial,
        }
    }

    fn write(&self, out: &mut WireWriter) -> Result<(), ProtocolError> {
        out.write_u8(self.action().to_wire());
        match self {
            Self::SetWorkArea { building, center } => {
                building.write(out);
                center.write(out);
            }
            Self::Build {
                position,
                building_type,
            } => {
                position.write(out);
                out.write_u8(building_type.0);
            }
            Self::MoveTo { target, selection } => {
                target.write(out);
                write_selection(out, selection)?;
            }
            Self::QuickSave => {}
            Self::DestroyBuilding { position } => position.write(out),
            Self::DestroyMovables { selection }
            | Self::StartWorking { selection }
            | Self::StopWorking { selection } => write_selection(out, selection)?,
            Self::Convert {
                selection,
                target_type,
            } => {
                write_selection(out, selection)?;
                out.write_u8(target_type.0);
            }
            Self::SetBuildingPriority { position, priority } => {
                position.write(out);
                out.write_u8(priority.to_wire());
            }
            Self::SetMaterialDistributionSettings {
                manager,
                material,
                probabilities,
            } => {
                manager.write(out);
                out.write_u8(material.0);
                out.write_u16(list_len(probabilities.len())?);
                for p in probabilities {
                    out.write_f32(*p);
                }
            }
            Self::SetMaterialPriorities { manager, materials } => {
                manager.write(out);
                out.write_u16(list_len(materials.len())?);
                for m in materials {
                    out.write_u8(m.0);
                }
            }
            Self::UpgradeSoldiers { soldier_type } => out.write_u8(soldier_type.to_wire()),
            Self::ChangeTrading {
                building,
                material,
                amount,
                relative,
            } => {
                building.write(out);
                out.write_u8(material.0);
                out.write_i32(*amount);
                out.write_bool(*relative);
            }
            Self::SetTradingWaypoint {
                building,
                waypoint,
                position,
            } => {
                building.write(out);
                out.write_u8(waypoint.to_wire());
                position.write(out);
            }
            Self::SetMaterialProduction {
                position,
                material,
                action,
                ratio,
            } => {
                position.write(out);
                out.write_u8(material.0);
                out.write_u8(action.to_wire());
                out.write_f32(*ratio);
            }
            Self::ChangeTowerSoldiers {
                building,
                change,
                soldier_type,
            } => {
                building.write(out);
                out.write_u8(change.to_wire());
                out.write_u8(soldier_type.to_wire());
            }
            Self::SetAcceptedStockMaterial {
                position,
                material,
                accepted,
                local,
            } => {
                position.write(out);
                out.write_u8(material.0);
                out.write_bool(*accepted);
                out.write_bool(*local);
            }
        }
        Ok(())
    }

    fn read(reader: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        let action = GuiAction::from_wire(reader.read_u8()?)?;
        let task = match action {
            GuiAction::SetWorkArea => Self::SetWorkArea {
                building: Position::read(reader)?,
                center: Position::read(reader)?,
            },
            GuiAction::Build => Self::Build {
                position: Position::read(reader)?,
                building_type: BuildingType(reader.read_u8()?),
            },
            GuiAction::MoveTo => Self::MoveTo {
                target: Position::read(reader)?,
                selection: read_selection(reader)?,
            },
            GuiAction::QuickSave => Self::QuickSave,
            GuiAction::DestroyBuilding => Self::DestroyBuilding {
                position: Position::read(reader)?,
            },
            GuiAction::DestroyMovables => Self::DestroyMovables {
                selection: read_selection(reader)?,
            },
            GuiAction::StartWorking => Self::StartWorking {
                selection: read_selection(reader)?,
            },
            GuiAction::StopWorking => Self::StopWorking {
                selection: read_selection(reader)?,
            },
            GuiAction::Convert => Self::Convert {
                selection: read_selection(reader)?,
                target_type: MovableType(reader.read_u8()?),
            },
            GuiAction::SetBuildingPriority => Self::SetBuildingPriority {
                position: Position::read(reader)?,
                priority: Priority::from_wire(reader.read_u8()?)?,
            },
            GuiAction::SetMaterialDistributionSettings => {
                let manager = Position::read(reader)?;
                let material = MaterialType(reader.read_u8()?);
                let count = reader.read_u16()?;
                let probabilities = (0..count)
                    .map(|_| reader.read_f32())
                    .collect::<Result<_, _>>()?;
                Self::SetMaterialDistributionSettings {
                    manager,
                    material,
                    probabilities,
                }
            }
            GuiAction::SetMaterialPriorities => {
                let manager = Position::read(reader)?;
                let count = reader.read_u16()?;
                let materials = (0..count)
                    .map(|_| reader.read_u8().map(MaterialType))
                    .collect::<Result<_, _>>()?;
                Self::SetMaterialPriorities { manager, materials }
            }
            GuiAction::UpgradeSoldiers => Self::UpgradeSoldiers {
                soldier_type: SoldierType::from_wire(reader.read_u8()?)?,
            },
            GuiAction::ChangeTrading => Self::ChangeTrading {
                building: Position::read(reader)?,
                material: MaterialType(reader.read_u8()?),
                amount: reader.read_i32()?,
                relative: reader.read_bool()?,
            },
            GuiAction::SetTradingWaypoint => Self::SetTradingWaypoint {
                building: Position::read(reader)?,
                waypoint: WaypointType::from_wire(reader.read_u8()?)?,
                position: Position::read(reader)?,
            },
            GuiAction::SetMaterialProduction => Self::SetMaterialProduction {
                position: Position::read(reader)?,
                material: MaterialType(reader.read_u8()?),
                action: ProductionAction::from_wire(reader.read_u8()?)?,
                ratio: reader.read_f32()?,
            },
            GuiAction::ChangeTowerSoldiers => Self::ChangeTowerSoldiers {
                building: Position::read(reader)?,
                change: SoldierChange::from_wire(reader.read_u8()?)?,
                soldier_type: SoldierType::from_wire(reader.read_u8()?)?,
            },
            GuiAction::SetAcceptedStockMaterial => Self::SetAcceptedStockMaterial {
                position: Position::read(reader)?,
                material: MaterialType(reader.read_u8()?),
                accepted: reader.read_bool()?,
                local: reader.read_bool()?,
            },
        };
        Ok(task)
    }
}

fn list_len(len: usize) -> Result<u16, ProtocolError> {
    u16::try_from(len)
        .map_err(|_| ProtocolError::InvalidMessage(format!("list of {len} entries is too long")))
}

fn write_selection(out: &mut WireWriter, selection: &[MovableId]) -> Result<(), ProtocolError> {
    out.write_u16(list_len(selection.len())?);
    for id in selection {
        out.write_i32(id.0);
    }
    Ok(())
}

fn read_selection(reader: &mut WireReader<'_>) -> Result<Vec<MovableId>, ProtocolError> {
    let count = reader.read_u16()?;
    (0..count)
        .map(|_| reader.read_i32().map(MovableId))
        .collect()
}

// ---------------------------------------------------------------------------
// TaskPacket
// ---------------------------------------------------------------------------

const FAMILY_GUI: u8 = 0;
const FAMILY_OPAQUE: u8 = 1;

/// Every task that travels under [`keys::TASK`].
///
/// Only the `Gui` family is executed here. `Opaque` tasks belong to other
/// consumers; they are carried through unchanged and ignored by the
/// [`GuiTaskExecutor`](crate::GuiTaskExecutor).
#[derive(Debug, Clone, PartialEq)]
pub enum TaskPacket {
    Gui { player: PlayerId, task: GuiTask },
    Opaque { kind: u16, data: Vec<u8> },
}

impl TaskPacket {
    pub fn gui(player: PlayerId, task: GuiTask) -> Self {
        Self::Gui { player, task }
    }
}

impl Packet for TaskPacket {
    fn key(&self) -> PacketKey {
        keys::TASK
    }

    fn serialize(&self, out: &mut WireWriter) -> Result<(), ProtocolError> {
        match self {
            Self::Gui { player, task } => {
                out.write_u8(FAMILY_GUI);
                out.write_u8(player.0);
                task.write(out)
            }
            Self::Opaque { kind, data } => {
                out.write_u8(FAMILY_OPAQUE);
                out.write_u16(*kind);
                out.write_bytes(data)
            }
        }
    }

    fn deserialize(_key: PacketKey, reader: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        match reader.read_u8()? {
            FAMILY_GUI => {
                let player = PlayerId(reader.read_u8()?);
                let task = GuiTask::read(reader)?;
                Ok(Self::Gui { player, task })
            }
            FAMILY_OPAQUE => {
                let kind = reader.read_u16()?;
                let data = reader.read_bytes()?;
                Ok(Self::Opaque { kind, data })
            }
            other => Err(ProtocolError::InvalidMessage(format!(
                "unknown task family {other}"
            ))),
        }
    }
}
