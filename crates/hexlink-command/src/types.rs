//! Stable identifiers and small value types shared by every task.
//!
//! Everything here is resolvable independently on each peer: ids and grid
//! coordinates, never references into one peer's memory.

use std::fmt;

use hexlink_protocol::{ProtocolError, WireReader, WireWriter};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Ids
// ---------------------------------------------------------------------------

/// The player who issued a task.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub u8);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "player-{}", self.0)
    }
}

/// Simulation-wide id of a movable (a settler, soldier, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MovableId(pub i32);

impl fmt::Display for MovableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "movable-{}", self.0)
    }
}

/// Connectivity partition of a cell. Two cells in the same partition are
/// mutually reachable on foot. Assigned by the simulation, opaque here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartitionId(pub u32);

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// A cell on the hex grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub x: i16,
    pub y: i16,
}

impl Position {
    pub const fn new(x: i16, y: i16) -> Self {
        Self { x, y }
    }

    /// Hex distance on the grid's axial layout, where the six neighbours
    /// are `(±1, 0)`, `(0, ±1)`, `(1, 1)` and `(-1, -1)`.
    pub fn hex_distance(self, other: Position) -> u32 {
        let dx = i32::from(other.x) - i32::from(self.x);
        let dy = i32::from(other.y) - i32::from(self.y);
        if (dx >= 0) == (dy >= 0) {
            dx.unsigned_abs().max(dy.unsigned_abs())
        } else {
            dx.unsigned_abs() + dy.unsigned_abs()
        }
    }

    pub(crate) fn write(self, out: &mut WireWriter) {
        out.write_i16(self.x);
        out.write_i16(self.y);
    }

    pub(crate) fn read(reader: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        let x = reader.read_i16()?;
        let y = reader.read_i16()?;
        Ok(Self { x, y })
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

// ---------------------------------------------------------------------------
// Catalog types
// ---------------------------------------------------------------------------

// The catalogs themselves (which materials, buildings and movable kinds
// exist) belong to the simulation. Tasks only carry their ordinals.

/// Ordinal of a material type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MaterialType(pub u8);

/// Ordinal of a building type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BuildingType(pub u8);

/// Ordinal of a movable type (used as a conversion target).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MovableType(pub u8);

/// Implements the `u8` wire mapping for a fieldless enum.
macro_rules! wire_enum {
    ($name:ident { $($variant:ident = $value:literal),+ $(,)? }) => {
        impl $name {
            pub(crate) fn to_wire(self) -> u8 {
                match self {
                    $(Self::$variant => $value,)+
                }
            }

            pub(crate) fn from_wire(value: u8) -> Result<Self, ProtocolError> {
                match value {
                    $($value => Ok(Self::$variant),)+
                    other => Err(ProtocolError::InvalidMessage(format!(
                        concat!("unknown ", stringify!($name), " {}"),
                        other
                    ))),
                }
            }
        }
    };
}

pub(crate) use wire_enum;

/// Soldier classes that can be upgraded or garrisoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SoldierType {
    Swordsman,
    Pikeman,
    Bowman,
}

wire_enum!(SoldierType {
    Swordsman = 0,
    Pikeman = 1,
    Bowman = 2,
});

/// How eagerly a building is supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    Stopped,
    Low,
    High,
}

wire_enum!(Priority {
    Stopped = 0,
    Low = 1,
    High = 2,
});
