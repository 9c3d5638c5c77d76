//! The capability interface the executor drives.
//!
//! The simulation implements these traits; the executor never sees the
//! simulation's own types. Lookups return `Option`: `None` means the entity
//! is gone (destroyed between issuing and delivery, which network latency
//! makes routine), and the executor treats it as a no-op.

use crate::{
    BuildingType, CommandError, MaterialType, MovableId, MovableType, PartitionId, PlayerId,
    Position, Priority, ProductionAction, SoldierType, WaypointType,
};

/// The shared world state, as seen by the command layer.
///
/// Implementations must be deterministic: given the same state and the same
/// sequence of calls, every peer must end up in the same state.
pub trait SimulationGrid {
    /// Grid width in cells. Valid `x` is `0..width`.
    fn width(&self) -> u16;

    /// Grid height in cells. Valid `y` is `0..height`.
    fn height(&self) -> u16;

    fn is_blocked(&self, pos: Position) -> bool;

    fn partition(&self, pos: Position) -> PartitionId;

    fn movable(&mut self, id: MovableId) -> Option<&mut dyn MovableControl>;

    fn building_at(&mut self, pos: Position) -> Option<&mut dyn BuildingControl>;

    fn construct_building(&mut self, pos: Position, building_type: BuildingType, player: PlayerId);

    fn set_material_distribution_settings(
        &mut self,
        manager: Position,
        material: MaterialType,
        probabilities: &[f32],
    );

    fn set_material_priorities(&mut self, manager: Position, materials: &[MaterialType]);

    /// Grid-wide stock acceptance around `pos`.
    fn set_accepted_stock_material(&mut self, pos: Position, material: MaterialType, accepted: bool);

    fn material_production_at(
        &mut self,
        pos: Position,
    ) -> Option<&mut dyn MaterialProductionControl>;

    fn upgrade_soldiers(&mut self, player: PlayerId, soldier_type: SoldierType);

    /// Persists a snapshot on behalf of `player`.
    fn quick_save(&mut self, player: PlayerId) -> Result<(), CommandError>;

    /// Returns `true` if `pos` lies on the grid.
    fn in_bounds(&self, pos: Position) -> bool {
        pos.x >= 0
            && pos.y >= 0
            && i32::from(pos.x) < i32::from(self.width())
            && i32::from(pos.y) < i32::from(self.height())
    }
}

/// A unit that can be ordered around.
pub trait MovableControl {
    fn position(&self) -> Position;

    /// Orders the movable to walk to `target`. Pathing is the simulation's
    /// business.
    fn move_to(&mut self, target: Position);

    fn kill(&mut self);

    fn convert_to(&mut self, target: MovableType);

    fn set_working(&mut self, working: bool);
}

/// A building. Specialized capabilities are exposed through the `as_*`
/// accessors; the defaults say "not this kind of building".
pub trait BuildingControl {
    fn kill(&mut self);

    fn set_priority(&mut self, priority: Priority);

    fn set_work_area_center(&mut self, center: Position);

    fn as_trading(&mut self) -> Option<&mut dyn TradingControl> {
        None
    }

    fn as_garrison(&mut self) -> Option<&mut dyn GarrisonControl> {
        None
    }

    fn as_stock(&mut self) -> Option<&mut dyn StockControl> {
        None
    }
}

/// A market or harbor.
pub trait TradingControl {
    fn change_requested_material(&mut self, material: MaterialType, amount: i32, relative: bool);

    fn set_waypoint(&mut self, waypoint: WaypointType, position: Position);
}

/// A tower or castle that holds soldiers.
pub trait GarrisonControl {
    fn request_soldiers(&mut self);

    fn request_soldier(&mut self, soldier_type: SoldierType);

    fn release_soldiers(&mut self);

    fn release_soldier(&mut self, soldier_type: SoldierType);
}

pub trait StockControl {
    fn set_accepted_material(&mut self, material: MaterialType, accepted: bool);
}

/// Planned output of the production site at a position.
pub trait MaterialProductionControl {
    fn increase(&mut self, material: MaterialType);

    fn decrease(&mut self, material: MaterialType);

    fn set_count(&mut self, material: MaterialType, count: i32);

    fn set_ratio(&mut self, material: MaterialType, ratio: f32);

    /// Applies one [`ProductionAction`]. `value` is the count for
    /// `SetProduction` (truncated) and the ratio for `SetRatio`.
    fn apply(&mut self, action: ProductionAction, material: MaterialType, value: f32) {
        match action {
            ProductionAction::Increase => self.increase(material),
            ProductionAction::Decrease => self.decrease(material),
            ProductionAction::SetProduction => self.set_count(material, value as i32),
            ProductionAction::SetRatio => self.set_ratio(material, value),
        }
    }
}
