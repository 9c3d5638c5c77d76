//! The GUI task executor: applies decoded tasks to the simulation.
//!
//! The executor owns the simulation handle and nothing else. Each task is
//! one call (or one short sequence of calls) into the [`SimulationGrid`]
//! capability interface. It adds no locking of its own: run it on the task
//! that steps the simulation, fed by the queue a
//! [`TaskListener`](crate::TaskListener) fills.

use tokio::sync::mpsc;

use crate::{
    DispatcherConfig, GuiTask, HexRing, MovableId, MoveSpreadConfig, PartitionId, PlayerId,
    Position, SimulationGrid, SoldierChange, TaskPacket,
};

/// Executes [`TaskPacket`]s against a [`SimulationGrid`].
pub struct GuiTaskExecutor<G> {
    grid: G,
    config: DispatcherConfig,
}

impl<G: SimulationGrid> GuiTaskExecutor<G> {
    pub fn new(grid: G) -> Self {
        Self::with_config(grid, DispatcherConfig::default())
    }

    pub fn with_config(grid: G, mut config: DispatcherConfig) -> Self {
        config.move_spread = config.move_spread.validated();
        Self { grid, config }
    }

    pub fn grid(&self) -> &G {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut G {
        &mut self.grid
    }

    pub fn into_grid(self) -> G {
        self.grid
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Applies one task. Packets outside the GUI family are ignored.
    pub fn execute_task(&mut self, packet: &TaskPacket) {
        let TaskPacket::Gui { player, task } = packet else {
            tracing::trace!("ignoring non-GUI task");
            return;
        };

        tracing::debug!(player = %player, action = %task.action(), "executing task");
        self.execute_gui_task(*player, task);
    }

    /// Executes every task currently queued, without waiting. Returns how
    /// many were executed.
    pub fn drain(&mut self, tasks: &mut mpsc::UnboundedReceiver<TaskPacket>) -> usize {
        let mut executed = 0;
        while let Ok(packet) = tasks.try_recv() {
            self.execute_task(&packet);
            executed += 1;
        }
        executed
    }

    /// Executes tasks as they arrive until every sender is gone.
    pub async fn run(&mut self, tasks: &mut mpsc::UnboundedReceiver<TaskPacket>) {
        while let Some(packet) = tasks.recv().await {
            self.execute_task(&packet);
        }
        tracing::debug!("task queue closed");
    }

    fn execute_gui_task(&mut self, player: PlayerId, task: &GuiTask) {
        let grid = &mut self.grid;
        match task {
            GuiTask::SetWorkArea { building, center } => {
                if let Some(building) = grid.building_at(*building) {
                    building.set_work_area_center(*center);
                }
            }

            GuiTask::Build {
                position,
                building_type,
            } => grid.construct_building(*position, *building_type, player),

            GuiTask::MoveTo { target, selection } => {
                self.move_selected_to(*target, selection);
            }

            GuiTask::QuickSave => {
                if let Err(e) = grid.quick_save(player) {
                    tracing::error!(player = %player, error = %e, "quick save failed");
                }
            }

            GuiTask::DestroyBuilding { position } => {
                if let Some(building) = grid.building_at(*position) {
                    building.kill();
                }
            }

            GuiTask::DestroyMovables { selection } => {
                for_each_movable(grid, selection, |movable| movable.kill());
            }

            GuiTask::StartWorking { selection } => {
                for_each_movable(grid, selection, |movable| movable.set_working(true));
            }

            GuiTask::StopWorking { selection } => {
                for_each_movable(grid, selection, |movable| movable.set_working(false));
            }

            GuiTask::Convert {
                selection,
                target_type,
            } => {
                for_each_movable(grid, selection, |movable| movable.convert_to(*target_type));
            }

            GuiTask::SetBuildingPriority { position, priority } => {
                if let Some(building) = grid.building_at(*position) {
                    building.set_priority(*priority);
                }
            }

            GuiTask::SetMaterialDistributionSettings {
                manager,
                material,
                probabilities,
            } => grid.set_material_distribution_settings(*manager, *material, probabilities),

            GuiTask::SetMaterialPriorities { manager, materials } => {
                grid.set_material_priorities(*manager, materials);
            }

            GuiTask::UpgradeSoldiers { soldier_type } => {
                grid.upgrade_soldiers(player, *soldier_type);
            }

            GuiTask::ChangeTrading {
                building,
                material,
                amount,
                relative,
            } => {
                if let Some(trading) = grid.building_at(*building).and_then(|b| b.as_trading()) {
                    trading.change_requested_material(*material, *amount, *relative);
                }
            }

            GuiTask::SetTradingWaypoint {
                building,
                waypoint,
                position,
            } => {
                if let Some(trading) = grid.building_at(*building).and_then(|b| b.as_trading()) {
                    trading.set_waypoint(*waypoint, *position);
                }
            }

            GuiTask::SetMaterialProduction {
                position,
                material,
                action,
                ratio,
            } => {
                if let Some(production) = grid.material_production_at(*position) {
                    production.apply(*action, *material, *ratio);
                }
            }

            GuiTask::ChangeTowerSoldiers {
                building,
                change,
                soldier_type,
            } => {
                let Some(garrison) = grid.building_at(*building).and_then(|b| b.as_garrison())
                else {
                    return;
                };
                match change {
                    SoldierChange::Full => garrison.request_soldiers(),
                    SoldierChange::More => garrison.request_soldier(*soldier_type),
                    SoldierChange::One => garrison.release_soldiers(),
                    SoldierChange::Less => garrison.release_soldier(*soldier_type),
                }
            }

            GuiTask::SetAcceptedStockMaterial {
                position,
                material,
                accepted,
                local,
            } => {
                if *local {
                    if let Some(stock) = grid.building_at(*position).and_then(|b| b.as_stock()) {
                        stock.set_accepted_material(*material, *accepted);
                    }
                } else {
                    grid.set_accepted_stock_material(*position, *material, *accepted);
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Movement
    // -----------------------------------------------------------------------

    fn move_selected_to(&mut self, target: Position, selection: &[MovableId]) {
        match selection {
            [] => {}
            [single] => {
                if let Some(movable) = self.grid.movable(*single) {
                    movable.move_to(target);
                }
            }
            _ => {
                let sent = spread_movables(&mut self.grid, &self.config.move_spread, target, selection);
                tracing::debug!(%target, selected = selection.len(), sent, "group move spread");
            }
        }
    }
}

impl<G> std::fmt::Debug for GuiTaskExecutor<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuiTaskExecutor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn for_each_movable<G, F>(grid: &mut G, selection: &[MovableId], mut apply: F)
where
    G: SimulationGrid + ?Sized,
    F: FnMut(&mut dyn crate::MovableControl),
{
    for id in selection {
        match grid.movable(*id) {
            Some(movable) => apply(movable),
            None => tracing::trace!(movable = %id, "movable gone, skipping"),
        }
    }
}

/// Spreads a group move over hex rings around `target`. Returns how many
/// movables were sent.
///
/// Rings grow from radius 1. Each ring is clipped to the grid, thinned to
/// every `ring_cell_stride`-th cell, and each remaining cell takes the first
/// movable (in selection order) that can reach it. The loop ends when every
/// movable is placed or `max_empty_rings` consecutive rings placed nobody.
pub(crate) fn spread_movables<G>(
    grid: &mut G,
    config: &MoveSpreadConfig,
    target: Position,
    selection: &[MovableId],
) -> usize
where
    G: SimulationGrid + ?Sized,
{
    // Movables that vanished are dropped up front; the rest keep selection
    // order together with the partition they stand in.
    let mut pending: Vec<(MovableId, PartitionId)> = selection
        .iter()
        .filter_map(|id| {
            let position = grid.movable(*id)?.position();
            Some((*id, grid.partition(position)))
        })
        .collect();

    let stride = config.ring_cell_stride.max(1);
    let mut sent = 0;
    let mut empty_rings = 0;
    let mut radius = 1;

    while !pending.is_empty() && empty_rings < config.max_empty_rings {
        let cells: Vec<Position> = HexRing::new(target, radius)
            .filter(|cell| grid.in_bounds(*cell))
            .step_by(stride)
            .collect();

        let mut placed_in_ring = 0;
        for cell in cells {
            if pending.is_empty() {
                break;
            }
            if grid.is_blocked(cell) {
                continue;
            }
            let partition = grid.partition(cell);
            let Some(index) = pending.iter().position(|(_, p)| *p == partition) else {
                continue;
            };
            let (id, _) = pending.remove(index);
            if let Some(movable) = grid.movable(id) {
                movable.move_to(cell);
                placed_in_ring += 1;
            }
        }

        sent += placed_in_ring;
        if placed_in_ring > 0 {
            empty_rings = 0;
        } else {
            empty_rings += 1;
        }
        radius += 1;
    }

    if !pending.is_empty() {
        tracing::debug!(
            %target,
            unplaced = pending.len(),
            "group move gave up on unreachable movables"
        );
    }
    sent
}
