//! Two peers on one machine: a host accepts over TCP, a guest connects, they
//! announce themselves, and the guest's orders are applied on both sides.
//!
//! Pass a JSON file as the first argument to override the session config.

use std::collections::BTreeMap;
use std::time::Duration;

use hexlink::hexlink_command::CommandError;
use hexlink::prelude::*;

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

struct Soldier {
    position: Position,
    alive: bool,
}

impl MovableControl for Soldier {
    fn position(&self) -> Position {
        self.position
    }

    fn move_to(&mut self, target: Position) {
        // Teleport; pathing is out of scope for the demo.
        self.position = target;
    }

    fn kill(&mut self) {
        self.alive = false;
    }

    fn convert_to(&mut self, _target: MovableType) {}

    fn set_working(&mut self, _working: bool) {}
}

/// A 24x24 meadow with a pond in the middle.
struct Meadow {
    soldiers: BTreeMap<MovableId, Soldier>,
    buildings: Vec<(Position, BuildingType, PlayerId)>,
}

impl Meadow {
    fn new() -> Self {
        let soldiers = (1..=6)
            .map(|id| {
                let soldier = Soldier {
                    position: Position::new(2, id as i16),
                    alive: true,
                };
                (MovableId(id), soldier)
            })
            .collect();
        Self {
            soldiers,
            buildings: Vec::new(),
        }
    }

    fn summary(&self) -> String {
        let positions: Vec<String> = self
            .soldiers
            .iter()
            .filter(|(_, s)| s.alive)
            .map(|(id, s)| format!("{id}@{}", s.position))
            .collect();
        format!("soldiers [{}], buildings {}", positions.join(" "), self.buildings.len())
    }
}

impl SimulationGrid for Meadow {
    fn width(&self) -> u16 {
        24
    }

    fn height(&self) -> u16 {
        24
    }

    fn is_blocked(&self, pos: Position) -> bool {
        Position::new(12, 12).hex_distance(pos) <= 1
    }

    fn partition(&self, _pos: Position) -> PartitionId {
        PartitionId(1)
    }

    fn movable(&mut self, id: MovableId) -> Option<&mut dyn MovableControl> {
        self.soldiers
            .get_mut(&id)
            .filter(|s| s.alive)
            .map(|s| s as &mut dyn MovableControl)
    }

    fn building_at(&mut self, _pos: Position) -> Option<&mut dyn BuildingControl> {
        None
    }

    fn construct_building(&mut self, pos: Position, building_type: BuildingType, player: PlayerId) {
        self.buildings.push((pos, building_type, player));
    }

    fn set_material_distribution_settings(&mut self, _: Position, _: MaterialType, _: &[f32]) {}

    fn set_material_priorities(&mut self, _: Position, _: &[MaterialType]) {}

    fn set_accepted_stock_material(&mut self, _: Position, _: MaterialType, _: bool) {}

    fn material_production_at(&mut self, _: Position) -> Option<&mut dyn MaterialProductionControl> {
        None
    }

    fn upgrade_soldiers(&mut self, _: PlayerId, _: SoldierType) {}

    fn quick_save(&mut self, player: PlayerId) -> Result<(), CommandError> {
        tracing::info!(%player, "{}", self.summary());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn load_config() -> Result<SessionConfig, Box<dyn std::error::Error>> {
    match std::env::args().nth(1) {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&raw)?)
        }
        None => Ok(SessionConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    hexlink::init_tracing();
    let config = load_config()?;

    let mut transport =
        TcpTransport::bind_with_config("127.0.0.1:0", config.channel.clone()).await?;
    let addr = transport.local_addr()?;

    let host = PeerSession::builder()
        .config(config.clone())
        .player(PlayerInfoPacket::new("host", "Hilda"))
        .player_id(PlayerId(0))
        .accept(&mut transport);
    let guest = PeerSession::builder()
        .config(config)
        .player(PlayerInfoPacket::new("guest", "Gunnar"))
        .player_id(PlayerId(1))
        .connect(addr);
    let (host, guest) = tokio::join!(host, guest);
    let (mut host, mut guest) = (host?, guest?);

    let opponent = guest.wait_for_peer().await?;
    tracing::info!(name = opponent.name(), "guest sees host");
    let opponent = host.wait_for_peer().await?;
    tracing::info!(name = opponent.name(), "host sees guest");

    let mut host_sim = host.executor(Meadow::new());
    let mut guest_sim = guest.executor(Meadow::new());
    let mut host_tasks = host.take_tasks().ok_or("host tasks already taken")?;
    let mut guest_tasks = guest.take_tasks().ok_or("guest tasks already taken")?;

    let orders = [
        GuiTask::MoveTo {
            target: Position::new(12, 12),
            selection: (1..=6).map(MovableId).collect(),
        },
        GuiTask::Build {
            position: Position::new(4, 20),
            building_type: BuildingType(7),
        },
        GuiTask::DestroyMovables {
            selection: vec![MovableId(6)],
        },
        GuiTask::QuickSave,
    ];
    let count = orders.len();
    for task in orders {
        guest.submit(task).await?;
    }

    for (name, sim, tasks) in [
        ("host", &mut host_sim, &mut host_tasks),
        ("guest", &mut guest_sim, &mut guest_tasks),
    ] {
        for _ in 0..count {
            let packet = tokio::time::timeout(Duration::from_secs(5), tasks.recv())
                .await?
                .ok_or("task queue closed")?;
            sim.execute_task(&packet);
        }
        tracing::info!(peer = name, "{}", sim.grid().summary());
    }

    if host_sim.grid().summary() == guest_sim.grid().summary() {
        tracing::info!("both meadows agree");
    } else {
        tracing::warn!("meadows diverged");
    }

    let mut rtt = guest.subscribe_round_trip_time();
    if tokio::time::timeout(Duration::from_secs(3), rtt.wait_for(RoundTripTime::is_measured))
        .await
        .is_ok()
    {
        let rtt = guest.round_trip_time();
        tracing::info!(latest = ?rtt.latest, smoothed = ?rtt.smoothed, "round trip");
    }

    guest.close();
    host.join().await;
    transport.shutdown().await?;
    Ok(())
}
