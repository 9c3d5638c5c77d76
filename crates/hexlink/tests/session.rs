//! End-to-end tests: two peer sessions wired back to back.
//!
//! Each test builds both peers over one `tokio::io::duplex` pipe, so the
//! full path runs: submit → task sequencer → channel → queue → executor.

use std::collections::BTreeMap;
use std::time::Duration;

use hexlink::prelude::*;
use hexlink_command::CommandError;
use hexlink_transport::TransportError;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

const ALICE: PlayerId = PlayerId(1);
const BOB: PlayerId = PlayerId(2);

// ===========================================================================
// A tiny simulation
// ===========================================================================

#[derive(Debug, Clone, PartialEq)]
struct Unit {
    position: Position,
    ordered_to: Option<Position>,
}

impl MovableControl for Unit {
    fn position(&self) -> Position {
        self.position
    }

    fn move_to(&mut self, target: Position) {
        self.ordered_to = Some(target);
    }

    fn kill(&mut self) {}

    fn convert_to(&mut self, _target: MovableType) {}

    fn set_working(&mut self, _working: bool) {}
}

/// An open 32x32 field that records constructions and saves.
#[derive(Debug, Default)]
struct Field {
    units: BTreeMap<MovableId, Unit>,
    constructed: Vec<(Position, BuildingType, PlayerId)>,
    saves: Vec<PlayerId>,
}

impl Field {
    fn with_units(ids: &[i32]) -> Self {
        let units = ids
            .iter()
            .map(|id| {
                let unit = Unit {
                    position: Position::new(2, 2),
                    ordered_to: None,
                };
                (MovableId(*id), unit)
            })
            .collect();
        Self {
            units,
            ..Self::default()
        }
    }

    fn orders(&self) -> Vec<Option<Position>> {
        self.units.values().map(|unit| unit.ordered_to).collect()
    }
}

impl SimulationGrid for Field {
    fn width(&self) -> u16 {
        32
    }

    fn height(&self) -> u16 {
        32
    }

    fn is_blocked(&self, _pos: Position) -> bool {
        false
    }

    fn partition(&self, _pos: Position) -> PartitionId {
        PartitionId(0)
    }

    fn movable(&mut self, id: MovableId) -> Option<&mut dyn MovableControl> {
        self.units
            .get_mut(&id)
            .map(|unit| unit as &mut dyn MovableControl)
    }

    fn building_at(&mut self, _pos: Position) -> Option<&mut dyn BuildingControl> {
        None
    }

    fn construct_building(&mut self, pos: Position, building_type: BuildingType, player: PlayerId) {
        self.constructed.push((pos, building_type, player));
    }

    fn set_material_distribution_settings(
        &mut self,
        _manager: Position,
        _material: MaterialType,
        _probabilities: &[f32],
    ) {
    }

    fn set_material_priorities(&mut self, _manager: Position, _materials: &[MaterialType]) {}

    fn set_accepted_stock_material(&mut self, _pos: Position, _material: MaterialType, _accepted: bool) {}

    fn material_production_at(
        &mut self,
        _pos: Position,
    ) -> Option<&mut dyn MaterialProductionControl> {
        None
    }

    fn upgrade_soldiers(&mut self, _player: PlayerId, _soldier_type: SoldierType) {}

    fn quick_save(&mut self, player: PlayerId) -> Result<(), CommandError> {
        self.saves.push(player);
        Ok(())
    }
}

// ===========================================================================
// Helpers
// ===========================================================================

fn quiet() -> SessionConfig {
    SessionConfig {
        start_pinging: false,
        ..SessionConfig::default()
    }
}

async fn pair(config: SessionConfig) -> (PeerSession, PeerSession) {
    let (a, b) = tokio::io::duplex(4096);
    let alice = PeerSession::builder()
        .config(config.clone())
        .player(PlayerInfoPacket::new("a-1", "Alice"))
        .player_id(ALICE)
        .attach(a);
    let bob = PeerSession::builder()
        .config(config)
        .player(PlayerInfoPacket::new("b-2", "Bob"))
        .player_id(BOB)
        .attach(b);
    let (alice, bob) = tokio::join!(alice, bob);
    (alice.unwrap(), bob.unwrap())
}

/// Waits until `count` tasks are queued, then executes them.
async fn execute(
    executor: &mut GuiTaskExecutor<Field>,
    tasks: &mut tokio::sync::mpsc::UnboundedReceiver<TaskPacket>,
    count: usize,
) {
    for _ in 0..count {
        let packet = timeout(WAIT, tasks.recv())
            .await
            .expect("timed out waiting for a task")
            .expect("task queue closed");
        executor.execute_task(&packet);
    }
}

// ===========================================================================
// Peer announcement
// ===========================================================================

#[tokio::test]
async fn test_peers_exchange_player_info() {
    let (alice, bob) = pair(quiet()).await;

    let seen_by_alice = timeout(WAIT, alice.wait_for_peer()).await.unwrap().unwrap();
    let seen_by_bob = timeout(WAIT, bob.wait_for_peer()).await.unwrap().unwrap();

    assert_eq!(seen_by_alice, PlayerInfoPacket::new("b-2", "Bob"));
    assert_eq!(seen_by_bob, PlayerInfoPacket::new("a-1", "Alice"));
    assert_eq!(alice.peer_info(), Some(seen_by_alice));
}

#[tokio::test]
async fn test_wait_for_peer_fails_when_peer_leaves_silently() {
    let (a, b) = tokio::io::duplex(4096);
    let session = PeerSession::builder()
        .config(quiet())
        .attach(a)
        .await
        .unwrap();
    drop(b);

    let result = timeout(WAIT, session.wait_for_peer()).await.unwrap();
    assert!(matches!(
        result,
        Err(HexlinkError::Transport(TransportError::ConnectionClosed(_)))
    ));
}

// ===========================================================================
// Task flow
// ===========================================================================

#[tokio::test]
async fn test_submitted_task_runs_on_both_peers() {
    let (mut alice, mut bob) = pair(quiet()).await;
    let mut alice_tasks = alice.take_tasks().unwrap();
    let mut bob_tasks = bob.take_tasks().unwrap();
    let mut alice_sim = alice.executor(Field::default());
    let mut bob_sim = bob.executor(Field::default());

    let task = GuiTask::Build {
        position: Position::new(7, 9),
        building_type: BuildingType(3),
    };
    alice.submit(task).await.unwrap();

    execute(&mut alice_sim, &mut alice_tasks, 1).await;
    execute(&mut bob_sim, &mut bob_tasks, 1).await;

    let expected = vec![(Position::new(7, 9), BuildingType(3), ALICE)];
    assert_eq!(alice_sim.grid().constructed, expected);
    assert_eq!(bob_sim.grid().constructed, expected);
}

#[tokio::test]
async fn test_group_move_lands_identically_on_both_peers() {
    let (mut alice, mut bob) = pair(quiet()).await;
    let mut alice_tasks = alice.take_tasks().unwrap();
    let mut bob_tasks = bob.take_tasks().unwrap();
    let mut alice_sim = alice.executor(Field::with_units(&[1, 2, 3, 4]));
    let mut bob_sim = bob.executor(Field::with_units(&[1, 2, 3, 4]));

    let move_to = GuiTask::MoveTo {
        target: Position::new(16, 16),
        selection: vec![MovableId(4), MovableId(2), MovableId(1), MovableId(3)],
    };
    bob.submit(move_to).await.unwrap();

    execute(&mut alice_sim, &mut alice_tasks, 1).await;
    execute(&mut bob_sim, &mut bob_tasks, 1).await;

    let orders = alice_sim.grid().orders();
    assert!(orders.iter().all(Option::is_some));
    assert!(!orders.contains(&Some(Position::new(16, 16))));
    assert_eq!(orders, bob_sim.grid().orders());
}

#[tokio::test]
async fn test_tasks_arrive_in_submit_order() {
    let (mut alice, mut bob) = pair(quiet()).await;
    let mut bob_tasks = bob.take_tasks().unwrap();
    let mut bob_sim = bob.executor(Field::default());
    drop(alice.take_tasks());

    for _ in 0..3 {
        alice.submit(GuiTask::QuickSave).await.unwrap();
    }
    execute(&mut bob_sim, &mut bob_tasks, 3).await;

    assert_eq!(bob_sim.grid().saves, vec![ALICE, ALICE, ALICE]);
}

#[tokio::test]
async fn test_concurrent_submissions_run_in_the_same_order_on_both_peers() {
    let (mut alice, mut bob) = pair(quiet()).await;
    let mut alice_tasks = alice.take_tasks().unwrap();
    let mut bob_tasks = bob.take_tasks().unwrap();
    let mut alice_sim = alice.executor(Field::with_units(&[1]));
    let mut bob_sim = bob.executor(Field::with_units(&[1]));

    for round in 0..5 {
        let near = GuiTask::MoveTo {
            target: Position::new(5, 5 + round),
            selection: vec![MovableId(1)],
        };
        let far = GuiTask::MoveTo {
            target: Position::new(20, 20 - round),
            selection: vec![MovableId(1)],
        };
        let (a, b) = tokio::join!(alice.submit(near), bob.submit(far));
        a.unwrap();
        b.unwrap();

        execute(&mut alice_sim, &mut alice_tasks, 2).await;
        execute(&mut bob_sim, &mut bob_tasks, 2).await;
        assert_eq!(alice_sim.grid().orders(), bob_sim.grid().orders(), "round {round}");
    }
}

#[tokio::test]
async fn test_local_tasks_stay_remote_only_when_disabled() {
    let config = SessionConfig {
        apply_local_tasks: false,
        ..quiet()
    };
    let (mut alice, mut bob) = pair(config).await;
    let mut alice_tasks = alice.take_tasks().unwrap();
    let mut bob_tasks = bob.take_tasks().unwrap();

    alice.submit(GuiTask::QuickSave).await.unwrap();

    let received = timeout(WAIT, bob_tasks.recv()).await.unwrap().unwrap();
    assert_eq!(received, TaskPacket::gui(ALICE, GuiTask::QuickSave));
    assert!(alice_tasks.try_recv().is_err());
}

#[tokio::test]
async fn test_take_tasks_only_once() {
    let (mut alice, _bob) = pair(quiet()).await;
    assert!(alice.take_tasks().is_some());
    assert!(alice.take_tasks().is_none());
}

#[tokio::test]
async fn test_submit_after_close_fails() {
    let (alice, _bob) = pair(quiet()).await;
    alice.close();
    timeout(WAIT, alice.join()).await.unwrap();

    let err = alice.submit(GuiTask::QuickSave).await.unwrap_err();
    assert!(matches!(
        err,
        HexlinkError::Transport(TransportError::ConnectionClosed(_))
    ));
}

// ===========================================================================
// Pinging
// ===========================================================================

#[tokio::test]
async fn test_session_measures_round_trip_time() {
    let (alice, _bob) = pair(SessionConfig::default()).await;

    let mut rtt = alice.subscribe_round_trip_time();
    let measured = timeout(WAIT, rtt.wait_for(RoundTripTime::is_measured))
        .await
        .unwrap()
        .unwrap()
        .clone();

    assert!(measured.samples >= 1);
    assert!(alice.round_trip_time().is_measured());
}
