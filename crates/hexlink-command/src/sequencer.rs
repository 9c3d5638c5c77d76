//! One execution order for tasks issued on both ends of a channel.
//!
//! Each peer stamps its tasks with a logical clock that never runs behind
//! anything it has received. Tasks run in `(clock, player)` order on both
//! sides. A local task is held back until the peer has promised that all
//! of its later tasks carry a higher clock, either by sending a task or by
//! answering one with a bare clock update. A received task can run as soon
//! as every task ordered before it has run, because everything either side
//! stamps from then on is ordered after it.
//!
//! Player ids break clock ties, so the two peers must use different ids.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hexlink_protocol::{
    keys, DeserializerRegistry, Packet, PacketKey, ProtocolError, WireReader, WireWriter,
};
use hexlink_transport::{ChannelListener, ChannelSender, ListenerError, TransportError};

use crate::{PlayerId, TaskListener, TaskPacket};

// ---------------------------------------------------------------------------
// SequencePacket
// ---------------------------------------------------------------------------

const KIND_TASK: u8 = 0;
const KIND_CLOCK: u8 = 1;

/// What travels under [`keys::TASK_SEQUENCE`].
#[derive(Debug, Clone, PartialEq)]
pub enum SequencePacket {
    /// A task stamped with its sender's clock.
    Task {
        clock: u64,
        player: PlayerId,
        task: TaskPacket,
    },
    /// The sender's clock. Every task it sends later is stamped higher.
    Clock { clock: u64 },
}

impl Packet for SequencePacket {
    fn key(&self) -> PacketKey {
        keys::TASK_SEQUENCE
    }

    fn serialize(&self, out: &mut WireWriter) -> Result<(), ProtocolError> {
        match self {
            Self::Task {
                clock,
                player,
                task,
            } => {
                out.write_u8(KIND_TASK);
                out.write_u64(*clock);
                out.write_u8(player.0);
                task.serialize(out)
            }
            Self::Clock { clock } => {
                out.write_u8(KIND_CLOCK);
                out.write_u64(*clock);
                Ok(())
            }
        }
    }

    fn deserialize(_key: PacketKey, reader: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        match reader.read_u8()? {
            KIND_TASK => {
                let clock = reader.read_u64()?;
                let player = PlayerId(reader.read_u8()?);
                let task = TaskPacket::deserialize(keys::TASK, reader)?;
                Ok(Self::Task {
                    clock,
                    player,
                    task,
                })
            }
            KIND_CLOCK => Ok(Self::Clock {
                clock: reader.read_u64()?,
            }),
            other => Err(ProtocolError::InvalidMessage(format!(
                "unknown sequence packet kind {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Ordering state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Origin {
    Local,
    Remote,
}

/// Position of a task in the shared order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Slot {
    clock: u64,
    player: PlayerId,
    // Only differs between two tasks when both peers use the same id.
    origin: Origin,
}

#[derive(Debug, Default)]
struct State {
    clock: u64,
    /// Every task the peer sends from now on is stamped above this.
    peer_clock: u64,
    pending: BTreeMap<Slot, TaskPacket>,
}

struct Shared {
    local_player: PlayerId,
    apply_local: bool,
    sender: ChannelSender,
    state: Mutex<State>,
    // Held while stamping and sending, so frames leave in clock order and a
    // clock update never overtakes a task stamped before it.
    outgoing: tokio::sync::Mutex<()>,
    released: TaskListener,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hands every task that can no longer be overtaken to the queue.
    fn release(&self, state: &mut State) {
        while let Some(entry) = state.pending.first_entry() {
            let slot = *entry.key();
            if slot.origin == Origin::Local && state.peer_clock < slot.clock {
                break;
            }
            let task = entry.remove();
            tracing::trace!(clock = slot.clock, player = %slot.player, "task released");
            if let Err(e) = self.released.submit(task) {
                tracing::warn!(error = %e, "released task dropped");
            }
        }
    }

    fn on_task(self: &Arc<Self>, clock: u64, player: PlayerId, task: TaskPacket) {
        if player == self.local_player {
            tracing::warn!(%player, "peer uses our player id; task order may differ between peers");
        }
        {
            let mut state = self.state();
            state.clock = state.clock.max(clock);
            state.peer_clock = state.peer_clock.max(clock);
            let slot = Slot {
                clock,
                player,
                origin: Origin::Remote,
            };
            state.pending.insert(slot, task);
            self.release(&mut state);
        }

        // The peer's own tasks wait for this answer.
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let _outgoing = shared.outgoing.lock().await;
            let clock = shared.state().clock;
            if let Err(e) = shared.sender.send(&SequencePacket::Clock { clock }).await {
                tracing::debug!(channel = %shared.sender.id(), error = %e, "clock update not sent");
            }
        });
    }

    fn on_clock(&self, clock: u64) {
        let mut state = self.state();
        state.clock = state.clock.max(clock);
        state.peer_clock = state.peer_clock.max(clock);
        self.release(&mut state);
    }
}

// ---------------------------------------------------------------------------
// TaskSequencer
// ---------------------------------------------------------------------------

/// Orders local and remote tasks identically on both peers.
///
/// Register it on the channel, send local tasks through
/// [`submit`](Self::submit), and execute what arrives on the queue of the
/// [`TaskListener`] it releases into. Both peers then see the same tasks
/// in the same order.
#[derive(Clone)]
pub struct TaskSequencer {
    shared: Arc<Shared>,
}

impl TaskSequencer {
    /// Creates a sequencer sending on `sender` for `local_player` and
    /// releasing ordered tasks into `released`.
    pub fn new(sender: ChannelSender, local_player: PlayerId, released: TaskListener) -> Self {
        Self::with_local_apply(sender, local_player, released, true)
    }

    /// Like [`new`](Self::new). With `apply_local` off, local tasks are only
    /// sent, never released here.
    pub fn with_local_apply(
        sender: ChannelSender,
        local_player: PlayerId,
        released: TaskListener,
        apply_local: bool,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                local_player,
                apply_local,
                sender,
                state: Mutex::new(State::default()),
                outgoing: tokio::sync::Mutex::new(()),
                released,
            }),
        }
    }

    pub fn local_player(&self) -> PlayerId {
        self.shared.local_player
    }

    /// Number of tasks stamped or received but not yet released.
    pub fn pending(&self) -> usize {
        self.shared.state().pending.len()
    }

    /// Stamps `task` and sends it to the peer. The task is released locally
    /// once its place in the order is settled.
    ///
    /// # Errors
    /// Whatever the send fails with. The task is then withdrawn locally.
    pub async fn submit(&self, task: TaskPacket) -> Result<(), TransportError> {
        let shared = &self.shared;
        let _outgoing = shared.outgoing.lock().await;

        let slot = {
            let mut state = shared.state();
            state.clock += 1;
            let slot = Slot {
                clock: state.clock,
                player: shared.local_player,
                origin: Origin::Local,
            };
            if shared.apply_local {
                state.pending.insert(slot, task.clone());
            }
            slot
        };

        let packet = SequencePacket::Task {
            clock: slot.clock,
            player: slot.player,
            task,
        };
        let sent = shared.sender.send(&packet).await;

        let mut state = shared.state();
        if sent.is_err() {
            state.pending.remove(&slot);
        } else {
            self.shared.release(&mut state);
        }
        sent
    }
}

impl ChannelListener for TaskSequencer {
    fn keys(&self) -> Vec<PacketKey> {
        vec![keys::TASK_SEQUENCE]
    }

    fn deserializers(&self) -> DeserializerRegistry {
        let mut registry = DeserializerRegistry::new();
        registry.register::<SequencePacket>(keys::TASK_SEQUENCE);
        registry
    }

    fn receive(&self, packet: Box<dyn Packet>) -> Result<(), ListenerError> {
        let key = packet.key();
        let packet = packet
            .into_any()
            .downcast::<SequencePacket>()
            .map_err(|_| ListenerError::UnexpectedPacket { key })?;
        match *packet {
            SequencePacket::Task {
                clock,
                player,
                task,
            } => self.shared.on_task(clock, player, task),
            SequencePacket::Clock { clock } => self.shared.on_clock(clock),
        }
        Ok(())
    }
}

impl fmt::Debug for TaskSequencer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSequencer")
            .field("local_player", &self.shared.local_player)
            .field("apply_local", &self.shared.apply_local)
            .finish_non_exhaustive()
    }
}
