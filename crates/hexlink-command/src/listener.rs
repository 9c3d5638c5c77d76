//! Hand-off from the channel's receive task to the simulation side.

use hexlink_protocol::{keys, DeserializerRegistry, Packet, PacketKey};
use hexlink_transport::{ChannelListener, ListenerError};
use tokio::sync::mpsc;

use crate::{CommandError, TaskPacket};

/// Receives [`TaskPacket`]s on a channel and queues them for a
/// [`GuiTaskExecutor`](crate::GuiTaskExecutor).
///
/// The listener never touches the simulation itself: it runs on the
/// channel's receive task and only pushes onto an unbounded queue, so a
/// busy simulation never stalls the channel.
#[derive(Debug, Clone)]
pub struct TaskListener {
    queue: mpsc::UnboundedSender<TaskPacket>,
}

impl TaskListener {
    pub fn new(queue: mpsc::UnboundedSender<TaskPacket>) -> Self {
        Self { queue }
    }

    /// Creates a listener together with the receiving end of its queue.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TaskPacket>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// Queues a task that did not arrive over the network, e.g. one issued
    /// locally, so it is executed in line with remote tasks.
    pub fn submit(&self, task: TaskPacket) -> Result<(), CommandError> {
        self.queue.send(task).map_err(|_| CommandError::QueueClosed)
    }
}

impl ChannelListener for TaskListener {
    fn keys(&self) -> Vec<PacketKey> {
        vec![keys::TASK]
    }

    fn deserializers(&self) -> DeserializerRegistry {
        let mut registry = DeserializerRegistry::new();
        registry.register::<TaskPacket>(keys::TASK);
        registry
    }

    fn receive(&self, packet: Box<dyn Packet>) -> Result<(), ListenerError> {
        let key = packet.key();
        let task = packet
            .into_any()
            .downcast::<TaskPacket>()
            .map_err(|_| ListenerError::UnexpectedPacket { key })?;
        self.submit(*task)
            .map_err(|e| ListenerError::Handler(e.to_string()))
    }
}
