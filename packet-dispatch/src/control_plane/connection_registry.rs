//! Lazily created sending buffers for every connected endpoint.

use crate::api::event::{ConnectionId, Direction, PacketType};
use crate::data_plane::sending_buffer::{SendingBuffer, SendingResources};
use crate::observability::events;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

const COMPONENT: &str = "connection_registry";

/// Sending buffers of one connection.
pub(crate) struct ConnectionQueues {
    outbound: SendingBuffer,
    inbound: SendingBuffer,
}

impl ConnectionQueues {
    fn new(resources: &Arc<SendingResources>) -> Self {
        Self {
            // Outbound delivery may happen from any thread; inbound only from the
            // privileged context.
            outbound: SendingBuffer::new(false, resources.clone()),
            inbound: SendingBuffer::new(true, resources.clone()),
        }
    }

    pub(crate) fn buffer(&self, direction: Direction) -> &SendingBuffer {
        match direction {
            Direction::Inbound => &self.inbound,
            Direction::Outbound => &self.outbound,
        }
    }
}

pub(crate) struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<ConnectionQueues>>>,
    resources: Arc<SendingResources>,
}

impl ConnectionRegistry {
    pub(crate) fn new(resources: Arc<SendingResources>) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            resources,
        }
    }

    pub(crate) fn resources(&self) -> &Arc<SendingResources> {
        &self.resources
    }

    pub(crate) fn get_or_create(&self, connection: ConnectionId) -> Arc<ConnectionQueues> {
        if let Some(queues) = self.get(connection) {
            return queues;
        }

        let mut connections = self.connections.write();
        connections
            .entry(connection)
            .or_insert_with(|| {
                debug!(
                    event = events::CONNECTION_CREATED,
                    component = COMPONENT,
                    %connection,
                    "creating sending buffers"
                );
                Arc::new(ConnectionQueues::new(&self.resources))
            })
            .clone()
    }

    pub(crate) fn get(&self, connection: ConnectionId) -> Option<Arc<ConnectionQueues>> {
        self.connections.read().get(&connection).cloned()
    }

    /// Drops the connection's buffers and everything still queued in them.
    pub(crate) fn remove(&self, connection: ConnectionId) -> bool {
        let Some(queues) = self.connections.write().remove(&connection) else {
            return false;
        };
        let discarded =
            queues.buffer(Direction::Outbound).close() + queues.buffer(Direction::Inbound).close();
        info!(
            event = events::CONNECTION_REMOVED,
            component = COMPONENT,
            %connection,
            discarded,
            "connection removed"
        );
        true
    }

    pub(crate) fn flush_all(&self, direction: Direction, on_privileged: bool) {
        for queues in self.snapshot() {
            queues.buffer(direction).flush(on_privileged);
        }
    }

    pub(crate) fn resolve_types(
        &self,
        direction: Direction,
        types: &BTreeSet<PacketType>,
        on_privileged: bool,
    ) {
        for queues in self.snapshot() {
            queues.buffer(direction).resolve_types(types, on_privileged);
        }
    }

    /// Force-flushes and closes every buffer. Returns how many packets were sent.
    pub(crate) fn force_flush_all(&self) -> usize {
        let drained: Vec<_> = self.connections.write().drain().map(|(_, queues)| queues).collect();
        drained
            .iter()
            .map(|queues| {
                queues.buffer(Direction::Outbound).force_flush()
                    + queues.buffer(Direction::Inbound).force_flush()
            })
            .sum()
    }

    pub(crate) fn len(&self) -> usize {
        self.connections.read().len()
    }

    /// Packets waiting in the `direction` buffers of every connection.
    pub(crate) fn buffered(&self, direction: Direction) -> usize {
        self.snapshot()
            .iter()
            .map(|queues| queues.buffer(direction).len())
            .sum()
    }

    fn snapshot(&self) -> Vec<Arc<ConnectionQueues>> {
        self.connections.read().values().cloned().collect()
    }
}
