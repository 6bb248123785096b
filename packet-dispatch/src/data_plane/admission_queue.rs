//! Bounded-concurrency fan-out of admitted packets to their first listener.

use crate::api::event::{Direction, PacketType};
use crate::api::listener::ListeningWhitelist;
use crate::control_plane::listener_registry::ListenerRegistry;
use crate::data_plane::listener_pool::{hand_off, ListenerWorkerPool};
use crate::data_plane::queued_packet::QueuedPacket;
use crate::data_plane::DispatchHooks;
use crate::error::DispatchError;
use crate::observability::events;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{trace, warn};

const COMPONENT: &str = "admission_queue";
const ADMISSION_QUEUE: &str = "admission";

struct Pending(Arc<QueuedPacket>);

impl Pending {
    fn sending_index(&self) -> u64 {
        self.0.token().sending_index()
    }
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.sending_index() == other.sending_index()
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    // Reversed so the heap yields the lowest sending index first.
    fn cmp(&self, other: &Self) -> Ordering {
        other.sending_index().cmp(&self.sending_index())
    }
}

/// Admission state of one traffic direction.
///
/// At most `maximum_concurrency` packets hold a permit at any time; a permit is taken
/// when a packet is fanned out and given back by [`AdmissionQueue::complete`] once it
/// left its last listener.
pub(crate) struct AdmissionQueue {
    direction: Direction,
    pending: Mutex<BinaryHeap<Pending>>,
    capacity: usize,
    permits: Semaphore,
    maximum_concurrency: usize,
    registry: ListenerRegistry,
}

impl AdmissionQueue {
    pub(crate) fn new(direction: Direction, capacity: usize, maximum_concurrency: usize) -> Self {
        Self {
            direction,
            pending: Mutex::new(BinaryHeap::new()),
            capacity,
            permits: Semaphore::new(maximum_concurrency),
            maximum_concurrency,
            registry: ListenerRegistry::new(),
        }
    }

    pub(crate) fn registry(&self) -> &ListenerRegistry {
        &self.registry
    }

    /// Queues the packet and fans out as many pending packets as permits allow.
    pub(crate) fn admit(
        &self,
        packet: Arc<QueuedPacket>,
        hooks: &dyn DispatchHooks,
    ) -> Result<(), DispatchError> {
        {
            let mut pending = self.pending.lock();
            if pending.len() >= self.capacity {
                warn!(
                    event = events::ADMISSION_OVERFLOW,
                    component = COMPONENT,
                    direction = %self.direction,
                    capacity = self.capacity,
                    sending_index = packet.token().sending_index(),
                    "admission queue full, dropping packet"
                );
                return Err(DispatchError::QueueOverflow {
                    queue: ADMISSION_QUEUE,
                    capacity: self.capacity,
                });
            }
            pending.push(Pending(packet));
        }

        self.pump(hooks);
        Ok(())
    }

    pub(crate) fn pump(&self, hooks: &dyn DispatchHooks) {
        while let Ok(permit) = self.permits.try_acquire() {
            let Some(Pending(packet)) = self.pending.lock().pop() else {
                drop(permit);
                return;
            };
            // Held until complete() for this packet.
            permit.forget();

            let token = packet.token();
            token.increment_processing_delay();

            let cursor = self.registry.cursor_for(packet.packet_type());
            if !cursor.is_empty() {
                token.begin_traversal(cursor);
                if hand_off(&packet) {
                    trace!(
                        event = events::PACKET_HANDED_OFF,
                        component = COMPONENT,
                        direction = %self.direction,
                        sending_index = token.sending_index(),
                        "packet handed to first listener"
                    );
                    continue;
                }
            }

            token.finish_traversal();
            self.permits.add_permits(1);
            hooks.signal_transmission(&packet);
        }
    }

    /// Gives back the permit of a packet that finished its traversal.
    pub(crate) fn complete(&self, hooks: &dyn DispatchHooks) {
        self.permits.add_permits(1);
        self.pump(hooks);
    }

    pub(crate) fn add_listener(
        &self,
        pool: Arc<ListenerWorkerPool>,
        whitelist: &ListeningWhitelist,
    ) {
        self.registry.add(pool, whitelist);
    }

    /// Returns the types that lost their last listener.
    pub(crate) fn remove_listener(&self, pool: &ListenerWorkerPool) -> Vec<PacketType> {
        self.registry.remove(pool.id(), pool.types(self.direction))
    }

    pub(crate) fn listened_types(&self) -> BTreeSet<PacketType> {
        self.registry.types()
    }

    pub(crate) fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.maximum_concurrency
            .saturating_sub(self.permits.available_permits())
    }

    /// Removes every packet not yet fanned out.
    pub(crate) fn take_pending(&self) -> Vec<Arc<QueuedPacket>> {
        let mut pending = self.pending.lock();
        let mut taken = Vec::with_capacity(pending.len());
        while let Some(Pending(packet)) = pending.pop() {
            taken.push(packet);
        }
        taken
    }
}
