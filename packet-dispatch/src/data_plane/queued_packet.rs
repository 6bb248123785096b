//! A packet travelling through the engine together with its ordering token.

use crate::api::event::{Direction, PacketEvent, PacketType};
use crate::api::ordering_token::OrderingToken;
use parking_lot::{Mutex, MutexGuard};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Shared between the admission queue, worker queues and the sending buffer.
///
/// The event mutex is the per-event processing lock: a listener holds it for the
/// duration of its callback, so two listeners never see the same event at once.
pub(crate) struct QueuedPacket {
    token: Arc<OrderingToken>,
    packet_type: PacketType,
    event: Mutex<PacketEvent>,
}

impl QueuedPacket {
    pub(crate) fn new(mut event: PacketEvent, token: Arc<OrderingToken>) -> Arc<Self> {
        event.set_token(token.clone());
        Arc::new(Self {
            packet_type: event.packet_type(),
            token,
            event: Mutex::new(event),
        })
    }

    pub(crate) fn token(&self) -> &Arc<OrderingToken> {
        &self.token
    }

    pub(crate) fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    pub(crate) fn direction(&self) -> Direction {
        self.token.direction()
    }

    pub(crate) fn lock_event(&self) -> MutexGuard<'_, PacketEvent> {
        self.event.lock()
    }

    pub(crate) fn try_lock_event(&self) -> Option<MutexGuard<'_, PacketEvent>> {
        self.event.try_lock()
    }

    /// Processed copy of this packet at the token's new sending index. Takes the event
    /// from the caller, who holds its lock.
    pub(crate) fn renumbered(&self, event: &PacketEvent) -> Arc<Self> {
        Self::new(event.clone(), Arc::new(self.token.renumbered()))
    }
}

impl Debug for QueuedPacket {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedPacket")
            .field("packet_type", &self.packet_type)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}
