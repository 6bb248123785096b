//! Per (connection, direction) reordering buffer in front of the transport.

use crate::api::event::{PacketEvent, PacketType};
use crate::api::ordering_token::OrderingToken;
use crate::api::transport::PacketTransport;
use crate::control_plane::timeout_registry::TimeoutRegistry;
use crate::data_plane::queued_packet::QueuedPacket;
use crate::error::DispatchError;
use crate::observability::events;
use crate::runtime::background_sender::BackgroundSender;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

const COMPONENT: &str = "sending_buffer";

/// Collaborators shared by every sending buffer of a dispatcher.
pub(crate) struct SendingResources {
    transport: Arc<dyn PacketTransport>,
    background: BackgroundSender,
    timeouts: TimeoutRegistry,
}

impl SendingResources {
    pub(crate) fn new(transport: Arc<dyn PacketTransport>, background: BackgroundSender) -> Self {
        Self {
            transport,
            background,
            timeouts: TimeoutRegistry::new(),
        }
    }

    pub(crate) fn timeouts(&self) -> &TimeoutRegistry {
        &self.timeouts
    }

    pub(crate) fn background(&self) -> &BackgroundSender {
        &self.background
    }

    /// Delivers the packet unless it was already transmitted, waiting for its event
    /// lock. Only for callers that cannot be holding that lock themselves.
    pub(crate) fn transmit(&self, packet: &QueuedPacket) {
        let event = packet.lock_event();
        self.transmit_event(packet.token(), &event);
    }

    /// Delivers an event whose lock the caller holds. Failures are logged and the
    /// packet is dropped.
    fn transmit_event(&self, token: &OrderingToken, event: &PacketEvent) {
        if !token.mark_transmitted() {
            return;
        }
        match self.transport.transmit(event) {
            Ok(()) => trace!(
                event = events::PACKET_TRANSMITTED,
                component = COMPONENT,
                connection = %token.connection(),
                direction = %token.direction(),
                sending_index = token.sending_index(),
                "packet transmitted"
            ),
            Err(error) => warn!(
                event = events::PACKET_TRANSMIT_FAILED,
                component = COMPONENT,
                connection = %token.connection(),
                direction = %token.direction(),
                sending_index = token.sending_index(),
                %error,
                "transport refused packet, dropping it"
            ),
        }
    }
}

type BufferKey = (u64, u64);

/// Holds packets until they are resolved and delivers them in sending-index order.
///
/// The head of the buffer blocks everything behind it until it is resolved or expired.
/// Flushes are serialized; a flush requested while another is running is folded into
/// the running one.
pub(crate) struct SendingBuffer {
    entries: Mutex<BTreeMap<BufferKey, Arc<QueuedPacket>>>,
    next_sequence: AtomicU64,
    privileged_only: bool,
    resources: Arc<SendingResources>,
    flushing: Mutex<()>,
    flush_requested: AtomicBool,
    closed: AtomicBool,
}

impl SendingBuffer {
    pub(crate) fn new(privileged_only: bool, resources: Arc<SendingResources>) -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            next_sequence: AtomicU64::new(0),
            privileged_only,
            resources,
            flushing: Mutex::new(()),
            flush_requested: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Inserts at the packet's queued position. Returns `false` once the buffer is
    /// closed.
    pub(crate) fn enqueue(&self, packet: Arc<QueuedPacket>) -> bool {
        let mut entries = self.entries.lock();
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        self.insert(&mut entries, packet);
        true
    }

    /// Builds the packet and inserts it while holding the buffer lock, so packets
    /// stamped for this buffer enter it in stamping order and a later index can never
    /// be delivered ahead of an earlier one that is still on its way in.
    pub(crate) fn enqueue_stamped<F>(&self, stamp: F) -> Result<Arc<QueuedPacket>, DispatchError>
    where
        F: FnOnce() -> Result<Arc<QueuedPacket>, DispatchError>,
    {
        let mut entries = self.entries.lock();
        if self.closed.load(Ordering::SeqCst) {
            return Err(DispatchError::ShutDown);
        }
        let packet = stamp()?;
        self.insert(&mut entries, packet.clone());
        Ok(packet)
    }

    fn insert(
        &self,
        entries: &mut BTreeMap<BufferKey, Arc<QueuedPacket>>,
        packet: Arc<QueuedPacket>,
    ) {
        let key = (
            packet.token().queued_sending_index(),
            self.next_sequence.fetch_add(1, Ordering::Relaxed),
        );
        entries.insert(key, packet);
    }

    /// Marks the packet processed and flushes. A packet moved by a listener is replaced
    /// by a processed copy at its new position.
    ///
    /// A packet whose event is still locked by a listener is left unresolved; its
    /// traversal resolves it again once the listener returns.
    pub(crate) fn resolve(&self, packet: &Arc<QueuedPacket>, on_privileged: bool) {
        let token = packet.token();
        if token.queued_sending_index() != token.new_sending_index() && !token.has_expired() {
            let Some(mut event) = packet.try_lock_event() else {
                return;
            };
            let copy = packet.renumbered(&event);
            event.set_cancelled(true);
            drop(event);
            debug!(
                event = events::PACKET_REORDERED,
                component = COMPONENT,
                connection = %token.connection(),
                from = token.queued_sending_index(),
                to = token.new_sending_index(),
                "packet moved to new sending index"
            );
            self.enqueue(copy);
        }
        token.set_processed();
        self.flush(on_privileged);
    }

    /// Resolves every queued packet of the given types.
    pub(crate) fn resolve_types(&self, types: &BTreeSet<PacketType>, on_privileged: bool) {
        if types.is_empty() {
            return;
        }
        for packet in self.entries.lock().values() {
            if types.contains(&packet.packet_type()) {
                packet.token().set_processed();
            }
        }
        self.flush(on_privileged);
    }

    pub(crate) fn flush(&self, on_privileged: bool) {
        self.flush_requested.store(true, Ordering::SeqCst);
        while self.flush_requested.load(Ordering::SeqCst) {
            let Some(_flushing) = self.flushing.try_lock() else {
                return;
            };
            self.flush_requested.store(false, Ordering::SeqCst);
            self.drain(on_privileged);
        }
    }

    fn drain(&self, on_privileged: bool) {
        while !self.closed.load(Ordering::SeqCst) {
            let Some((key, packet)) = self.head() else {
                return;
            };
            let token = packet.token();

            if !token.is_processed() && !token.has_expired() {
                return;
            }
            if token.has_expired() && !self.offer_timeout(&packet) {
                return;
            }
            // Timeout listeners may have extended the deadline of an unresolved packet.
            let expired = token.has_expired();
            if !token.is_processed() && !expired {
                return;
            }

            if expired {
                self.discard(key);
                debug!(
                    event = events::PACKET_DROPPED_EXPIRED,
                    component = COMPONENT,
                    connection = %token.connection(),
                    sending_index = token.sending_index(),
                    "dropping expired packet"
                );
                continue;
            }

            // Held by a listener, possibly on this very thread; the end of its
            // traversal flushes again.
            let Some(event) = packet.try_lock_event() else {
                return;
            };
            let off_context = event.wants_off_context_delivery();
            if event.is_cancelled() || token.is_transmitted() {
                drop(event);
                self.discard(key);
                trace!(
                    event = events::PACKET_DROPPED_CANCELLED,
                    component = COMPONENT,
                    connection = %token.connection(),
                    sending_index = token.sending_index(),
                    "dropping cancelled packet"
                );
                continue;
            }

            if self.privileged_only && !on_privileged && !off_context {
                return;
            }
            self.discard(key);

            if self.privileged_only && on_privileged && off_context {
                drop(event);
                let resources = self.resources.clone();
                let deferred = packet.clone();
                let submitted = self
                    .resources
                    .background()
                    .submit(Box::new(move || resources.transmit(&deferred)));
                if !submitted {
                    self.resources.transmit(&packet);
                }
                continue;
            }
            self.resources.transmit_event(token, &event);
        }
    }

    /// Offers an expired packet to the timeout listeners once. Returns `false` when the
    /// packet is still held by a listener and must be looked at again later.
    fn offer_timeout(&self, packet: &QueuedPacket) -> bool {
        let token: &OrderingToken = packet.token();
        let Some(mut event) = packet.try_lock_event() else {
            return false;
        };
        if token.offer_timeout() {
            self.resources.timeouts().offer(&mut event);
        }
        true
    }

    /// The queued packet carrying this exact token.
    pub(crate) fn find(&self, token: &Arc<OrderingToken>) -> Option<Arc<QueuedPacket>> {
        let index = token.queued_sending_index();
        self.entries
            .lock()
            .range((index, 0)..=(index, u64::MAX))
            .map(|(_, packet)| packet)
            .find(|packet| Arc::ptr_eq(packet.token(), token))
            .cloned()
    }

    fn head(&self) -> Option<(BufferKey, Arc<QueuedPacket>)> {
        self.entries
            .lock()
            .first_key_value()
            .map(|(key, packet)| (*key, packet.clone()))
    }

    fn discard(&self, key: BufferKey) {
        self.entries.lock().remove(&key);
    }

    /// Transmits everything still queued, ignoring order and resolution, and closes the
    /// buffer. Cancelled packets are still dropped.
    pub(crate) fn force_flush(&self) -> usize {
        self.closed.store(true, Ordering::SeqCst);
        let _flushing = self.flushing.lock();
        let remaining = std::mem::take(&mut *self.entries.lock());

        let mut sent = 0;
        for packet in remaining.into_values() {
            if packet.lock_event().is_cancelled() || packet.token().is_transmitted() {
                continue;
            }
            self.resources.transmit(&packet);
            sent += 1;
        }
        sent
    }

    /// Drops everything queued without delivering it and closes the buffer.
    pub(crate) fn close(&self) -> usize {
        self.closed.store(true, Ordering::SeqCst);
        let mut entries = self.entries.lock();
        let discarded = entries.len();
        entries.clear();
        discarded
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}
