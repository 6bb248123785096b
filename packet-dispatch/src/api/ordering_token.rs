//! Per-event scheduling state shared between the dispatcher and listeners.

use crate::api::event::{ConnectionId, Direction};
use crate::control_plane::listener_registry::ListenerCursor;
use crate::data_plane::listener_pool::ListenerWorkerPool;
use crate::observability::events;
use parking_lot::Mutex;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

const COMPONENT: &str = "ordering_token";

/// Ordering and processing state of one admitted packet.
///
/// The `sending_index` is assigned once from the dispatcher's global counter and
/// decides the packet's position in its sending buffer. `processing_delay` counts
/// outstanding asynchronous hops; the packet is only send-eligible once it is zero.
///
/// Listeners that need to hold a packet past their own invocation call
/// [`OrderingToken::increment_processing_delay`] and later hand the token back to
/// [`crate::PacketDispatcher::signal_transmission`].
pub struct OrderingToken {
    sending_index: u64,
    direction: Direction,
    connection: ConnectionId,
    queued_sending_index: AtomicU64,
    new_sending_index: AtomicU64,
    processing_delay: AtomicUsize,
    created_at: Instant,
    timeout_ms: AtomicU64,
    queued: AtomicBool,
    processed: AtomicBool,
    transmitted: AtomicBool,
    timeout_offered: AtomicBool,
    cursor: Mutex<ListenerCursor>,
}

impl OrderingToken {
    pub(crate) fn new(
        sending_index: u64,
        sending_delta: u64,
        direction: Direction,
        connection: ConnectionId,
        timeout: Duration,
    ) -> Self {
        let new_sending_index = sending_index.saturating_add(sending_delta);
        Self {
            sending_index,
            direction,
            connection,
            queued_sending_index: AtomicU64::new(new_sending_index),
            new_sending_index: AtomicU64::new(new_sending_index),
            processing_delay: AtomicUsize::new(0),
            created_at: Instant::now(),
            timeout_ms: AtomicU64::new(duration_to_millis(timeout)),
            queued: AtomicBool::new(false),
            processed: AtomicBool::new(false),
            transmitted: AtomicBool::new(false),
            timeout_offered: AtomicBool::new(false),
            cursor: Mutex::new(ListenerCursor::default()),
        }
    }

    /// Copy used when a listener moved the packet to a different position.
    /// It is born processed and queued at its new index.
    pub(crate) fn renumbered(&self) -> Self {
        let index = self.new_sending_index();
        let copy = Self::new(index, 0, self.direction, self.connection, self.timeout());
        copy.queued.store(true, Ordering::Release);
        copy.processed.store(true, Ordering::Release);
        copy
    }

    pub fn sending_index(&self) -> u64 {
        self.sending_index
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    /// Position the packet was queued at in its sending buffer.
    pub fn queued_sending_index(&self) -> u64 {
        self.queued_sending_index.load(Ordering::Acquire)
    }

    /// Position the packet should be delivered at.
    pub fn new_sending_index(&self) -> u64 {
        self.new_sending_index.load(Ordering::Acquire)
    }

    /// Moves the packet to another position. Takes effect when the packet resolves.
    pub fn set_new_sending_index(&self, index: u64) {
        self.new_sending_index.store(index, Ordering::Release);
    }

    pub fn processing_delay(&self) -> usize {
        self.processing_delay.load(Ordering::Acquire)
    }

    /// Adds one outstanding hop and returns the new count.
    pub fn increment_processing_delay(&self) -> usize {
        self.processing_delay.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Removes one outstanding hop and returns the new count. The count never goes
    /// below zero; the caller that observes zero signals send-eligibility.
    pub fn decrement_processing_delay(&self) -> usize {
        match self
            .processing_delay
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |delay| {
                delay.checked_sub(1)
            }) {
            Ok(previous) => previous - 1,
            Err(_) => {
                warn!(
                    event = events::PROCESSING_DELAY_UNDERFLOW,
                    component = COMPONENT,
                    sending_index = self.sending_index,
                    "processing delay decremented below zero, ignoring"
                );
                0
            }
        }
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.load(Ordering::Acquire))
    }

    /// Replaces the timeout, measured from creation. Timeout listeners use this to
    /// keep an expired packet alive.
    pub fn set_timeout(&self, timeout: Duration) {
        self.timeout_ms
            .store(duration_to_millis(timeout), Ordering::Release);
    }

    pub fn has_expired(&self) -> bool {
        self.has_expired_at(Instant::now())
    }

    pub fn has_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > self.timeout()
    }

    pub fn is_queued(&self) -> bool {
        self.queued.load(Ordering::Acquire)
    }

    pub fn is_processed(&self) -> bool {
        self.processed.load(Ordering::Acquire)
    }

    pub fn is_transmitted(&self) -> bool {
        self.transmitted.load(Ordering::Acquire)
    }

    /// Snapshots the delivery position. Fails if the token was already queued.
    pub(crate) fn mark_queued(&self) -> bool {
        if self.queued.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.queued_sending_index
            .store(self.new_sending_index(), Ordering::Release);
        true
    }

    pub(crate) fn set_processed(&self) {
        self.processed.store(true, Ordering::Release);
    }

    /// Returns `true` for the single caller allowed to transmit.
    pub(crate) fn mark_transmitted(&self) -> bool {
        !self.transmitted.swap(true, Ordering::AcqRel)
    }

    /// Returns `true` the first time only.
    pub(crate) fn offer_timeout(&self) -> bool {
        !self.timeout_offered.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn begin_traversal(&self, cursor: ListenerCursor) {
        *self.cursor.lock() = cursor;
    }

    pub(crate) fn next_listener(&self) -> Option<Arc<ListenerWorkerPool>> {
        self.cursor.lock().advance()
    }

    pub(crate) fn finish_traversal(&self) {
        self.cursor.lock().exhaust();
    }

    pub fn is_traversal_exhausted(&self) -> bool {
        self.cursor.lock().is_exhausted()
    }
}

impl Debug for OrderingToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderingToken")
            .field("sending_index", &self.sending_index)
            .field("direction", &self.direction)
            .field("connection", &self.connection)
            .field("queued_sending_index", &self.queued_sending_index())
            .field("processing_delay", &self.processing_delay())
            .field("processed", &self.is_processed())
            .field("transmitted", &self.is_transmitted())
            .finish_non_exhaustive()
    }
}

fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::OrderingToken;
    use crate::api::event::{ConnectionId, Direction};
    use std::time::{Duration, Instant};

    fn token(index: u64, timeout: Duration) -> OrderingToken {
        OrderingToken::new(index, 0, Direction::Inbound, ConnectionId::new(), timeout)
    }

    #[test]
    fn processing_delay_never_goes_negative() {
        let token = token(1, Duration::from_secs(60));

        assert_eq!(token.increment_processing_delay(), 1);
        assert_eq!(token.increment_processing_delay(), 2);
        assert_eq!(token.decrement_processing_delay(), 1);
        assert_eq!(token.decrement_processing_delay(), 0);
        assert_eq!(token.decrement_processing_delay(), 0);
        assert_eq!(token.processing_delay(), 0);
    }

    #[test]
    fn expiry_is_strictly_after_timeout() {
        let token = token(1, Duration::from_millis(100));
        let created = token.created_at();

        assert!(!token.has_expired_at(created + Duration::from_millis(100)));
        assert!(token.has_expired_at(created + Duration::from_millis(101)));

        token.set_timeout(Duration::from_secs(10));
        assert!(!token.has_expired_at(created + Duration::from_millis(101)));
        assert!(!token.has_expired_at(Instant::now()));
    }

    #[test]
    fn transmitted_flag_is_claimed_once() {
        let token = token(7, Duration::from_secs(60));

        assert!(!token.is_transmitted());
        assert!(token.mark_transmitted());
        assert!(!token.mark_transmitted());
        assert!(token.is_transmitted());
    }

    #[test]
    fn mark_queued_snapshots_new_index_once() {
        let token = OrderingToken::new(
            10,
            5,
            Direction::Outbound,
            ConnectionId::new(),
            Duration::from_secs(60),
        );

        assert_eq!(token.new_sending_index(), 15);
        assert!(token.mark_queued());
        assert_eq!(token.queued_sending_index(), 15);

        token.set_new_sending_index(3);
        assert!(!token.mark_queued());
        assert_eq!(token.queued_sending_index(), 15);
    }

    #[test]
    fn renumbered_copy_is_processed_at_new_index() {
        let original = token(4, Duration::from_secs(60));
        original.set_new_sending_index(9);

        let copy = original.renumbered();

        assert_eq!(copy.sending_index(), 9);
        assert_eq!(copy.queued_sending_index(), 9);
        assert!(copy.is_processed());
        assert!(copy.is_queued());
        assert_eq!(copy.connection(), original.connection());
    }

    #[test]
    fn timeout_is_offered_once() {
        let token = token(1, Duration::ZERO);

        assert!(token.offer_timeout());
        assert!(!token.offer_timeout());
    }
}
