//! Intercepted packet events and their identifying attributes.

use crate::api::ordering_token::OrderingToken;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use uuid::Uuid;

/// Traffic direction of a packet relative to the host.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Received from the remote endpoint.
    Inbound,
    /// Sent to the remote endpoint.
    Outbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

impl Display for Direction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message type identifier used to select interested listeners.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct PacketType(u32);

impl PacketType {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn id(&self) -> u32 {
        self.0
    }
}

impl Display for PacketType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#04X}", self.0)
    }
}

/// Identity of one connected endpoint.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Creates a fresh random connection identity.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for ConnectionId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl Display for ConnectionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// One intercepted message.
///
/// The interception layer builds events with [`PacketEvent::new`] and hands them to
/// [`crate::PacketDispatcher::enqueue`]. Listeners receive `&mut PacketEvent` and may
/// rewrite the payload, cancel the event or, through its [`OrderingToken`], delay or
/// re-order it.
#[derive(Clone, Debug)]
pub struct PacketEvent {
    direction: Direction,
    connection: ConnectionId,
    packet_type: PacketType,
    payload: Vec<u8>,
    cancelled: bool,
    off_context_delivery: bool,
    token: Option<Arc<OrderingToken>>,
}

impl PacketEvent {
    pub fn new(
        direction: Direction,
        connection: ConnectionId,
        packet_type: PacketType,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            direction,
            connection,
            packet_type,
            payload,
            cancelled: false,
            off_context_delivery: false,
            token: None,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    pub fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut Vec<u8> {
        &mut self.payload
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// A cancelled event is dropped by its sending buffer instead of transmitted.
    pub fn set_cancelled(&mut self, cancelled: bool) {
        self.cancelled = cancelled;
    }

    pub fn wants_off_context_delivery(&self) -> bool {
        self.off_context_delivery
    }

    /// Requests delivery away from the privileged context even when the sending
    /// buffer for this direction is otherwise restricted to it.
    pub fn set_off_context_delivery(&mut self, off_context: bool) {
        self.off_context_delivery = off_context;
    }

    /// Scheduling state, present once the event has been stamped for dispatch.
    pub fn token(&self) -> Option<&Arc<OrderingToken>> {
        self.token.as_ref()
    }

    /// Attaches a token created ahead of time with
    /// [`crate::PacketDispatcher::create_token`].
    pub fn with_token(mut self, token: Arc<OrderingToken>) -> Self {
        self.token = Some(token);
        self
    }

    pub(crate) fn set_token(&mut self, token: Arc<OrderingToken>) {
        self.token = Some(token);
    }
}

#[cfg(test)]
mod tests {
    use super::{ConnectionId, Direction, PacketEvent, PacketType};

    #[test]
    fn packet_type_display_is_hex() {
        assert_eq!(PacketType::new(0x2A).to_string(), "0x2A");
    }

    #[test]
    fn connection_ids_are_unique() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }

    #[test]
    fn new_event_is_live_and_unstamped() {
        let event = PacketEvent::new(
            Direction::Outbound,
            ConnectionId::new(),
            PacketType::new(1),
            b"hello".to_vec(),
        );

        assert!(!event.is_cancelled());
        assert!(!event.wants_off_context_delivery());
        assert!(event.token().is_none());
        assert_eq!(event.payload(), b"hello");
        assert_eq!(event.direction().to_string(), "outbound");
    }
}
