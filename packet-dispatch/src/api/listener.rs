//! Listener capability consumed by worker pools and timeout observers.

use crate::api::event::{Direction, PacketEvent, PacketType};
use std::collections::BTreeSet;

/// Traversal priority of a listener. Lower priorities are visited first; listeners
/// with equal priority are visited in registration order.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ListenerPriority {
    Lowest,
    Low,
    #[default]
    Normal,
    High,
    Highest,
    /// Observes the final state of a packet. Should not modify it.
    Monitor,
}

/// The packet types a listener is interested in for one direction.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ListeningWhitelist {
    priority: ListenerPriority,
    types: BTreeSet<PacketType>,
}

impl ListeningWhitelist {
    pub fn new<I>(priority: ListenerPriority, types: I) -> Self
    where
        I: IntoIterator<Item = PacketType>,
    {
        Self {
            priority,
            types: types.into_iter().collect(),
        }
    }

    /// Whitelist with [`ListenerPriority::Normal`].
    pub fn of<I>(types: I) -> Self
    where
        I: IntoIterator<Item = PacketType>,
    {
        Self::new(ListenerPriority::Normal, types)
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn priority(&self) -> ListenerPriority {
        self.priority
    }

    pub fn types(&self) -> &BTreeSet<PacketType> {
        &self.types
    }

    pub fn contains(&self, packet_type: PacketType) -> bool {
        self.types.contains(&packet_type)
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// An externally registered observer of packets.
///
/// Callbacks run on worker threads owned by the listener's
/// [`crate::ListenerWorkerPool`], never on the privileged context. A panic inside a
/// callback is caught and logged; the packet continues to the next listener.
///
/// Callbacks must not block indefinitely. The only enforced bound is the packet's
/// timeout.
pub trait PacketListener: Send + Sync {
    /// Name of the component that registered this listener, used for attribution in
    /// logs and by [`crate::PacketDispatcher::unregister_all`].
    fn owner(&self) -> &str;

    /// Outbound packet types this listener wants.
    fn sending_whitelist(&self) -> ListeningWhitelist {
        ListeningWhitelist::empty()
    }

    /// Inbound packet types this listener wants.
    fn receiving_whitelist(&self) -> ListeningWhitelist {
        ListeningWhitelist::empty()
    }

    fn on_inbound(&self, _event: &mut PacketEvent) {}

    fn on_outbound(&self, _event: &mut PacketEvent) {}
}

/// Returns the whitelist a listener declared for `direction`.
pub(crate) fn whitelist_for(
    listener: &dyn PacketListener,
    direction: Direction,
) -> ListeningWhitelist {
    match direction {
        Direction::Inbound => listener.receiving_whitelist(),
        Direction::Outbound => listener.sending_whitelist(),
    }
}

/// Invokes the callback matching the event's direction.
pub(crate) fn invoke_listener(listener: &dyn PacketListener, event: &mut PacketEvent) {
    match event.direction() {
        Direction::Inbound => listener.on_inbound(event),
        Direction::Outbound => listener.on_outbound(event),
    }
}
