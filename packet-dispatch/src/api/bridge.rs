//! Optional hook into the interception layer.

use crate::api::event::{Direction, PacketType};
use std::collections::BTreeSet;

/// Tells the interception layer which packet types must be diverted into
/// [`crate::PacketDispatcher::enqueue`].
///
/// Used when a listener is registered with `auto_bridge` set.
pub trait InterceptionBridge: Send + Sync {
    fn bridge(&self, direction: Direction, types: &BTreeSet<PacketType>);

    fn unbridge(&self, direction: Direction, types: &BTreeSet<PacketType>);
}
