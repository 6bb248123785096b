//! Identity keys for listeners and their worker pools.

use crate::api::listener::PacketListener;
use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Process-unique id of one listener worker pool.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ListenerId(u64);

impl ListenerId {
    pub(crate) fn next() -> Self {
        static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl Display for ListenerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Compares listeners by the allocation behind their `Arc`, not by value.
#[derive(Clone)]
pub(crate) struct ListenerIdentityKey {
    listener: Arc<dyn PacketListener>,
}

impl ListenerIdentityKey {
    pub(crate) fn new(listener: Arc<dyn PacketListener>) -> Self {
        Self { listener }
    }

    fn address(&self) -> *const () {
        Arc::as_ptr(&self.listener) as *const ()
    }
}

impl Hash for ListenerIdentityKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address().hash(state);
    }
}

impl PartialEq for ListenerIdentityKey {
    fn eq(&self, other: &Self) -> bool {
        self.address() == other.address()
    }
}

impl Eq for ListenerIdentityKey {}

impl Debug for ListenerIdentityKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerIdentityKey")
            .field("owner", &self.listener.owner())
            .finish_non_exhaustive()
    }
}
