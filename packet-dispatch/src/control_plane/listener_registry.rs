//! Per-direction packet type to listener registry.

use crate::api::event::PacketType;
use crate::api::listener::{ListenerPriority, ListeningWhitelist};
use crate::control_plane::listener_identity::ListenerId;
use crate::data_plane::listener_pool::ListenerWorkerPool;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct ListenerRegistration {
    pool: Arc<ListenerWorkerPool>,
    priority: ListenerPriority,
    order: u64,
}

impl ListenerRegistration {
    fn sort_key(&self) -> (ListenerPriority, u64) {
        (self.priority, self.order)
    }
}

type Registrations = Arc<Vec<ListenerRegistration>>;
type RegistryMap = HashMap<PacketType, Registrations>;

/// Copy-on-write map from packet type to listeners in traversal order.
///
/// Readers take a snapshot without locking; writers rebuild the affected lists under
/// `writer` and publish a new map.
pub(crate) struct ListenerRegistry {
    by_type: ArcSwap<RegistryMap>,
    writer: Mutex<()>,
    next_order: AtomicU64,
}

impl ListenerRegistry {
    pub(crate) fn new() -> Self {
        Self {
            by_type: ArcSwap::from_pointee(HashMap::new()),
            writer: Mutex::new(()),
            next_order: AtomicU64::new(0),
        }
    }

    pub(crate) fn add(&self, pool: Arc<ListenerWorkerPool>, whitelist: &ListeningWhitelist) {
        if whitelist.is_empty() {
            return;
        }
        let _guard = self.writer.lock();
        let registration = ListenerRegistration {
            pool,
            priority: whitelist.priority(),
            order: self.next_order.fetch_add(1, Ordering::Relaxed),
        };

        let mut map = RegistryMap::clone(&self.by_type.load());
        for packet_type in whitelist.types() {
            let mut list = map
                .get(packet_type)
                .map(|existing| Vec::clone(existing))
                .unwrap_or_default();
            list.push(registration.clone());
            list.sort_by_key(ListenerRegistration::sort_key);
            map.insert(*packet_type, Arc::new(list));
        }
        self.by_type.store(Arc::new(map));
    }

    /// Removes the pool from the given types. Returns the types that no longer have any
    /// listener.
    pub(crate) fn remove(&self, id: ListenerId, types: &BTreeSet<PacketType>) -> Vec<PacketType> {
        let _guard = self.writer.lock();
        let mut map = RegistryMap::clone(&self.by_type.load());
        let mut emptied = Vec::new();

        for packet_type in types {
            let Some(existing) = map.get(packet_type) else {
                continue;
            };
            let list: Vec<_> = existing
                .iter()
                .filter(|registration| registration.pool.id() != id)
                .cloned()
                .collect();
            if list.len() == existing.len() {
                continue;
            }
            if list.is_empty() {
                map.remove(packet_type);
                emptied.push(*packet_type);
            } else {
                map.insert(*packet_type, Arc::new(list));
            }
        }
        self.by_type.store(Arc::new(map));
        emptied
    }

    pub(crate) fn cursor_for(&self, packet_type: PacketType) -> ListenerCursor {
        ListenerCursor {
            listeners: self.by_type.load().get(&packet_type).cloned(),
            position: 0,
            exhausted: false,
        }
    }

    pub(crate) fn has_listeners(&self, packet_type: PacketType) -> bool {
        self.by_type.load().contains_key(&packet_type)
    }

    pub(crate) fn types(&self) -> BTreeSet<PacketType> {
        self.by_type.load().keys().copied().collect()
    }

    pub(crate) fn clear(&self) {
        let _guard = self.writer.lock();
        self.by_type.store(Arc::new(HashMap::new()));
    }
}

/// One-shot iteration over the listeners interested in a packet, captured at admission.
#[derive(Default)]
pub(crate) struct ListenerCursor {
    listeners: Option<Registrations>,
    position: usize,
    exhausted: bool,
}

impl ListenerCursor {
    /// Yields each captured listener exactly once.
    pub(crate) fn advance(&mut self) -> Option<Arc<ListenerWorkerPool>> {
        if self.exhausted {
            return None;
        }
        let next = self
            .listeners
            .as_ref()
            .and_then(|listeners| listeners.get(self.position))
            .map(|registration| registration.pool.clone());
        match next {
            Some(pool) => {
                self.position += 1;
                Some(pool)
            }
            None => {
                self.exhaust();
                None
            }
        }
    }

    pub(crate) fn exhaust(&mut self) {
        self.exhausted = true;
        self.listeners = None;
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.listeners.as_ref().map_or(true, |listeners| listeners.is_empty())
    }
}
