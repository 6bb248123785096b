//! Observers offered packets whose deadline passed before they were resolved.

use crate::api::event::PacketEvent;
use crate::api::listener::{invoke_listener, whitelist_for, PacketListener};
use crate::control_plane::listener_identity::ListenerIdentityKey;
use crate::observability::{events, fields};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error};

const COMPONENT: &str = "timeout_registry";

pub(crate) struct TimeoutRegistry {
    observers: ArcSwap<Vec<Arc<dyn PacketListener>>>,
    writer: Mutex<()>,
}

impl TimeoutRegistry {
    pub(crate) fn new() -> Self {
        Self {
            observers: ArcSwap::from_pointee(Vec::new()),
            writer: Mutex::new(()),
        }
    }

    /// Returns `false` when the observer was already registered.
    pub(crate) fn register(&self, listener: Arc<dyn PacketListener>) -> bool {
        let _guard = self.writer.lock();
        let key = ListenerIdentityKey::new(listener.clone());
        let current = self.observers.load();
        if current
            .iter()
            .any(|existing| ListenerIdentityKey::new(existing.clone()) == key)
        {
            return false;
        }

        let mut observers = Vec::clone(&current);
        observers.push(listener);
        self.observers.store(Arc::new(observers));
        true
    }

    pub(crate) fn unregister(&self, listener: &Arc<dyn PacketListener>) -> bool {
        let _guard = self.writer.lock();
        let key = ListenerIdentityKey::new(listener.clone());
        let current = self.observers.load();
        let observers: Vec<_> = current
            .iter()
            .filter(|existing| ListenerIdentityKey::new((*existing).clone()) != key)
            .cloned()
            .collect();
        let removed = observers.len() != current.len();
        self.observers.store(Arc::new(observers));
        removed
    }

    /// Removes every observer registered by `owner`, returning how many were removed.
    pub(crate) fn unregister_owner(&self, owner: &str) -> usize {
        let _guard = self.writer.lock();
        let current = self.observers.load();
        let observers: Vec<_> = current
            .iter()
            .filter(|existing| existing.owner() != owner)
            .cloned()
            .collect();
        let removed = current.len() - observers.len();
        self.observers.store(Arc::new(observers));
        removed
    }

    pub(crate) fn listeners(&self) -> Vec<Arc<dyn PacketListener>> {
        Vec::clone(&self.observers.load())
    }

    /// Invokes every observer whose whitelist for the event's direction contains its
    /// type. Returns the number of observers invoked.
    pub(crate) fn offer(&self, event: &mut PacketEvent) -> usize {
        let direction = event.direction();
        let packet_type = event.packet_type();
        let mut invoked = 0;

        for observer in self.observers.load().iter() {
            if !whitelist_for(observer.as_ref(), direction).contains(packet_type) {
                continue;
            }
            invoked += 1;
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| invoke_listener(observer.as_ref(), event)));
            if let Err(payload) = outcome {
                error!(
                    event = events::TIMEOUT_LISTENER_PANICKED,
                    component = COMPONENT,
                    owner = observer.owner(),
                    packet_type = %packet_type,
                    panic = %fields::format_panic(payload.as_ref()),
                    "timeout listener panicked"
                );
            }
        }

        debug!(
            event = events::PACKET_TIMEOUT_OFFERED,
            component = COMPONENT,
            packet_type = %packet_type,
            direction = %direction,
            observers = invoked,
            "offered expired packet to timeout listeners"
        );
        invoked
    }
}
