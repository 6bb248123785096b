/********************************************************************************
 * Copyright (c) 2024 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

use crate::api::bridge::InterceptionBridge;
use crate::api::event::{ConnectionId, Direction, PacketEvent, PacketType};
use crate::api::listener::PacketListener;
use crate::api::ordering_token::OrderingToken;
use crate::api::transport::PacketTransport;
use crate::config::DispatchConfig;
use crate::control_plane::connection_registry::ConnectionRegistry;
use crate::control_plane::listener_identity::{ListenerId, ListenerIdentityKey};
use crate::data_plane::admission_queue::AdmissionQueue;
use crate::data_plane::listener_pool::{ListenerWorkerPool, PoolSettings};
use crate::data_plane::queued_packet::QueuedPacket;
use crate::data_plane::sending_buffer::SendingResources;
use crate::data_plane::DispatchHooks;
use crate::error::DispatchError;
use crate::observability::{events, fields};
use crate::runtime::background_sender::BackgroundSender;
use crate::runtime::privileged::PrivilegedContext;
use crate::runtime::worker_runtime::{ThreadExecutor, WorkerExecutor};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tracing::{debug, info, warn};

const COMPONENT: &str = "dispatcher";
const BACKGROUND_SENDER_NAME: &str = "packet-dispatch-sender";

struct Registered {
    pool: Arc<ListenerWorkerPool>,
    bridged: bool,
}

/// Shared state behind a [`PacketDispatcher`]; worker pools reach it through a weak
/// reference.
struct DispatchCore {
    config: DispatchConfig,
    settings: PoolSettings,
    inbound: AdmissionQueue,
    outbound: AdmissionQueue,
    connections: ConnectionRegistry,
    listeners: Mutex<HashMap<ListenerIdentityKey, Registered>>,
    executor: Arc<dyn WorkerExecutor>,
    privileged: PrivilegedContext,
    bridge: Option<Arc<dyn InterceptionBridge>>,
    next_sending_index: AtomicU64,
    shut_down: AtomicBool,
    self_ref: Weak<DispatchCore>,
}

impl DispatchCore {
    fn admission(&self, direction: Direction) -> &AdmissionQueue {
        match direction {
            Direction::Inbound => &self.inbound,
            Direction::Outbound => &self.outbound,
        }
    }

    fn on_privileged(&self) -> bool {
        self.privileged.is_current()
    }

    fn hooks(&self) -> Weak<dyn DispatchHooks> {
        self.self_ref.clone()
    }

    fn resolve(&self, packet: &Arc<QueuedPacket>) {
        let token = packet.token();
        let Some(queues) = self.connections.get(token.connection()) else {
            return;
        };
        queues
            .buffer(token.direction())
            .resolve(packet, self.on_privileged());
    }

    /// Removes a pool from both registries. Queued packets whose types lost their
    /// last listener are resolved so nothing waits on it.
    fn detach(&self, id: ListenerId) {
        let removed = {
            let mut listeners = self.listeners.lock();
            let key = listeners
                .iter()
                .find(|(_, registered)| registered.pool.id() == id)
                .map(|(key, _)| key.clone());
            key.and_then(|key| listeners.remove(&key))
        };
        let Some(Registered { pool, bridged }) = removed else {
            return;
        };

        for direction in [Direction::Outbound, Direction::Inbound] {
            let emptied = self.admission(direction).remove_listener(&pool);
            if emptied.is_empty() {
                continue;
            }
            let emptied: BTreeSet<PacketType> = emptied.into_iter().collect();
            self.connections
                .resolve_types(direction, &emptied, self.on_privileged());
            if bridged {
                if let Some(bridge) = self.bridge.as_ref() {
                    bridge.unbridge(direction, &emptied);
                }
            }
        }

        info!(
            event = events::LISTENER_UNREGISTERED,
            component = COMPONENT,
            owner = pool.owner(),
            listener_id = %id,
            "listener unregistered"
        );
    }
}

impl DispatchHooks for DispatchCore {
    fn signal_transmission(&self, packet: &Arc<QueuedPacket>) {
        if packet.token().decrement_processing_delay() == 0 {
            self.resolve(packet);
        }
    }

    fn traversal_complete(&self, packet: &Arc<QueuedPacket>) {
        self.admission(packet.direction()).complete(self);
        self.signal_transmission(packet);
    }

    fn listener_cancelled(&self, id: ListenerId) {
        self.detach(id);
    }
}

/// Builds a [`PacketDispatcher`] with non-default execution contexts.
pub struct PacketDispatcherBuilder {
    config: DispatchConfig,
    transport: Arc<dyn PacketTransport>,
    privileged: Option<PrivilegedContext>,
    executor: Option<Arc<dyn WorkerExecutor>>,
    bridge: Option<Arc<dyn InterceptionBridge>>,
}

impl PacketDispatcherBuilder {
    pub fn new(config: DispatchConfig, transport: Arc<dyn PacketTransport>) -> Self {
        Self {
            config,
            transport,
            privileged: None,
            executor: None,
            bridge: None,
        }
    }

    /// The host's privileged thread. Defaults to the thread calling `build`.
    pub fn privileged_context(mut self, privileged: PrivilegedContext) -> Self {
        self.privileged = Some(privileged);
        self
    }

    /// Where listener workers run. Defaults to [`ThreadExecutor`].
    pub fn worker_executor(mut self, executor: Arc<dyn WorkerExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn interception_bridge(mut self, bridge: Arc<dyn InterceptionBridge>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    pub fn build(self) -> Result<PacketDispatcher, DispatchError> {
        self.config.validate()?;

        let background = BackgroundSender::spawn(BACKGROUND_SENDER_NAME)?;
        let resources = Arc::new(SendingResources::new(self.transport, background));
        let privileged = self.privileged.unwrap_or_else(PrivilegedContext::current);
        let executor = self
            .executor
            .unwrap_or_else(|| Arc::new(ThreadExecutor) as Arc<dyn WorkerExecutor>);
        let config = self.config;
        let bridge = self.bridge;

        let core = Arc::new_cyclic(|self_ref| DispatchCore {
            settings: PoolSettings::from(&config),
            inbound: AdmissionQueue::new(
                Direction::Inbound,
                config.admission_queue_capacity,
                config.maximum_concurrency,
            ),
            outbound: AdmissionQueue::new(
                Direction::Outbound,
                config.admission_queue_capacity,
                config.maximum_concurrency,
            ),
            connections: ConnectionRegistry::new(resources),
            listeners: Mutex::new(HashMap::new()),
            executor,
            privileged,
            bridge,
            next_sending_index: AtomicU64::new(0),
            shut_down: AtomicBool::new(false),
            self_ref: self_ref.clone(),
            config,
        });

        debug!(
            component = COMPONENT,
            maximum_concurrency = core.config.maximum_concurrency,
            admission_queue_capacity = core.config.admission_queue_capacity,
            worker_queue_capacity = core.config.worker_queue_capacity,
            "packet dispatcher created"
        );
        Ok(PacketDispatcher { core })
    }
}

/// Entry point of the engine.
///
/// The interception layer hands decoded packets to [`PacketDispatcher::enqueue`]; the
/// dispatcher fans them out to registered listeners off the privileged context and
/// delivers them to the transport in their original per-connection order. The host
/// drives periodic flushing through [`PacketDispatcher::tick`].
///
/// Dropping the dispatcher shuts it down.
pub struct PacketDispatcher {
    core: Arc<DispatchCore>,
}

impl PacketDispatcher {
    /// Dispatcher whose privileged context is the calling thread.
    pub fn new(
        config: DispatchConfig,
        transport: Arc<dyn PacketTransport>,
    ) -> Result<Self, DispatchError> {
        PacketDispatcherBuilder::new(config, transport).build()
    }

    pub fn builder(
        config: DispatchConfig,
        transport: Arc<dyn PacketTransport>,
    ) -> PacketDispatcherBuilder {
        PacketDispatcherBuilder::new(config, transport)
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.core.config
    }

    pub fn privileged_context(&self) -> PrivilegedContext {
        self.core.privileged
    }

    /// A fresh token with the next sending index.
    pub fn create_token(
        &self,
        direction: Direction,
        connection: ConnectionId,
    ) -> Arc<OrderingToken> {
        let index = self.core.next_sending_index.fetch_add(1, Ordering::SeqCst) + 1;
        Arc::new(OrderingToken::new(
            index,
            self.core.config.sending_delta,
            direction,
            connection,
            self.core.config.packet_timeout(),
        ))
    }

    /// Admits an intercepted packet. A token is created unless the event already
    /// carries one, which must have been created for the event's connection and
    /// direction. Returns the token so the caller can follow the packet.
    pub fn enqueue(&self, event: PacketEvent) -> Result<Arc<OrderingToken>, DispatchError> {
        let core = &self.core;
        if core.shut_down.load(Ordering::SeqCst) {
            return Err(DispatchError::ShutDown);
        }

        if let Some(token) = event.token() {
            if token.direction() != event.direction() || token.connection() != event.connection() {
                return Err(DispatchError::TokenMismatch);
            }
        }

        let direction = event.direction();
        let queues = core.connections.get_or_create(event.connection());
        let buffer = queues.buffer(direction);
        let packet = buffer.enqueue_stamped(|| {
            let token = match event.token() {
                Some(token) => token.clone(),
                None => self.create_token(direction, event.connection()),
            };
            if token.is_transmitted() || !token.mark_queued() {
                return Err(DispatchError::AlreadyQueued);
            }
            Ok(QueuedPacket::new(event, token))
        })?;
        let token = packet.token().clone();

        if let Err(error) = core.admission(direction).admit(packet.clone(), &**core) {
            packet.lock_event().set_cancelled(true);
            token.set_processed();
            buffer.flush(core.on_privileged());
            return Err(error);
        }
        Ok(token)
    }

    /// Completes a hop the listener added with
    /// [`OrderingToken::increment_processing_delay`]. The packet is sent once every
    /// hop is complete.
    pub fn signal_transmission(&self, token: &Arc<OrderingToken>) {
        if token.decrement_processing_delay() > 0 {
            return;
        }
        let Some(queues) = self.core.connections.get(token.connection()) else {
            return;
        };
        let buffer = queues.buffer(token.direction());
        if let Some(packet) = buffer.find(token) {
            buffer.resolve(&packet, self.core.on_privileged());
        }
    }

    /// Registers a listener and returns its worker pool, which starts without workers.
    /// With `auto_bridge`, the interception bridge starts routing the listener's types.
    pub fn register_listener(
        &self,
        listener: Arc<dyn PacketListener>,
        auto_bridge: bool,
    ) -> Result<Arc<ListenerWorkerPool>, DispatchError> {
        let core = &self.core;
        if core.shut_down.load(Ordering::SeqCst) {
            return Err(DispatchError::ShutDown);
        }

        if listener.sending_whitelist().is_empty() && listener.receiving_whitelist().is_empty() {
            return Err(DispatchError::EmptyWhitelist);
        }

        let key = ListenerIdentityKey::new(listener.clone());
        let pool = {
            let mut listeners = core.listeners.lock();
            if let Some(existing) = listeners.get(&key) {
                return Ok(existing.pool.clone());
            }

            let pool = ListenerWorkerPool::new(
                listener,
                core.settings,
                core.executor.clone(),
                core.privileged,
                core.hooks(),
            );
            for direction in [Direction::Outbound, Direction::Inbound] {
                core.admission(direction)
                    .add_listener(pool.clone(), pool.whitelist(direction));
            }
            listeners.insert(
                key,
                Registered {
                    pool: pool.clone(),
                    bridged: auto_bridge,
                },
            );
            pool
        };

        if auto_bridge {
            match core.bridge.as_ref() {
                Some(bridge) => {
                    for direction in [Direction::Outbound, Direction::Inbound] {
                        let types = pool.types(direction);
                        if !types.is_empty() {
                            bridge.bridge(direction, types);
                        }
                    }
                }
                None => warn!(
                    component = COMPONENT,
                    owner = pool.owner(),
                    "auto bridge requested but no interception bridge is configured"
                ),
            }
        }

        info!(
            event = events::LISTENER_REGISTERED,
            component = COMPONENT,
            owner = pool.owner(),
            listener_id = %pool.id(),
            sending = %fields::format_types(pool.types(Direction::Outbound)),
            receiving = %fields::format_types(pool.types(Direction::Inbound)),
            "listener registered"
        );
        Ok(pool)
    }

    /// Cancels the listener's pool. Returns `false` if it was not registered.
    pub fn unregister_listener(&self, listener: &Arc<dyn PacketListener>) -> bool {
        let key = ListenerIdentityKey::new(listener.clone());
        let pool = self
            .core
            .listeners
            .lock()
            .get(&key)
            .map(|registered| registered.pool.clone());
        match pool {
            Some(pool) => {
                self.unregister_pool(&pool);
                true
            }
            None => false,
        }
    }

    pub fn unregister_pool(&self, pool: &ListenerWorkerPool) {
        pool.cancel();
        // Already cancelled pools were detached when they were cancelled.
        self.core.detach(pool.id());
    }

    /// Unregisters every listener and timeout listener of `owner`. Returns how many
    /// listeners were removed.
    pub fn unregister_all(&self, owner: &str) -> usize {
        let pools: Vec<_> = self
            .core
            .listeners
            .lock()
            .values()
            .filter(|registered| registered.pool.owner() == owner)
            .map(|registered| registered.pool.clone())
            .collect();
        for pool in &pools {
            self.unregister_pool(pool);
        }
        pools.len() + self.core.connections.resources().timeouts().unregister_owner(owner)
    }

    /// Adds an observer that is offered packets which expired before being resolved.
    /// Returns `false` if it was already registered.
    pub fn register_timeout_listener(
        &self,
        listener: Arc<dyn PacketListener>,
    ) -> Result<bool, DispatchError> {
        if listener.sending_whitelist().is_empty() && listener.receiving_whitelist().is_empty() {
            return Err(DispatchError::EmptyWhitelist);
        }
        Ok(self
            .core
            .connections
            .resources()
            .timeouts()
            .register(listener))
    }

    pub fn unregister_timeout_listener(&self, listener: &Arc<dyn PacketListener>) -> bool {
        self.core
            .connections
            .resources()
            .timeouts()
            .unregister(listener)
    }

    /// Called once per host tick. Inbound buffers flush every tick, outbound buffers
    /// every `outbound_flush_interval` ticks.
    pub fn tick(&self, counter: u64, on_privileged: bool) {
        let core = &self.core;
        if core.shut_down.load(Ordering::SeqCst) {
            return;
        }
        if counter % core.config.outbound_flush_interval == 0 {
            core.connections.flush_all(Direction::Outbound, on_privileged);
        }
        core.connections.flush_all(Direction::Inbound, on_privileged);

        let now = Instant::now();
        let threshold = core.config.unstarted_warning();
        for pool in self.listeners() {
            pool.warn_if_unstarted(now, threshold);
        }
    }

    /// Discards the connection's buffers along with anything still queued in them.
    pub fn remove_connection(&self, connection: ConnectionId) -> bool {
        self.core.connections.remove(connection)
    }

    pub fn listened_types(&self, direction: Direction) -> BTreeSet<PacketType> {
        self.core.admission(direction).listened_types()
    }

    pub fn has_listeners(&self, direction: Direction, packet_type: PacketType) -> bool {
        self.core
            .admission(direction)
            .registry()
            .has_listeners(packet_type)
    }

    pub fn listeners(&self) -> Vec<Arc<ListenerWorkerPool>> {
        self.core
            .listeners
            .lock()
            .values()
            .map(|registered| registered.pool.clone())
            .collect()
    }

    pub fn timeout_listeners(&self) -> Vec<Arc<dyn PacketListener>> {
        self.core.connections.resources().timeouts().listeners()
    }

    /// Packets admitted but waiting for a concurrency slot.
    pub fn pending(&self, direction: Direction) -> usize {
        self.core.admission(direction).pending()
    }

    /// Packets currently holding a concurrency slot.
    pub fn in_flight(&self, direction: Direction) -> usize {
        self.core.admission(direction).in_flight()
    }

    /// Packets held in sending buffers, waiting for resolution or their turn.
    pub fn buffered(&self, direction: Direction) -> usize {
        self.core.connections.buffered(direction)
    }

    pub fn connection_count(&self) -> usize {
        self.core.connections.len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.core.shut_down.load(Ordering::SeqCst)
    }

    /// Cancels every listener pool and sends everything still buffered, ignoring
    /// order. Idempotent.
    pub fn shutdown(&self) {
        let core = &self.core;
        if core.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        for direction in [Direction::Outbound, Direction::Inbound] {
            core.admission(direction).registry().clear();
        }
        let pools: Vec<_> = core
            .listeners
            .lock()
            .drain()
            .map(|(_, registered)| registered.pool)
            .collect();
        for pool in &pools {
            pool.cancel();
        }

        let forced = core.connections.force_flush_all();
        let abandoned = core.inbound.take_pending().len() + core.outbound.take_pending().len();
        core.connections.resources().background().shutdown();

        info!(
            event = events::DISPATCHER_SHUTDOWN,
            component = COMPONENT,
            listeners = pools.len(),
            forced,
            abandoned,
            "packet dispatcher shut down"
        );
    }
}

impl Drop for PacketDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Debug for PacketDispatcher {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketDispatcher")
            .field("listeners", &self.core.listeners.lock().len())
            .field("connections", &self.connection_count())
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::PacketDispatcher;
    use crate::api::bridge::InterceptionBridge;
    use crate::api::event::{ConnectionId, Direction, PacketEvent, PacketType};
    use crate::api::listener::{ListeningWhitelist, PacketListener};
    use crate::api::transport::{PacketTransport, TransportError};
    use crate::config::DispatchConfig;
    use crate::error::DispatchError;
    use parking_lot::Mutex;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    #[derive(Default)]
    struct Recording(Mutex<Vec<u64>>);

    impl PacketTransport for Recording {
        fn transmit(&self, event: &PacketEvent) -> Result<(), TransportError> {
            let index = event.token().map(|token| token.sending_index()).unwrap_or(0);
            self.0.lock().push(index);
            Ok(())
        }
    }

    struct Typed {
        owner: &'static str,
        receiving: Vec<u32>,
    }

    impl PacketListener for Typed {
        fn owner(&self) -> &str {
            self.owner
        }

        fn receiving_whitelist(&self) -> ListeningWhitelist {
            ListeningWhitelist::of(self.receiving.iter().copied().map(PacketType::new))
        }
    }

    #[derive(Default)]
    struct RecordingBridge {
        calls: Mutex<Vec<(bool, Direction, BTreeSet<PacketType>)>>,
    }

    impl InterceptionBridge for RecordingBridge {
        fn bridge(&self, direction: Direction, types: &BTreeSet<PacketType>) {
            self.calls.lock().push((true, direction, types.clone()));
        }

        fn unbridge(&self, direction: Direction, types: &BTreeSet<PacketType>) {
            self.calls.lock().push((false, direction, types.clone()));
        }
    }

    fn dispatcher(transport: Arc<Recording>) -> PacketDispatcher {
        PacketDispatcher::new(DispatchConfig::default(), transport).expect("dispatcher")
    }

    fn inbound(connection: ConnectionId, packet_type: u32) -> PacketEvent {
        PacketEvent::new(
            Direction::Inbound,
            connection,
            PacketType::new(packet_type),
            Vec::new(),
        )
    }

    #[test]
    fn sending_indices_increase_in_admission_order() {
        let dispatcher = dispatcher(Arc::new(Recording::default()));
        let connection = ConnectionId::new();

        let first = dispatcher.create_token(Direction::Inbound, connection);
        let second = dispatcher.create_token(Direction::Outbound, connection);

        assert!(second.sending_index() > first.sending_index());
    }

    #[test]
    fn enqueueing_the_same_token_twice_fails() {
        let transport = Arc::new(Recording::default());
        let dispatcher = dispatcher(transport.clone());
        let connection = ConnectionId::new();

        let token = dispatcher
            .enqueue(inbound(connection, 1))
            .expect("first enqueue");
        let again = inbound(connection, 1).with_token(token);

        assert_eq!(dispatcher.enqueue(again).err(), Some(DispatchError::AlreadyQueued));
        assert_eq!(transport.0.lock().len(), 1);
    }

    #[test]
    fn empty_whitelists_are_rejected() {
        let dispatcher = dispatcher(Arc::new(Recording::default()));
        let listener = Arc::new(Typed {
            owner: "empty",
            receiving: Vec::new(),
        });

        assert!(matches!(
            dispatcher.register_listener(listener.clone(), false),
            Err(DispatchError::EmptyWhitelist)
        ));
        assert!(matches!(
            dispatcher.register_timeout_listener(listener),
            Err(DispatchError::EmptyWhitelist)
        ));
        assert!(dispatcher.listeners().is_empty());
    }

    #[test]
    fn registering_twice_returns_the_same_pool() {
        let dispatcher = dispatcher(Arc::new(Recording::default()));
        let listener: Arc<dyn PacketListener> = Arc::new(Typed {
            owner: "twice",
            receiving: vec![1],
        });

        let first = dispatcher
            .register_listener(listener.clone(), false)
            .expect("register");
        let second = dispatcher
            .register_listener(listener.clone(), false)
            .expect("register again");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(dispatcher.listeners().len(), 1);
        assert!(dispatcher.unregister_listener(&listener));
        assert!(!dispatcher.unregister_listener(&listener));
        assert!(first.is_cancelled());
    }

    #[test]
    fn auto_bridge_follows_registration() {
        let bridge = Arc::new(RecordingBridge::default());
        let dispatcher = PacketDispatcher::builder(
            DispatchConfig::default(),
            Arc::new(Recording::default()),
        )
        .interception_bridge(bridge.clone())
        .build()
        .expect("dispatcher");
        let listener: Arc<dyn PacketListener> = Arc::new(Typed {
            owner: "bridged",
            receiving: vec![3, 4],
        });
        let types = BTreeSet::from([PacketType::new(3), PacketType::new(4)]);

        dispatcher
            .register_listener(listener.clone(), true)
            .expect("register");
        dispatcher.unregister_listener(&listener);

        assert_eq!(
            *bridge.calls.lock(),
            vec![
                (true, Direction::Inbound, types.clone()),
                (false, Direction::Inbound, types)
            ]
        );
    }

    #[test]
    fn unregister_all_removes_only_that_owner() {
        let dispatcher = dispatcher(Arc::new(Recording::default()));
        for owner in ["plugin-a", "plugin-a", "plugin-b"] {
            dispatcher
                .register_listener(
                    Arc::new(Typed {
                        owner,
                        receiving: vec![1],
                    }),
                    false,
                )
                .expect("register");
        }
        dispatcher
            .register_timeout_listener(Arc::new(Typed {
                owner: "plugin-a",
                receiving: vec![1],
            }))
            .expect("register timeout listener");

        assert_eq!(dispatcher.unregister_all("plugin-a"), 3);
        assert_eq!(dispatcher.listeners().len(), 1);
        assert!(dispatcher.timeout_listeners().is_empty());
        assert!(dispatcher.has_listeners(Direction::Inbound, PacketType::new(1)));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = DispatchConfig {
            maximum_concurrency: 0,
            ..DispatchConfig::default()
        };
        assert!(matches!(
            PacketDispatcher::new(config, Arc::new(Recording::default())),
            Err(DispatchError::InvalidConfig(_))
        ));
    }

    #[test]
    fn enqueue_after_shutdown_fails() {
        let dispatcher = dispatcher(Arc::new(Recording::default()));
        dispatcher.shutdown();
        dispatcher.shutdown();

        assert!(dispatcher.is_shut_down());
        assert_eq!(
            dispatcher.enqueue(inbound(ConnectionId::new(), 1)).err(),
            Some(DispatchError::ShutDown)
        );
    }
}
