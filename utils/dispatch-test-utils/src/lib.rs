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

//! Shared fixtures for `packet-dispatch` integration tests and benches.

use packet_dispatch::{
    ConnectionId, Direction, ListeningWhitelist, PacketEvent, PacketListener, PacketTransport,
    PacketType, TransportError,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Once;
use std::thread;
use std::time::{Duration, Instant};
use tracing::trace;
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Installs a test-writer subscriber once per process. Honors `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_thread_names(true)
            .try_init();
    });
}

/// Polls `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(2));
    }
}

/// One delivered packet as seen by [`RecordingTransport`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Transmitted {
    pub sending_index: u64,
    pub connection: ConnectionId,
    pub direction: Direction,
    pub payload: Vec<u8>,
}

/// Transport that records every packet it is asked to deliver.
#[derive(Default)]
pub struct RecordingTransport {
    transmitted: Mutex<Vec<Transmitted>>,
    fail_next: AtomicUsize,
}

impl RecordingTransport {
    pub fn transmitted(&self) -> Vec<Transmitted> {
        self.transmitted.lock().clone()
    }

    pub fn indices(&self) -> Vec<u64> {
        self.transmitted
            .lock()
            .iter()
            .map(|packet| packet.sending_index)
            .collect()
    }

    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.transmitted
            .lock()
            .iter()
            .map(|packet| packet.payload.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.transmitted.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.transmitted.lock().is_empty()
    }

    /// Makes the next `count` transmissions fail.
    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }
}

impl PacketTransport for RecordingTransport {
    fn transmit(&self, event: &PacketEvent) -> Result<(), TransportError> {
        let failing = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(TransportError::Failed("injected failure".to_string()));
        }

        let sending_index = event.token().map(|token| token.sending_index()).unwrap_or(0);
        trace!(sending_index, connection = %event.connection(), "recorded transmission");
        self.transmitted.lock().push(Transmitted {
            sending_index,
            connection: event.connection(),
            direction: event.direction(),
            payload: event.payload().to_vec(),
        });
        Ok(())
    }
}

/// Listener that records its invocations and tracks how many overlap.
pub struct RecordingListener {
    owner: String,
    sending: ListeningWhitelist,
    receiving: ListeningWhitelist,
    delay: Duration,
    seen: Mutex<Vec<u64>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    suffix: Option<u8>,
    hold: bool,
}

impl RecordingListener {
    pub fn new(owner: &str) -> Self {
        Self {
            owner: owner.to_string(),
            sending: ListeningWhitelist::empty(),
            receiving: ListeningWhitelist::empty(),
            delay: Duration::ZERO,
            seen: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            suffix: None,
            hold: false,
        }
    }

    pub fn sending(mut self, whitelist: ListeningWhitelist) -> Self {
        self.sending = whitelist;
        self
    }

    pub fn receiving(mut self, whitelist: ListeningWhitelist) -> Self {
        self.receiving = whitelist;
        self
    }

    /// Sleeps this long in every invocation.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Appends `byte` to every payload it handles.
    pub fn appending(mut self, byte: u8) -> Self {
        self.suffix = Some(byte);
        self
    }

    /// Adds a processing delay hop to every packet; the test signals it later.
    pub fn holding(mut self) -> Self {
        self.hold = true;
        self
    }

    /// Sending indices in invocation order.
    pub fn seen(&self) -> Vec<u64> {
        self.seen.lock().clone()
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn handle(&self, event: &mut PacketEvent) {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        if let Some(byte) = self.suffix {
            event.payload_mut().push(byte);
        }
        if let Some(token) = event.token() {
            if self.hold {
                token.increment_processing_delay();
            }
            self.seen.lock().push(token.sending_index());
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl PacketListener for RecordingListener {
    fn owner(&self) -> &str {
        &self.owner
    }

    fn sending_whitelist(&self) -> ListeningWhitelist {
        self.sending.clone()
    }

    fn receiving_whitelist(&self) -> ListeningWhitelist {
        self.receiving.clone()
    }

    fn on_inbound(&self, event: &mut PacketEvent) {
        self.handle(event);
    }

    fn on_outbound(&self, event: &mut PacketEvent) {
        self.handle(event);
    }
}

/// Listener that panics on every packet.
pub struct PanickingListener {
    pub packet_type: PacketType,
}

impl PacketListener for PanickingListener {
    fn owner(&self) -> &str {
        "panicking"
    }

    fn sending_whitelist(&self) -> ListeningWhitelist {
        ListeningWhitelist::of([self.packet_type])
    }

    fn on_outbound(&self, _event: &mut PacketEvent) {
        panic!("listener failure");
    }
}

/// Timeout observer that counts its calls and optionally extends the packet's life.
pub struct TimeoutRecorder {
    whitelist: ListeningWhitelist,
    extend_by: Option<Duration>,
    offered: Mutex<Vec<u64>>,
}

impl TimeoutRecorder {
    pub fn new(whitelist: ListeningWhitelist) -> Self {
        Self {
            whitelist,
            extend_by: None,
            offered: Mutex::new(Vec::new()),
        }
    }

    /// Pushes the timeout of every offered packet `extra` past its age.
    pub fn extending(mut self, extra: Duration) -> Self {
        self.extend_by = Some(extra);
        self
    }

    pub fn offered(&self) -> Vec<u64> {
        self.offered.lock().clone()
    }

    fn observe(&self, event: &mut PacketEvent) {
        let Some(token) = event.token() else {
            return;
        };
        self.offered.lock().push(token.sending_index());
        if let Some(extra) = self.extend_by {
            token.set_timeout(token.created_at().elapsed() + extra);
        }
    }
}

impl PacketListener for TimeoutRecorder {
    fn owner(&self) -> &str {
        "timeout-recorder"
    }

    fn sending_whitelist(&self) -> ListeningWhitelist {
        self.whitelist.clone()
    }

    fn receiving_whitelist(&self) -> ListeningWhitelist {
        self.whitelist.clone()
    }

    fn on_inbound(&self, event: &mut PacketEvent) {
        self.observe(event);
    }

    fn on_outbound(&self, event: &mut PacketEvent) {
        self.observe(event);
    }
}

/// Outbound event of `packet_type` carrying `payload`.
pub fn outbound(connection: ConnectionId, packet_type: u32, payload: &[u8]) -> PacketEvent {
    PacketEvent::new(
        Direction::Outbound,
        connection,
        PacketType::new(packet_type),
        payload.to_vec(),
    )
}

/// Inbound event of `packet_type` carrying `payload`.
pub fn inbound(connection: ConnectionId, packet_type: u32, payload: &[u8]) -> PacketEvent {
    PacketEvent::new(
        Direction::Inbound,
        connection,
        PacketType::new(packet_type),
        payload.to_vec(),
    )
}
