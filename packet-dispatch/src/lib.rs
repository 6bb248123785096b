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

//! # packet-dispatch
//!
//! `packet-dispatch` sits between an interception layer and a transport. Intercepted
//! packets are handed to registered listeners on worker threads, away from the host's
//! privileged thread, and are delivered afterwards in their original order per
//! connection and direction.
//!
//! Typical usage is centered on [`PacketDispatcher`]: register listeners, start their
//! workers, feed packets through [`PacketDispatcher::enqueue`] and call
//! [`PacketDispatcher::tick`] once per host iteration.
//!
//! ```
//! use packet_dispatch::{
//!     ConnectionId, Direction, DispatchConfig, ListeningWhitelist, PacketDispatcher,
//!     PacketEvent, PacketListener, PacketTransport, PacketType, TransportError,
//! };
//! use std::sync::{Arc, Mutex};
//! use std::time::{Duration, Instant};
//!
//! #[derive(Default)]
//! struct Collect(Mutex<Vec<Vec<u8>>>);
//!
//! impl PacketTransport for Collect {
//!     fn transmit(&self, event: &PacketEvent) -> Result<(), TransportError> {
//!         self.0.lock().unwrap().push(event.payload().to_vec());
//!         Ok(())
//!     }
//! }
//!
//! struct Upper;
//!
//! impl PacketListener for Upper {
//!     fn owner(&self) -> &str {
//!         "quick-start"
//!     }
//!
//!     fn sending_whitelist(&self) -> ListeningWhitelist {
//!         ListeningWhitelist::of([PacketType::new(0x0F)])
//!     }
//!
//!     fn on_outbound(&self, event: &mut PacketEvent) {
//!         event.payload_mut().make_ascii_uppercase();
//!     }
//! }
//!
//! let transport = Arc::new(Collect::default());
//! let dispatcher = PacketDispatcher::new(DispatchConfig::default(), transport.clone()).unwrap();
//! let pool = dispatcher.register_listener(Arc::new(Upper), false).unwrap();
//! pool.set_workers(2).unwrap();
//!
//! let connection = ConnectionId::new();
//! for text in ["hello", "world"] {
//!     let event = PacketEvent::new(
//!         Direction::Outbound,
//!         connection,
//!         PacketType::new(0x0F),
//!         text.as_bytes().to_vec(),
//!     );
//!     dispatcher.enqueue(event).unwrap();
//! }
//!
//! let deadline = Instant::now() + Duration::from_secs(5);
//! while transport.0.lock().unwrap().len() < 2 && Instant::now() < deadline {
//!     std::thread::sleep(Duration::from_millis(5));
//! }
//! assert_eq!(
//!     *transport.0.lock().unwrap(),
//!     vec![b"HELLO".to_vec(), b"WORLD".to_vec()]
//! );
//! dispatcher.shutdown();
//! ```
//!
//! ## Delivery contract
//!
//! Packets of one connection and direction are transmitted in sending-index order: a
//! packet still being processed holds back every later one. Packets that expire first
//! are offered once to the timeout listeners and then dropped. Inbound packets are only
//! transmitted from the privileged context, so hosts flush them through
//! [`PacketDispatcher::tick`] with `on_privileged = true`.
//!
//! ## Logging
//!
//! The crate emits `tracing` events with stable `event` and `component` fields. It never
//! installs a global subscriber; binaries and tests initialize `tracing_subscriber`
//! once at their process boundary.

mod api;
mod config;
mod control_plane;
mod data_plane;
mod dispatcher;
mod error;
#[doc(hidden)]
pub mod observability;
mod runtime;

pub use api::bridge::InterceptionBridge;
pub use api::event::{ConnectionId, Direction, PacketEvent, PacketType};
pub use api::listener::{ListenerPriority, ListeningWhitelist, PacketListener};
pub use api::ordering_token::OrderingToken;
pub use api::transport::{PacketTransport, TransportError};
pub use config::DispatchConfig;
pub use control_plane::listener_identity::ListenerId;
pub use data_plane::listener_pool::ListenerWorkerPool;
pub use data_plane::worker_loop::WorkerLoop;
pub use dispatcher::{PacketDispatcher, PacketDispatcherBuilder};
pub use error::DispatchError;
pub use runtime::privileged::PrivilegedContext;
pub use runtime::worker_runtime::{
    ThreadExecutor, TokioBlockingExecutor, WorkerExecutor, WorkerJob,
};
