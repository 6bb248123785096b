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

//! Data-plane layer.
//!
//! Moves admitted packets through the engine: the admission queue bounds how many are
//! in flight, listener worker pools invoke listeners off the privileged context, and
//! the sending buffers restore per-connection order before handing packets to the
//! transport.
//!
//! ```
//! use packet_dispatch::{
//!     ConnectionId, Direction, DispatchConfig, PacketDispatcher, PacketEvent, PacketTransport,
//!     PacketType, TransportError,
//! };
//! use std::sync::{Arc, Mutex};
//!
//! #[derive(Default)]
//! struct Collect(Mutex<Vec<u64>>);
//! impl PacketTransport for Collect {
//!     fn transmit(&self, event: &PacketEvent) -> Result<(), TransportError> {
//!         let index = event.token().map(|token| token.sending_index()).unwrap_or_default();
//!         self.0.lock().unwrap().push(index);
//!         Ok(())
//!     }
//! }
//!
//! let transport = Arc::new(Collect::default());
//! let dispatcher = PacketDispatcher::new(DispatchConfig::default(), transport.clone()).unwrap();
//! let connection = ConnectionId::new();
//!
//! // Without listeners, packets go straight to the sending buffer and out in order.
//! for _ in 0..3 {
//!     let event = PacketEvent::new(Direction::Outbound, connection, PacketType::new(1), vec![]);
//!     dispatcher.enqueue(event).unwrap();
//! }
//! assert_eq!(transport.0.lock().unwrap().len(), 3);
//! # dispatcher.shutdown();
//! ```

use crate::control_plane::listener_identity::ListenerId;
use crate::data_plane::queued_packet::QueuedPacket;
use std::sync::Arc;

pub(crate) mod admission_queue;
pub mod listener_pool;
pub(crate) mod queued_packet;
pub(crate) mod sending_buffer;
pub mod worker_loop;

/// Callbacks from the data plane into the component that owns it.
pub(crate) trait DispatchHooks: Send + Sync {
    /// Drops one processing hop; at zero the packet becomes send-eligible.
    fn signal_transmission(&self, packet: &Arc<QueuedPacket>);

    /// The packet left its last listener. Releases its admission slot and signals
    /// transmission.
    fn traversal_complete(&self, packet: &Arc<QueuedPacket>);

    fn listener_cancelled(&self, id: ListenerId);
}
