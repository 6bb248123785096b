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

//! Control-plane layer.
//!
//! Owns the registries that are mutated rarely and read on every packet: the
//! per-direction type to listener map, listener identity, timeout observers and the
//! per-connection sending buffers. Writers serialize on short critical sections while
//! readers work from immutable snapshots.
//!
//! ```
//! use packet_dispatch::{
//!     Direction, DispatchConfig, ListeningWhitelist, PacketDispatcher, PacketEvent,
//!     PacketListener, PacketTransport, PacketType, TransportError,
//! };
//! use std::sync::Arc;
//!
//! struct Discard;
//! impl PacketTransport for Discard {
//!     fn transmit(&self, _event: &PacketEvent) -> Result<(), TransportError> {
//!         Ok(())
//!     }
//! }
//!
//! struct Audit;
//! impl PacketListener for Audit {
//!     fn owner(&self) -> &str {
//!         "audit"
//!     }
//!     fn receiving_whitelist(&self) -> ListeningWhitelist {
//!         ListeningWhitelist::of([PacketType::new(0x10)])
//!     }
//! }
//!
//! let dispatcher = PacketDispatcher::new(DispatchConfig::default(), Arc::new(Discard)).unwrap();
//! let listener: Arc<dyn PacketListener> = Arc::new(Audit);
//!
//! // Registration and removal are reflected by the per-direction registry.
//! dispatcher.register_listener(listener.clone(), false).unwrap();
//! assert!(dispatcher.has_listeners(Direction::Inbound, PacketType::new(0x10)));
//! dispatcher.unregister_listener(&listener);
//! assert!(!dispatcher.has_listeners(Direction::Inbound, PacketType::new(0x10)));
//! # dispatcher.shutdown();
//! ```

pub(crate) mod connection_registry;
pub(crate) mod listener_identity;
pub(crate) mod listener_registry;
pub(crate) mod timeout_registry;
