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

//! API layer.
//!
//! Public data model and the capabilities the dispatcher consumes from its host:
//! packet events and their ordering tokens, listeners, the transport and the
//! optional interception bridge.
//!
//! ```
//! use packet_dispatch::{ConnectionId, Direction, PacketEvent, PacketType};
//!
//! let connection = ConnectionId::new();
//! let mut event = PacketEvent::new(
//!     Direction::Inbound,
//!     connection,
//!     PacketType::new(0x0E),
//!     vec![1, 2, 3],
//! );
//! assert!(event.token().is_none());
//! event.set_cancelled(true);
//! assert!(event.is_cancelled());
//! ```

pub mod bridge;
pub mod event;
pub mod listener;
pub mod ordering_token;
pub mod transport;
