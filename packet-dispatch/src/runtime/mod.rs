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

//! Runtime integration layer.
//!
//! Isolates the execution contexts the engine runs on: the host's privileged thread,
//! the executors listener workers are launched on, and the dedicated background
//! sender, so threading behavior stays localized for the rest of the crate.
//!
//! ```
//! use packet_dispatch::{PrivilegedContext, ThreadExecutor, WorkerExecutor};
//!
//! let privileged = PrivilegedContext::current();
//! assert!(privileged.is_current());
//!
//! let (tx, rx) = std::sync::mpsc::channel();
//! ThreadExecutor
//!     .execute(
//!         "runtime-doc".to_string(),
//!         Box::new(move || {
//!             tx.send(privileged.is_current()).unwrap();
//!         }),
//!     )
//!     .unwrap();
//! assert!(!rx.recv().unwrap());
//! ```

pub(crate) mod background_sender;
pub mod privileged;
pub mod worker_runtime;
