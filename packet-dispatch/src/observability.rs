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

//! Stable event names and field formatters shared by every `tracing` call site.

pub mod events {
    pub const LISTENER_REGISTERED: &str = "listener_registered";
    pub const LISTENER_UNREGISTERED: &str = "listener_unregistered";
    pub const LISTENER_PANICKED: &str = "listener_panicked";
    pub const LISTENER_NOT_STARTED: &str = "listener_not_started";
    pub const TIMEOUT_LISTENER_PANICKED: &str = "timeout_listener_panicked";
    pub const WORKER_STARTED: &str = "worker_started";
    pub const WORKER_STOPPED: &str = "worker_stopped";
    pub const WORKER_ON_PRIVILEGED_CONTEXT: &str = "worker_on_privileged_context";
    pub const WORKER_QUEUE_OVERFLOW: &str = "worker_queue_overflow";
    pub const WORKER_RESIZE_FAILED: &str = "worker_resize_failed";
    pub const ADMISSION_OVERFLOW: &str = "admission_overflow";
    pub const PACKET_TRANSMITTED: &str = "packet_transmitted";
    pub const PACKET_TRANSMIT_FAILED: &str = "packet_transmit_failed";
    pub const PACKET_DROPPED_EXPIRED: &str = "packet_dropped_expired";
    pub const PACKET_DROPPED_CANCELLED: &str = "packet_dropped_cancelled";
    pub const PACKET_TIMEOUT_OFFERED: &str = "packet_timeout_offered";
    pub const PACKET_REORDERED: &str = "packet_reordered";
    pub const PACKET_HANDED_OFF: &str = "packet_handed_off";
    pub const PROCESSING_DELAY_UNDERFLOW: &str = "processing_delay_underflow";
    pub const CONNECTION_CREATED: &str = "connection_created";
    pub const CONNECTION_REMOVED: &str = "connection_removed";
    pub const BACKGROUND_SENDER_STOPPED: &str = "background_sender_stopped";
    pub const DISPATCHER_SHUTDOWN: &str = "dispatcher_shutdown";
}

pub mod fields {
    use crate::api::event::PacketType;
    use std::collections::BTreeSet;

    /// Renders a type set as a comma-separated list, empty for no types.
    pub fn format_types(types: &BTreeSet<PacketType>) -> String {
        types
            .iter()
            .map(|packet_type| packet_type.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Best-effort text of a caught panic payload.
    pub fn format_panic(payload: &(dyn std::any::Any + Send)) -> String {
        if let Some(message) = payload.downcast_ref::<&str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "<non-string panic payload>".to_string()
        }
    }

}
