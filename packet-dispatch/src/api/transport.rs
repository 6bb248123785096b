//! Transport capability used by sending buffers for final delivery.

use crate::api::event::{ConnectionId, PacketEvent};
use std::error::Error;
use std::fmt;
use std::fmt::{Debug, Display, Formatter};

pub enum TransportError {
    /// The endpoint disconnected before the packet could be delivered.
    NotConnected(ConnectionId),
    Failed(String),
}

impl Debug for TransportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::NotConnected(connection) => {
                write!(f, "NotConnected({connection})")
            }
            TransportError::Failed(reason) => write!(f, "Failed({reason:?})"),
        }
    }
}

impl Display for TransportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::NotConnected(connection) => {
                write!(f, "Connection {connection} is no longer connected")
            }
            TransportError::Failed(reason) => write!(f, "Transmission failed: {reason}"),
        }
    }
}

impl Error for TransportError {}

/// Performs the final byte-level transmission of a resolved packet.
///
/// Failures are logged by the caller and the packet is dropped; transmission is never
/// retried.
pub trait PacketTransport: Send + Sync {
    fn transmit(&self, event: &PacketEvent) -> Result<(), TransportError>;
}
