//! Error taxonomy of the dispatch engine.

use std::error::Error;
use std::fmt;
use std::fmt::{Debug, Display, Formatter};

#[derive(Clone, Eq, PartialEq)]
pub enum DispatchError {
    /// A bounded queue was full; the packet was dropped.
    QueueOverflow { queue: &'static str, capacity: usize },
    /// The listener worker pool has been cancelled.
    AlreadyCancelled,
    /// `set_workers` could not reach its target within the resize window.
    ConvergenceFailure { target: usize, actual: usize },
    /// Listener work was attempted on the privileged context.
    OnPrivilegedContext,
    /// A one-shot worker loop was run twice.
    AlreadyRunning,
    /// The packet's token was already queued or transmitted.
    AlreadyQueued,
    /// The event carries a token stamped for another connection or direction.
    TokenMismatch,
    /// A listener declared neither a sending nor a receiving whitelist.
    EmptyWhitelist,
    InvalidConfig(String),
    /// The execution context refused to run a worker.
    Executor(String),
    /// The dispatcher has been shut down.
    ShutDown,
}

impl Debug for DispatchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::QueueOverflow { queue, capacity } => {
                write!(f, "QueueOverflow({queue}, {capacity})")
            }
            DispatchError::AlreadyCancelled => write!(f, "AlreadyCancelled"),
            DispatchError::ConvergenceFailure { target, actual } => {
                write!(f, "ConvergenceFailure({target}, {actual})")
            }
            DispatchError::OnPrivilegedContext => write!(f, "OnPrivilegedContext"),
            DispatchError::AlreadyRunning => write!(f, "AlreadyRunning"),
            DispatchError::AlreadyQueued => write!(f, "AlreadyQueued"),
            DispatchError::TokenMismatch => write!(f, "TokenMismatch"),
            DispatchError::EmptyWhitelist => write!(f, "EmptyWhitelist"),
            DispatchError::InvalidConfig(reason) => write!(f, "InvalidConfig({reason:?})"),
            DispatchError::Executor(reason) => write!(f, "Executor({reason:?})"),
            DispatchError::ShutDown => write!(f, "ShutDown"),
        }
    }
}

impl Display for DispatchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::QueueOverflow { queue, capacity } => {
                write!(f, "The {queue} queue is full (capacity {capacity})")
            }
            DispatchError::AlreadyCancelled => {
                write!(f, "The listener worker pool has been cancelled")
            }
            DispatchError::ConvergenceFailure { target, actual } => write!(
                f,
                "Failed to set worker count to {target}, stuck at {actual}; concurrent resize?"
            ),
            DispatchError::OnPrivilegedContext => {
                write!(f, "Listener workers must not run on the privileged context")
            }
            DispatchError::AlreadyRunning => {
                write!(f, "This worker loop has already been run, create a new one")
            }
            DispatchError::AlreadyQueued => {
                write!(f, "Cannot queue a packet that has already been queued")
            }
            DispatchError::TokenMismatch => {
                write!(f, "The packet's token belongs to another connection or direction")
            }
            DispatchError::EmptyWhitelist => {
                write!(f, "Listener has an empty sending and receiving whitelist")
            }
            DispatchError::InvalidConfig(reason) => write!(f, "Invalid configuration: {reason}"),
            DispatchError::Executor(reason) => write!(f, "Unable to schedule worker: {reason}"),
            DispatchError::ShutDown => write!(f, "The dispatcher has been shut down"),
        }
    }
}

impl Error for DispatchError {}
