//! Identity of the host's privileged single-threaded context.

use std::thread::{self, ThreadId};

/// The thread the host reserves for its own state.
///
/// Listener work must never run here, and inbound packets may only be transmitted
/// from here.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PrivilegedContext {
    thread: ThreadId,
}

impl PrivilegedContext {
    /// The calling thread becomes the privileged context.
    pub fn current() -> Self {
        Self {
            thread: thread::current().id(),
        }
    }

    pub fn from_thread(thread: ThreadId) -> Self {
        Self { thread }
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread
    }

    pub fn is_current(&self) -> bool {
        thread::current().id() == self.thread
    }
}
