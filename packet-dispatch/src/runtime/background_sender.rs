//! Dedicated background context for deliveries that must avoid the privileged thread.

use crate::error::DispatchError;
use crate::observability::{events, fields};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use tokio::runtime::Builder;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, trace};

const COMPONENT: &str = "background_sender";

pub(crate) type DeliveryJob = Box<dyn FnOnce() + Send + 'static>;

/// Single FIFO delivery thread. Jobs run in submission order.
pub(crate) struct BackgroundSender {
    sender: Mutex<Option<UnboundedSender<DeliveryJob>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl BackgroundSender {
    pub(crate) fn spawn(name: &str) -> Result<Self, DispatchError> {
        let (sender, receiver) = unbounded_channel();
        let handle = spawn_delivery_loop(name, receiver)?;

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Queues a delivery. Returns `false` once the sender has been shut down.
    pub(crate) fn submit(&self, job: DeliveryJob) -> bool {
        match self.sender.lock().as_ref() {
            Some(sender) => sender.send(job).is_ok(),
            None => false,
        }
    }

    /// Lets queued deliveries finish, then stops the thread.
    pub(crate) fn shutdown(&self) {
        drop(self.sender.lock().take());

        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            error!(
                event = events::BACKGROUND_SENDER_STOPPED,
                component = COMPONENT,
                "background sender thread panicked"
            );
        }
    }
}

impl Drop for BackgroundSender {
    fn drop(&mut self) {
        drop(self.sender.get_mut().take());
    }
}

fn spawn_delivery_loop(
    name: &str,
    receiver: UnboundedReceiver<DeliveryJob>,
) -> Result<JoinHandle<()>, DispatchError> {
    let runtime = Builder::new_current_thread()
        .build()
        .map_err(|error| DispatchError::Executor(error.to_string()))?;

    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            trace!("within background sender runtime");
            runtime.block_on(delivery_loop(receiver));
            debug!(
                event = events::BACKGROUND_SENDER_STOPPED,
                component = COMPONENT,
                "background sender loop finished"
            );
        })
        .map_err(|error| DispatchError::Executor(error.to_string()))
}

async fn delivery_loop(mut receiver: UnboundedReceiver<DeliveryJob>) {
    while let Some(job) = receiver.recv().await {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
            error!(
                event = events::PACKET_TRANSMIT_FAILED,
                component = COMPONENT,
                panic = %fields::format_panic(payload.as_ref()),
                "background delivery panicked"
            );
        }
    }
}
