//! Worker loop state machine and the signals that steer it.

use crate::data_plane::listener_pool::ListenerWorkerPool;
use crate::data_plane::queued_packet::QueuedPacket;
use crate::error::DispatchError;
use crate::observability::events;
use crossbeam_channel::Sender;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

const COMPONENT: &str = "worker_loop";

/// Element of a listener's bounded queue.
pub(crate) enum WorkerSignal {
    Data(Arc<QueuedPacket>),
    Wake(Arc<StopTicket>),
    Interrupt,
}

/// Coordinates a blocking `stop`: workers that exit on this ticket acknowledge it, the
/// caller waits on the condition variable until every expected exit is in.
pub(crate) struct StopTicket {
    target: Option<u64>,
    remaining: Mutex<usize>,
    settled: Condvar,
    abandoned: AtomicBool,
}

impl StopTicket {
    /// Any `count` workers may exit.
    pub(crate) fn any(count: usize) -> Self {
        Self::new(None, count)
    }

    /// Only the worker with this id may exit.
    pub(crate) fn targeted(worker_id: u64) -> Self {
        Self::new(Some(worker_id), 1)
    }

    fn new(target: Option<u64>, count: usize) -> Self {
        Self {
            target,
            remaining: Mutex::new(count),
            settled: Condvar::new(),
            abandoned: AtomicBool::new(false),
        }
    }

    fn should_exit(&self, worker_id: u64) -> bool {
        !self.is_abandoned() && self.target.map_or(true, |target| target == worker_id)
    }

    pub(crate) fn acknowledge(&self) {
        let mut remaining = self.remaining.lock();
        *remaining = remaining.saturating_sub(1);
        if *remaining == 0 {
            self.settled.notify_all();
        }
    }

    pub(crate) fn remaining(&self) -> usize {
        *self.remaining.lock()
    }

    /// Waits up to `period` for all acknowledgements. Returns `true` once settled.
    pub(crate) fn wait(&self, period: Duration) -> bool {
        let mut remaining = self.remaining.lock();
        if *remaining > 0 && !self.is_abandoned() {
            self.settled.wait_for(&mut remaining, period);
        }
        *remaining == 0 || self.is_abandoned()
    }

    pub(crate) fn abandon(&self) {
        let _remaining = self.remaining.lock();
        self.abandoned.store(true, Ordering::SeqCst);
        self.settled.notify_all();
    }

    pub(crate) fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::SeqCst)
    }
}

struct LoopState {
    worker_id: u64,
    first_run: AtomicBool,
    finished: AtomicBool,
}

/// One-shot handle to a single worker of a [`ListenerWorkerPool`].
///
/// Obtained from [`ListenerWorkerPool::worker_loop`] when the caller wants to drive the
/// worker on a thread of its own choosing. Clones share the same loop, so one clone can
/// be run while another is used to stop it.
#[derive(Clone)]
pub struct WorkerLoop {
    pool: Arc<ListenerWorkerPool>,
    state: Arc<LoopState>,
}

impl WorkerLoop {
    pub(crate) fn new(pool: Arc<ListenerWorkerPool>, worker_id: u64) -> Self {
        Self {
            pool,
            state: Arc::new(LoopState {
                worker_id,
                first_run: AtomicBool::new(false),
                finished: AtomicBool::new(false),
            }),
        }
    }

    pub fn worker_id(&self) -> u64 {
        self.state.worker_id
    }

    pub fn is_running(&self) -> bool {
        self.state.first_run.load(Ordering::SeqCst) && !self.is_finished()
    }

    pub fn is_finished(&self) -> bool {
        self.state.finished.load(Ordering::SeqCst)
    }

    /// Runs the worker on the calling thread until it is stopped or the pool is
    /// cancelled.
    pub fn run(&self) -> Result<(), DispatchError> {
        self.run_reporting(None)
    }

    /// Stops this particular worker and waits for it to exit. Returns `false` if the loop
    /// was not running.
    pub fn stop(&self) -> Result<bool, DispatchError> {
        if !self.is_running() {
            return Ok(false);
        }
        let ticket = Arc::new(StopTicket::targeted(self.worker_id()));
        self.pool.await_stop(ticket, self.pool.worker_count().max(1))?;
        Ok(true)
    }

    pub(crate) fn run_reporting(
        &self,
        started: Option<Sender<Result<(), DispatchError>>>,
    ) -> Result<(), DispatchError> {
        if let Err(refusal) = self.check_runnable() {
            if let Some(started) = started {
                let _ = started.send(Err(refusal.clone()));
            }
            return Err(refusal);
        }

        self.pool.worker_started();
        if let Some(started) = started {
            let _ = started.send(Ok(()));
        }
        info!(
            event = events::WORKER_STARTED,
            component = COMPONENT,
            owner = self.pool.owner(),
            worker_id = self.worker_id(),
            "listener worker started"
        );

        let exit_ticket = self.event_loop();

        self.pool.worker_exited();
        self.state.finished.store(true, Ordering::SeqCst);
        if let Some(ticket) = exit_ticket {
            ticket.acknowledge();
        }
        info!(
            event = events::WORKER_STOPPED,
            component = COMPONENT,
            owner = self.pool.owner(),
            worker_id = self.worker_id(),
            "listener worker stopped"
        );
        Ok(())
    }

    fn check_runnable(&self) -> Result<(), DispatchError> {
        if self.pool.privileged().is_current() {
            error!(
                event = events::WORKER_ON_PRIVILEGED_CONTEXT,
                component = COMPONENT,
                owner = self.pool.owner(),
                worker_id = self.worker_id(),
                "listener worker must not run on the privileged context"
            );
            return Err(DispatchError::OnPrivilegedContext);
        }
        if self.pool.is_cancelled() {
            return Err(DispatchError::AlreadyCancelled);
        }
        if self.state.first_run.swap(true, Ordering::SeqCst) {
            return Err(DispatchError::AlreadyRunning);
        }
        Ok(())
    }

    /// Returns the stop ticket this worker exited on, if any.
    fn event_loop(&self) -> Option<Arc<StopTicket>> {
        let worker_id = self.worker_id();
        while !self.pool.is_cancelled() {
            match self.pool.next_signal()? {
                WorkerSignal::Interrupt => {
                    self.pool.interrupt_consumed();
                    return None;
                }
                WorkerSignal::Wake(ticket) => {
                    if ticket.should_exit(worker_id) {
                        return Some(ticket);
                    }
                    // Another worker was asked to stop; hold still until it has.
                    while !ticket.wait(self.pool.stop_poll()) && !self.pool.is_cancelled() {}
                }
                WorkerSignal::Data(packet) => self.pool.process(worker_id, packet),
            }
        }
        None
    }
}
