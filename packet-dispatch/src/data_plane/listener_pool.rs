//! Per-listener bounded queue and the workers that drain it.

use crate::api::event::{Direction, PacketType};
use crate::api::listener::{invoke_listener, whitelist_for, ListeningWhitelist, PacketListener};
use crate::config::DispatchConfig;
use crate::control_plane::listener_identity::ListenerId;
use crate::data_plane::queued_packet::QueuedPacket;
use crate::data_plane::worker_loop::{StopTicket, WorkerLoop, WorkerSignal};
use crate::data_plane::DispatchHooks;
use crate::error::DispatchError;
use crate::observability::{events, fields};
use crate::runtime::privileged::PrivilegedContext;
use crate::runtime::worker_runtime::WorkerExecutor;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fmt::{Debug, Formatter};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

const COMPONENT: &str = "listener_pool";
const LISTENER_QUEUE: &str = "listener";

#[derive(Clone, Copy, Debug)]
pub(crate) struct PoolSettings {
    pub(crate) queue_capacity: usize,
    pub(crate) max_workers: usize,
    pub(crate) resize_timeout: Duration,
    pub(crate) stop_poll: Duration,
}

impl From<&DispatchConfig> for PoolSettings {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            queue_capacity: config.worker_queue_capacity,
            max_workers: config.max_workers_per_listener,
            resize_timeout: config.resize_timeout(),
            stop_poll: config.stop_poll(),
        }
    }
}

/// Runs a registered listener on 0..N workers fed by one bounded queue.
///
/// Pools are created by [`crate::PacketDispatcher::register_listener`] without any
/// worker; the caller decides how many to run with [`ListenerWorkerPool::start`],
/// [`ListenerWorkerPool::start_workers`] or [`ListenerWorkerPool::set_workers`].
pub struct ListenerWorkerPool {
    id: ListenerId,
    listener: Arc<dyn PacketListener>,
    sending: ListeningWhitelist,
    receiving: ListeningWhitelist,
    sender: Sender<WorkerSignal>,
    receiver: Receiver<WorkerSignal>,
    settings: PoolSettings,
    executor: Arc<dyn WorkerExecutor>,
    privileged: PrivilegedContext,
    hooks: Weak<dyn DispatchHooks>,
    cancelled: AtomicBool,
    started: AtomicUsize,
    pending_interrupts: AtomicUsize,
    next_worker_id: AtomicU64,
    resize: Mutex<()>,
    registered_at: Instant,
    warned_unstarted: AtomicBool,
}

impl ListenerWorkerPool {
    pub(crate) fn new(
        listener: Arc<dyn PacketListener>,
        settings: PoolSettings,
        executor: Arc<dyn WorkerExecutor>,
        privileged: PrivilegedContext,
        hooks: Weak<dyn DispatchHooks>,
    ) -> Arc<Self> {
        let (sender, receiver) = bounded(settings.queue_capacity);
        let sending = whitelist_for(listener.as_ref(), Direction::Outbound);
        let receiving = whitelist_for(listener.as_ref(), Direction::Inbound);

        Arc::new(Self {
            id: ListenerId::next(),
            listener,
            sending,
            receiving,
            sender,
            receiver,
            settings,
            executor,
            privileged,
            hooks,
            cancelled: AtomicBool::new(false),
            started: AtomicUsize::new(0),
            pending_interrupts: AtomicUsize::new(0),
            next_worker_id: AtomicU64::new(0),
            resize: Mutex::new(()),
            registered_at: Instant::now(),
            warned_unstarted: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn listener(&self) -> &Arc<dyn PacketListener> {
        &self.listener
    }

    pub fn owner(&self) -> &str {
        self.listener.owner()
    }

    /// Whitelist captured at registration for `direction`.
    pub fn whitelist(&self, direction: Direction) -> &ListeningWhitelist {
        match direction {
            Direction::Inbound => &self.receiving,
            Direction::Outbound => &self.sending,
        }
    }

    pub(crate) fn types(&self, direction: Direction) -> &BTreeSet<PacketType> {
        self.whitelist(direction).types()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Number of workers currently inside their loop.
    pub fn worker_count(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Packets and control signals waiting in the queue.
    pub fn queued(&self) -> usize {
        self.receiver.len()
    }

    pub(crate) fn privileged(&self) -> &PrivilegedContext {
        &self.privileged
    }

    pub(crate) fn stop_poll(&self) -> Duration {
        self.settings.stop_poll
    }

    /// Non-blocking. A full queue means the caller must treat the packet as dropped.
    pub(crate) fn enqueue(&self, packet: Arc<QueuedPacket>) -> Result<(), DispatchError> {
        if self.is_cancelled() {
            return Err(DispatchError::AlreadyCancelled);
        }
        self.sender
            .try_send(WorkerSignal::Data(packet))
            .map_err(|error| match error {
                TrySendError::Full(_) => DispatchError::QueueOverflow {
                    queue: LISTENER_QUEUE,
                    capacity: self.settings.queue_capacity,
                },
                TrySendError::Disconnected(_) => DispatchError::AlreadyCancelled,
            })?;

        // Lost a race with cancel(); whatever is queued now has no worker to take it.
        if self.is_cancelled() {
            self.release_queued();
        }
        Ok(())
    }

    /// A fresh one-shot loop for a caller-managed worker.
    pub fn worker_loop(self: &Arc<Self>) -> WorkerLoop {
        let worker_id = self.next_worker_id.fetch_add(1, Ordering::Relaxed) + 1;
        WorkerLoop::new(self.clone(), worker_id)
    }

    /// Launches one worker on the configured executor.
    pub fn start(self: &Arc<Self>) -> Result<(), DispatchError> {
        self.launch().map(|_| ())
    }

    pub fn start_workers(self: &Arc<Self>, count: usize) -> Result<(), DispatchError> {
        for _ in 0..count {
            self.start()?;
        }
        Ok(())
    }

    /// Asks exactly one worker to exit. Returns `false` when every running worker
    /// already has an exit signal pending.
    pub fn stop(&self) -> Result<bool, DispatchError> {
        let running = self.worker_count();
        let reserved = self
            .pending_interrupts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |pending| {
                (pending < running).then_some(pending + 1)
            })
            .is_ok();
        if !reserved {
            return Ok(false);
        }

        match self.sender.try_send(WorkerSignal::Interrupt) {
            Ok(()) => Ok(true),
            Err(_) => {
                self.interrupt_consumed();
                Err(DispatchError::QueueOverflow {
                    queue: LISTENER_QUEUE,
                    capacity: self.settings.queue_capacity,
                })
            }
        }
    }

    /// Stops `count` workers and blocks until all of them have exited.
    pub fn stop_workers(&self, count: usize) -> Result<(), DispatchError> {
        let count = count.min(self.worker_count());
        if count == 0 {
            return Ok(());
        }
        self.await_stop(Arc::new(StopTicket::any(count)), count)
    }

    /// Sends `signals` copies of the ticket and waits for it to settle. The poll period
    /// only serves to notice that too few workers remain to ever settle it.
    pub(crate) fn await_stop(
        &self,
        ticket: Arc<StopTicket>,
        signals: usize,
    ) -> Result<(), DispatchError> {
        for _ in 0..signals {
            if self.sender.send(WorkerSignal::Wake(ticket.clone())).is_err() {
                break;
            }
        }

        loop {
            if ticket.wait(self.settings.stop_poll) {
                return Ok(());
            }
            let running = self.worker_count();
            if self.is_cancelled() && running == 0 {
                ticket.abandon();
                return Ok(());
            }
            let remaining = ticket.remaining();
            if running < remaining {
                ticket.abandon();
                warn!(
                    event = events::WORKER_RESIZE_FAILED,
                    component = COMPONENT,
                    owner = self.owner(),
                    running,
                    remaining,
                    "workers vanished while stopping; concurrent resize?"
                );
                return Err(DispatchError::ConvergenceFailure {
                    target: running.saturating_sub(remaining),
                    actual: running,
                });
            }
        }
    }

    /// Starts or stops workers one at a time until exactly `target` are running.
    pub fn set_workers(self: &Arc<Self>, target: usize) -> Result<(), DispatchError> {
        if target > self.settings.max_workers {
            return Err(DispatchError::InvalidConfig(format!(
                "cannot run {target} workers, limit is {}",
                self.settings.max_workers
            )));
        }
        if target > 0 && self.is_cancelled() {
            return Err(DispatchError::AlreadyCancelled);
        }

        let _resize = self.resize.lock();
        let deadline = Instant::now() + self.settings.resize_timeout;

        loop {
            let current = self.worker_count();
            if current == target {
                return Ok(());
            }
            let window = deadline.saturating_duration_since(Instant::now());
            if window.is_zero() {
                warn!(
                    event = events::WORKER_RESIZE_FAILED,
                    component = COMPONENT,
                    owner = self.owner(),
                    target,
                    actual = current,
                    "unable to converge on worker count"
                );
                return Err(DispatchError::ConvergenceFailure {
                    target,
                    actual: current,
                });
            }

            if current < target {
                let started = self.launch()?;
                match started.recv_timeout(window) {
                    Ok(result) => result?,
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => {
                        return Err(DispatchError::Executor(
                            "worker exited before reporting start".to_string(),
                        ))
                    }
                }
            } else {
                self.stop_workers(1)?;
            }
        }
    }

    /// Cancels the pool: no more packets are accepted, queued packets move on to their
    /// next listener, and every worker is told to exit. Idempotent.
    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(
            component = COMPONENT,
            owner = self.owner(),
            listener_id = %self.id,
            "cancelling listener worker pool"
        );

        if let Some(hooks) = self.hooks.upgrade() {
            hooks.listener_cancelled(self.id);
        }
        self.release_queued();

        for _ in 0..self.worker_count() {
            if self.sender.try_send(WorkerSignal::Interrupt).is_err() {
                break;
            }
            self.pending_interrupts.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Warns once if the pool has been registered for `threshold` without a worker.
    pub(crate) fn warn_if_unstarted(&self, now: Instant, threshold: Duration) -> bool {
        if self.is_cancelled()
            || self.worker_count() > 0
            || now.saturating_duration_since(self.registered_at) < threshold
            || self.warned_unstarted.swap(true, Ordering::SeqCst)
        {
            return false;
        }
        warn!(
            event = events::LISTENER_NOT_STARTED,
            component = COMPONENT,
            owner = self.owner(),
            listener_id = %self.id,
            "listener registered but no worker was started; queued packets will time out"
        );
        true
    }

    fn launch(self: &Arc<Self>) -> Result<Receiver<Result<(), DispatchError>>, DispatchError> {
        if self.is_cancelled() {
            return Err(DispatchError::AlreadyCancelled);
        }
        let worker_loop = self.worker_loop();
        let name = self.worker_name(worker_loop.worker_id());
        let (started_tx, started_rx) = bounded(1);

        self.executor.execute(
            name,
            Box::new(move || {
                let _ = worker_loop.run_reporting(Some(started_tx));
            }),
        )?;
        Ok(started_rx)
    }

    fn worker_name(&self, worker_id: u64) -> String {
        format!("packet-worker-#{worker_id}-{}", self.owner())
    }

    pub(crate) fn next_signal(&self) -> Option<WorkerSignal> {
        self.receiver.recv().ok()
    }

    pub(crate) fn worker_started(&self) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn worker_exited(&self) {
        self.started.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn interrupt_consumed(&self) {
        let _ = self
            .pending_interrupts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |pending| {
                pending.checked_sub(1)
            });
    }

    /// Invokes the listener under the event's processing lock, then moves the packet on.
    pub(crate) fn process(&self, worker_id: u64, packet: Arc<QueuedPacket>) {
        let Some(hooks) = self.hooks.upgrade() else {
            return;
        };

        if !self.is_cancelled() {
            let mut event = packet.lock_event();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                invoke_listener(self.listener.as_ref(), &mut event)
            }));
            drop(event);

            if let Err(payload) = outcome {
                error!(
                    event = events::LISTENER_PANICKED,
                    component = COMPONENT,
                    owner = self.owner(),
                    worker_id,
                    packet_type = %packet.packet_type(),
                    panic = %fields::format_panic(payload.as_ref()),
                    "listener panicked while processing packet"
                );
            }
        }

        forward(packet, hooks.as_ref());
    }

    /// Moves every queued packet on without invoking the listener.
    fn release_queued(&self) {
        let hooks = self.hooks.upgrade();
        while let Ok(signal) = self.receiver.try_recv() {
            match signal {
                WorkerSignal::Data(packet) => {
                    if let Some(hooks) = hooks.as_ref() {
                        forward(packet, hooks.as_ref());
                    }
                }
                WorkerSignal::Interrupt => self.interrupt_consumed(),
                WorkerSignal::Wake(_) => {}
            }
        }
    }
}

impl Debug for ListenerWorkerPool {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerWorkerPool")
            .field("id", &self.id)
            .field("owner", &self.owner())
            .field("workers", &self.worker_count())
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Hands the packet to its next interested listener, or completes its traversal.
pub(crate) fn forward(packet: Arc<QueuedPacket>, hooks: &dyn DispatchHooks) {
    if hand_off(&packet) {
        return;
    }
    packet.token().finish_traversal();
    hooks.traversal_complete(&packet);
}

/// Enqueues the packet at the next non-cancelled listener on its cursor. Returns
/// `false` when there is none, the packet expired, or the listener's queue was full;
/// in the last case the packet is cancelled.
pub(crate) fn hand_off(packet: &Arc<QueuedPacket>) -> bool {
    let token = packet.token();
    if token.has_expired() {
        return false;
    }

    while let Some(pool) = token.next_listener() {
        match pool.enqueue(packet.clone()) {
            Ok(()) => return true,
            Err(DispatchError::AlreadyCancelled) => continue,
            Err(error) => {
                warn!(
                    event = events::WORKER_QUEUE_OVERFLOW,
                    component = COMPONENT,
                    owner = pool.owner(),
                    packet_type = %packet.packet_type(),
                    sending_index = token.sending_index(),
                    %error,
                    "dropping packet"
                );
                packet.lock_event().set_cancelled(true);
                return false;
            }
        }
    }
    false
}

#[cfg(test)]
impl ListenerWorkerPool {
    /// Pool with default settings and no owning dispatcher.
    pub(crate) fn detached(listener: Arc<dyn PacketListener>) -> Arc<Self> {
        struct Detached;

        impl DispatchHooks for Detached {
            fn signal_transmission(&self, _packet: &Arc<QueuedPacket>) {}
            fn traversal_complete(&self, _packet: &Arc<QueuedPacket>) {}
            fn listener_cancelled(&self, _id: ListenerId) {}
        }

        let hooks: Weak<dyn DispatchHooks> = Weak::<Detached>::new();
        Self::new(
            listener,
            PoolSettings::from(&DispatchConfig::default()),
            Arc::new(crate::runtime::worker_runtime::ThreadExecutor),
            PrivilegedContext::current(),
            hooks,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{ListenerWorkerPool, PoolSettings};
    use crate::api::event::{ConnectionId, Direction, PacketEvent, PacketType};
    use crate::api::listener::{ListeningWhitelist, PacketListener};
    use crate::api::ordering_token::OrderingToken;
    use crate::config::DispatchConfig;
    use crate::control_plane::listener_identity::ListenerId;
    use crate::data_plane::queued_packet::QueuedPacket;
    use crate::data_plane::DispatchHooks;
    use crate::error::DispatchError;
    use crate::runtime::privileged::PrivilegedContext;
    use crate::runtime::worker_runtime::ThreadExecutor;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct RecordingHooks {
        completed: Mutex<Vec<u64>>,
        cancelled: Mutex<Vec<ListenerId>>,
    }

    impl DispatchHooks for RecordingHooks {
        fn signal_transmission(&self, _packet: &Arc<QueuedPacket>) {}

        fn traversal_complete(&self, packet: &Arc<QueuedPacket>) {
            self.completed.lock().push(packet.token().sending_index());
        }

        fn listener_cancelled(&self, id: ListenerId) {
            self.cancelled.lock().push(id);
        }
    }

    struct Counting {
        calls: AtomicUsize,
        panic_on: Option<u32>,
    }

    impl Counting {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                panic_on: None,
            }
        }
    }

    impl PacketListener for Counting {
        fn owner(&self) -> &str {
            "counting"
        }

        fn receiving_whitelist(&self) -> ListeningWhitelist {
            ListeningWhitelist::of([PacketType::new(1), PacketType::new(2)])
        }

        fn on_inbound(&self, event: &mut PacketEvent) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if Some(event.packet_type().id()) == self.panic_on {
                panic!("listener failure");
            }
        }
    }

    fn pool_with(
        listener: Arc<Counting>,
        hooks: &Arc<RecordingHooks>,
        queue_capacity: usize,
    ) -> Arc<ListenerWorkerPool> {
        let hooks: Arc<dyn DispatchHooks> = hooks.clone();
        let mut settings = PoolSettings::from(&DispatchConfig::default());
        settings.queue_capacity = queue_capacity;
        ListenerWorkerPool::new(
            listener,
            settings,
            Arc::new(ThreadExecutor),
            PrivilegedContext::current(),
            Arc::downgrade(&hooks),
        )
    }

    fn packet(index: u64, packet_type: u32) -> Arc<QueuedPacket> {
        let connection = ConnectionId::new();
        let token = Arc::new(OrderingToken::new(
            index,
            0,
            Direction::Inbound,
            connection,
            Duration::from_secs(60),
        ));
        let event = PacketEvent::new(
            Direction::Inbound,
            connection,
            PacketType::new(packet_type),
            Vec::new(),
        );
        QueuedPacket::new(event, token)
    }

    fn wait_until(condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    #[test]
    fn worker_invokes_listener_then_completes_traversal() {
        let hooks = Arc::new(RecordingHooks::default());
        let listener = Arc::new(Counting::new());
        let pool = pool_with(listener.clone(), &hooks, 16);

        pool.set_workers(1).expect("start worker");
        pool.enqueue(packet(1, 1)).expect("enqueue");
        pool.enqueue(packet(2, 1)).expect("enqueue");

        assert!(wait_until(|| hooks.completed.lock().len() == 2));
        assert_eq!(listener.calls.load(Ordering::SeqCst), 2);
        pool.set_workers(0).expect("stop worker");
    }

    #[test]
    fn set_workers_up_then_down_drains_every_worker() {
        let hooks = Arc::new(RecordingHooks::default());
        let pool = pool_with(Arc::new(Counting::new()), &hooks, 16);

        pool.set_workers(3).expect("start three");
        assert_eq!(pool.worker_count(), 3);
        pool.set_workers(0).expect("stop all");
        assert_eq!(pool.worker_count(), 0);
    }

    #[test]
    fn set_workers_rejects_more_than_the_limit() {
        let hooks = Arc::new(RecordingHooks::default());
        let pool = pool_with(Arc::new(Counting::new()), &hooks, 16);

        let limit = DispatchConfig::default().max_workers_per_listener;
        assert!(matches!(
            pool.set_workers(limit + 1),
            Err(DispatchError::InvalidConfig(_))
        ));
    }

    #[test]
    fn panicking_listener_does_not_kill_worker() {
        let hooks = Arc::new(RecordingHooks::default());
        let listener = Arc::new(Counting {
            calls: AtomicUsize::new(0),
            panic_on: Some(2),
        });
        let pool = pool_with(listener.clone(), &hooks, 16);

        pool.start().expect("start worker");
        pool.enqueue(packet(1, 2)).expect("enqueue");
        pool.enqueue(packet(2, 1)).expect("enqueue");

        assert!(wait_until(|| hooks.completed.lock().len() == 2));
        assert_eq!(listener.calls.load(Ordering::SeqCst), 2);
        assert!(wait_until(|| pool.worker_count() == 1));
        pool.cancel();
    }

    #[test]
    fn full_queue_reports_overflow() {
        let hooks = Arc::new(RecordingHooks::default());
        let pool = pool_with(Arc::new(Counting::new()), &hooks, 2);

        pool.enqueue(packet(1, 1)).expect("first fits");
        pool.enqueue(packet(2, 1)).expect("second fits");

        assert_eq!(
            pool.enqueue(packet(3, 1)),
            Err(DispatchError::QueueOverflow {
                queue: "listener",
                capacity: 2
            })
        );
    }

    #[test]
    fn cancel_releases_queued_packets_and_notifies_owner() {
        let hooks = Arc::new(RecordingHooks::default());
        let listener = Arc::new(Counting::new());
        let pool = pool_with(listener.clone(), &hooks, 16);

        pool.enqueue(packet(4, 1)).expect("enqueue");
        pool.enqueue(packet(5, 1)).expect("enqueue");
        pool.cancel();
        pool.cancel();

        assert_eq!(*hooks.completed.lock(), vec![4, 5]);
        assert_eq!(*hooks.cancelled.lock(), vec![pool.id()]);
        assert_eq!(listener.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            pool.enqueue(packet(6, 1)),
            Err(DispatchError::AlreadyCancelled)
        );
        assert_eq!(pool.set_workers(1), Err(DispatchError::AlreadyCancelled));
    }

    #[test]
    fn cancel_wakes_idle_workers() {
        let hooks = Arc::new(RecordingHooks::default());
        let pool = pool_with(Arc::new(Counting::new()), &hooks, 16);

        pool.set_workers(2).expect("start two");
        pool.cancel();

        assert!(wait_until(|| pool.worker_count() == 0));
    }

    #[test]
    fn stop_interrupts_exactly_one_worker() {
        let hooks = Arc::new(RecordingHooks::default());
        let pool = pool_with(Arc::new(Counting::new()), &hooks, 16);

        pool.set_workers(2).expect("start two");
        assert_eq!(pool.stop(), Ok(true));

        assert!(wait_until(|| pool.worker_count() == 1));
        pool.set_workers(0).expect("stop remaining");
        assert_eq!(pool.stop(), Ok(false));
    }

    #[test]
    fn worker_loop_refuses_privileged_context_and_second_run() {
        let hooks = Arc::new(RecordingHooks::default());
        let pool = pool_with(Arc::new(Counting::new()), &hooks, 16);

        let on_privileged = pool.worker_loop();
        assert_eq!(on_privileged.run(), Err(DispatchError::OnPrivilegedContext));

        let worker = pool.worker_loop();
        let runner = worker.clone();
        let handle = thread::spawn(move || runner.run());

        assert!(wait_until(|| worker.is_running()));
        assert_eq!(worker.run(), Err(DispatchError::OnPrivilegedContext));
        assert_eq!(worker.stop(), Ok(true));
        assert_eq!(handle.join().expect("worker thread"), Ok(()));
        assert!(worker.is_finished());

        let again = worker.clone();
        let second = thread::spawn(move || again.run())
            .join()
            .expect("second run thread");
        assert_eq!(second, Err(DispatchError::AlreadyRunning));
    }

    #[test]
    fn targeted_stop_leaves_other_workers_running() {
        let hooks = Arc::new(RecordingHooks::default());
        let pool = pool_with(Arc::new(Counting::new()), &hooks, 16);

        let first = pool.worker_loop();
        let second = pool.worker_loop();
        let handles: Vec<_> = [first.clone(), second.clone()]
            .into_iter()
            .map(|worker| thread::spawn(move || worker.run()))
            .collect();
        assert!(wait_until(|| pool.worker_count() == 2));

        assert_eq!(first.stop(), Ok(true));
        assert!(first.is_finished());
        assert!(second.is_running());

        pool.cancel();
        for handle in handles {
            assert_eq!(handle.join().expect("worker thread"), Ok(()));
        }
        assert_eq!(pool.worker_count(), 0);
    }

    #[test]
    fn unstarted_pool_warns_once_after_threshold() {
        let hooks = Arc::new(RecordingHooks::default());
        let pool = pool_with(Arc::new(Counting::new()), &hooks, 16);
        let later = Instant::now() + Duration::from_secs(10);

        assert!(!pool.warn_if_unstarted(Instant::now(), Duration::from_secs(5)));
        assert!(pool.warn_if_unstarted(later, Duration::from_secs(5)));
        assert!(!pool.warn_if_unstarted(later, Duration::from_secs(5)));
    }
}
