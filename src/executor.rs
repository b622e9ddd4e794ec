//! The single-threaded scheduler loop.
//!
//! Owns every piece of state a task or leaf future needs to suspend and
//! resume: the task table, the ready queue, the I/O backend, the two timer
//! heaps, and the signal rendezvous registry. Everything here is `RefCell`-
//! based interior mutability rather than `Mutex` — the design is strictly
//! single-threaded (see [`crate::runtime_context`]), so there is no one else
//! to contend with.
//!
//! `Call`/`AddCoro`/`Pass` from the reference scheduler don't appear as
//! distinct operations here: ordinary `spawn` plus `.await` composition
//! already covers spawning-with-suspension (`Call`), spawning-without (
//! `AddCoro`), and redirecting to the next op to run falls out naturally from
//! `Future::poll`'s control flow (`Pass`). See `DESIGN.md`.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

use crate::error::OpError;
use crate::io::{self, Completion, CompletionKind, IoBackend, IoError, IoToken, Op};
use crate::rendezvous::{self, SignalValue};
use crate::runtime_context;
use crate::task::{self, BoxedTaskFuture, JoinLookup, Task, TaskOutcome};
use crate::timer::heap::TimerHeap;
use crate::timer::timeout::{DeadlineEntry, TimeoutOutcome};
use crate::waker::{CoroWaker, ReadyQueue, TaskId};

/// The core executor: task table, ready queue, I/O backend, timer heaps, and
/// the signal registry.
pub struct Executor {
    tasks: RefCell<HashMap<TaskId, Task>>,
    ready: Arc<ReadyQueue>,
    backend: Box<dyn IoBackend>,
    io_completions: RefCell<HashMap<IoToken, Result<CompletionKind, IoError>>>,
    /// The task each pending op's waker belongs to, alongside the waker
    /// itself — the task id is what lets [`Executor::dispatch_completions`]
    /// resume the OP-bit-favored completion inline instead of only queuing
    /// it (see that function's doc).
    io_wakers: RefCell<HashMap<IoToken, (TaskId, Waker)>>,
    sleep_heap: RefCell<TimerHeap<TaskId>>,
    timeout_heap: RefCell<TimerHeap<DeadlineEntry>>,
    signals: RefCell<rendezvous::Registry>,
    next_task_id: AtomicU64,
    running: Cell<bool>,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor {
    /// Build an executor on this platform's default I/O backend.
    pub fn new() -> Self {
        Self::with_backend(io::default_backend())
    }

    pub fn with_backend(backend: Box<dyn IoBackend>) -> Self {
        Executor {
            tasks: RefCell::new(HashMap::new()),
            ready: ReadyQueue::new(),
            backend,
            io_completions: RefCell::new(HashMap::new()),
            io_wakers: RefCell::new(HashMap::new()),
            sleep_heap: RefCell::new(TimerHeap::new()),
            timeout_heap: RefCell::new(TimerHeap::new()),
            signals: RefCell::new(rendezvous::Registry::default()),
            next_task_id: AtomicU64::new(1),
            running: Cell::new(false),
        }
    }

    // --- task table -----------------------------------------------------

    /// Register `future` as a new task, scheduling it at the front or back
    /// of the ready queue per its own CORO bit.
    pub(crate) fn add(&self, future: BoxedTaskFuture, requeue_front: bool) -> TaskId {
        let id = TaskId(self.next_task_id.fetch_add(1, Ordering::Relaxed));
        let mut task = Task::new(id, future);
        task.requeue_front = requeue_front;
        self.tasks.borrow_mut().insert(id, task);
        if requeue_front {
            self.ready.push_front(id);
        } else {
            self.ready.push_back(id);
        }
        id
    }

    pub(crate) fn is_task_finished(&self, task_id: TaskId) -> bool {
        self.tasks
            .borrow()
            .get(&task_id)
            .map(Task::is_finished)
            .unwrap_or(false)
    }

    /// First-poll lookup for a `JoinHandle`/`Join`: register `waiter` to be
    /// resumed on completion if the task hasn't finished yet.
    pub(crate) fn lookup_or_register_waiter(&self, task_id: TaskId, waiter: TaskId) -> JoinLookup {
        let mut tasks = self.tasks.borrow_mut();
        let Some(task) = tasks.get_mut(&task_id) else {
            return JoinLookup::NotFound;
        };
        match &task.outcome {
            Some(outcome) => JoinLookup::Done(outcome.clone()),
            None => {
                task.waiters.push(waiter);
                JoinLookup::Pending
            }
        }
    }

    /// Re-poll lookup for an already-registered `JoinHandle`/`Join`.
    pub(crate) fn lookup_join(&self, task_id: TaskId) -> JoinLookup {
        match self.tasks.borrow().get(&task_id) {
            None => JoinLookup::NotFound,
            Some(task) => match &task.outcome {
                Some(outcome) => JoinLookup::Done(outcome.clone()),
                None => JoinLookup::Pending,
            },
        }
    }

    /// Advance one task by a single `poll`. The task is removed from the
    /// table for the duration of the call — a nested `spawn`/signal/join
    /// from within the task's own poll would otherwise re-borrow `tasks`
    /// while we're already holding it mutably.
    ///
    /// A panic inside the task's future is caught and re-surfaced as its
    /// outcome (`OpError::CoroutineException`) rather than unwinding the
    /// scheduler loop, so one misbehaving task can't take down every other
    /// task sharing it.
    fn poll_task(&self, task_id: TaskId) {
        let mut task = match self.tasks.borrow_mut().remove(&task_id) {
            Some(task) => task,
            None => return,
        };
        if task.is_finished() {
            // Stale duplicate in the ready queue (woken twice before being
            // polled once); nothing to do.
            self.tasks.borrow_mut().insert(task_id, task);
            return;
        }

        let waker = CoroWaker::new(task_id, self.ready.clone(), task.requeue_front);
        let mut cx = Context::from_waker(&waker);
        let _task_guard = runtime_context::enter_task(task_id);

        let poll_result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            task.poll(&mut cx)
        }))
        .unwrap_or_else(|payload| Poll::Ready(Err(OpError::CoroutineException(panic_message(&*payload)))));

        match poll_result {
            Poll::Pending => {
                self.tasks.borrow_mut().insert(task_id, task);
            }
            Poll::Ready(outcome) => {
                let waiters = std::mem::take(&mut task.waiters);
                let caller = task.caller;
                task.outcome = Some(outcome);
                self.tasks.borrow_mut().insert(task_id, task);
                for waiter in waiters {
                    self.ready.push_back(waiter);
                }
                if let Some(caller) = caller {
                    self.ready.push_back(caller);
                }
            }
        }
    }

    // --- signals ----------------------------------------------------------

    pub(crate) fn register_signal_waiter(&self, name: &str, task_id: TaskId) {
        self.signals.borrow_mut().register_waiter(name, task_id);
    }

    pub(crate) fn take_delivered_signal(&self, task_id: TaskId) -> Option<SignalValue> {
        self.signals.borrow_mut().take_delivered(task_id)
    }

    /// Wake up to `recipients` waiters on `name`, delivering `value`;
    /// returns how many were woken.
    pub(crate) fn signal(
        &self,
        name: &str,
        value: SignalValue,
        recipients: Option<usize>,
    ) -> usize {
        let woken = self.signals.borrow_mut().signal(name, value, recipients);
        let count = woken.len();
        for task_id in woken {
            self.ready.push_back(task_id);
        }
        count
    }

    // --- timers -------------------------------------------------------

    pub(crate) fn schedule_sleep(&self, task_id: TaskId, deadline: Instant) {
        self.sleep_heap.borrow_mut().push(deadline, task_id);
    }

    pub(crate) fn schedule_timeout(&self, deadline: Instant, entry: DeadlineEntry) {
        self.timeout_heap.borrow_mut().push(deadline, entry);
    }

    fn drain_sleep_heap(&self) {
        let now = Instant::now();
        let mut heap = self.sleep_heap.borrow_mut();
        while let Some(task_id) = heap.pop_due(now) {
            // Front of queue: fairness with I/O readiness per the design.
            self.ready.push_front(task_id);
        }
    }

    fn drain_timeout_heap(&self) {
        let now = Instant::now();
        loop {
            let deadline_at_pop = match self.timeout_heap.borrow().peek_deadline() {
                Some(d) if d <= now => d,
                _ => break,
            };
            let Some(entry) = self.timeout_heap.borrow_mut().pop_due(now) else {
                break;
            };
            match entry.resolve(now, deadline_at_pop) {
                TimeoutOutcome::Dead => {}
                TimeoutOutcome::Extended { new_deadline } => {
                    tracing::trace!(?new_deadline, "weak timeout extended");
                    self.timeout_heap.borrow_mut().push(new_deadline, entry);
                }
                TimeoutOutcome::Fired { task } => {
                    tracing::debug!(task_id = ?task, "timeout fired");
                    self.ready.push_front(task);
                }
            }
        }
    }

    /// ready queue non-empty -> 0; sleep heap non-empty -> time to its
    /// earliest deadline; else `None` (the caller falls back to the
    /// backend's own resolution, so the timeout heap still gets re-checked
    /// periodically even with nothing else pending).
    fn next_timer_delta(&self) -> Option<Duration> {
        if !self.ready.is_empty() {
            return Some(Duration::ZERO);
        }
        if let Some(deadline) = self.sleep_heap.borrow().peek_deadline() {
            return Some(deadline.saturating_duration_since(Instant::now()));
        }
        None
    }

    // --- I/O ------------------------------------------------------------

    pub(crate) fn submit_io(&self, op: Op) -> IoToken {
        let token = self.backend.submit(op);
        tracing::trace!(?token, "registered op with I/O backend");
        // Every op's first poll attempts this fast path: a lot of ops
        // (Fsync/Close/ReadFile, or a read/write that didn't block)
        // resolve inline at submit time and would otherwise sit unclaimed
        // until the next scheduler tick.
        self.dispatch_completions(self.backend.run(Some(Duration::ZERO)));
        token
    }

    pub(crate) fn take_io_completion(
        &self,
        token: IoToken,
    ) -> Option<Result<CompletionKind, IoError>> {
        self.io_completions.borrow_mut().remove(&token)
    }

    pub(crate) fn register_io_waker(&self, token: IoToken, waker: Waker) {
        let task_id = runtime_context::current_task();
        self.io_wakers.borrow_mut().insert(token, (task_id, waker));
    }

    /// Drop our bookkeeping for `token` (used when a timeout or a dropped
    /// future abandons the operation). This does not deregister the op from
    /// the backend itself — none of the backends expose a cancel path — so
    /// a completion that eventually does arrive is silently discarded by
    /// `dispatch_completions` finding no waiting waker.
    pub(crate) fn cancel_io(&self, token: IoToken) {
        tracing::trace!(?token, "deregistered op from I/O backend");
        self.io_wakers.borrow_mut().remove(&token);
        self.io_completions.borrow_mut().remove(&token);
    }

    /// Feed backend completions into the completion map and wake whatever
    /// was waiting on each. The OP priority bit (spec: "when an operation
    /// completes, feed its result immediately into the task, without going
    /// through the ready queue") applies to the *last* completion in the
    /// batch: rather than just queuing its task, poll it inline right here,
    /// so whatever it yields next (including another op that resolves
    /// synchronously) runs before this call — and the main loop's
    /// `backend.run` — returns. Earlier completions in the same batch still
    /// go through the ordinary queue, same as the reference scheduler only
    /// special-cases the batch's final event.
    ///
    /// Skipped when the last completion's task is the one currently being
    /// polled (borrowing it again here would just be a same-task reentrant
    /// no-op): falls back to the normal queue wake in that case.
    fn dispatch_completions(&self, completions: Vec<Completion>) {
        if completions.is_empty() {
            return;
        }
        let last_index = completions.len() - 1;
        let mut inline_resume = None;
        {
            let mut io_completions = self.io_completions.borrow_mut();
            let mut io_wakers = self.io_wakers.borrow_mut();
            for (i, completion) in completions.into_iter().enumerate() {
                let token = completion.token;
                io_completions.insert(token, completion.result);
                if let Some((task_id, waker)) = io_wakers.remove(&token) {
                    if i == last_index && runtime_context::try_current_task() != Some(task_id) {
                        inline_resume = Some(task_id);
                    } else {
                        waker.wake();
                    }
                }
            }
        }
        if let Some(task_id) = inline_resume {
            tracing::trace!(?task_id, "OP bit: resuming completed op inline");
            self.poll_task(task_id);
        }
    }

    // --- main loop --------------------------------------------------------

    /// Run until every task, every I/O registration, and the sleep heap are
    /// all drained, or until [`Executor::stop`] is called.
    pub fn run(&self) {
        tracing::debug!("scheduler loop starting");
        self.running.set(true);
        let _enter = runtime_context::enter(self);

        while self.running.get() {
            tracing::trace!("tick start");
            while let Some(task_id) = self.ready.pop_front() {
                self.poll_task(task_id);
            }

            let active_tasks = self
                .tasks
                .borrow()
                .values()
                .filter(|t| !t.is_finished())
                .count();
            let timeout = if active_tasks >= 2 {
                Some(Duration::ZERO)
            } else {
                self.next_timer_delta().or_else(|| Some(self.backend.resolution()))
            };
            tracing::trace!(?timeout, active_tasks, "polling I/O backend");
            let completions = self.backend.run(timeout);
            self.dispatch_completions(completions);

            self.drain_sleep_heap();
            self.drain_timeout_heap();

            if self.ready.is_empty() && self.backend.is_empty() && self.sleep_heap.borrow().is_empty() {
                tracing::debug!("scheduler loop quiescent, stopping");
                break;
            }
        }
        self.running.set(false);
    }

    pub fn stop(&self) {
        self.running.set(false);
    }

    /// Run `future` as the root task and return its output once the loop
    /// drains to quiescence.
    ///
    /// # Panics
    /// Panics if the root task hasn't terminated by the time the loop
    /// decides there's nothing left to do (only possible if it's waiting on
    /// something that will never fire), or if it terminated with an error.
    pub fn block_on<F>(&self, future: F) -> F::Output
    where
        F: Future + 'static,
        F::Output: Send + Sync + 'static,
    {
        let root = self.add(task::wrap(future), false);
        self.run();
        let outcome: TaskOutcome = self
            .tasks
            .borrow_mut()
            .get_mut(&root)
            .and_then(|t| t.outcome.take())
            .expect("block_on: root task did not finish before the scheduler went idle");
        match outcome {
            Ok(value) => *value
                .downcast::<F::Output>()
                .unwrap_or_else(|_| panic!("block_on: mismatched future output type")),
            Err(e) => panic!("block_on: root future terminated with an error: {e}"),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked with a non-string payload".to_string()
    }
}

/// Thin public handle around an [`Executor`], mirroring the reference
/// scheduler's top-level object.
pub struct Runtime {
    executor: Executor,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Runtime {
            executor: Executor::new(),
        }
    }

    pub fn with_backend(backend: Box<dyn IoBackend>) -> Self {
        Runtime {
            executor: Executor::with_backend(backend),
        }
    }

    pub fn block_on<F>(&self, future: F) -> F::Output
    where
        F: Future + 'static,
        F::Output: Send + Sync + 'static,
    {
        self.executor.block_on(future)
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::DummyIoBackend;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Duration;

    fn dummy_runtime() -> Runtime {
        Runtime::with_backend(Box::new(DummyIoBackend))
    }

    #[test]
    fn block_on_immediate_value() {
        let rt = dummy_runtime();
        assert_eq!(rt.block_on(async { 42 }), 42);
    }

    #[test]
    fn block_on_chained_futures() {
        let rt = dummy_runtime();
        let result = rt.block_on(async {
            let x = async { 10 }.await;
            let y = async { 20 }.await;
            x + y
        });
        assert_eq!(result, 30);
    }

    #[test]
    fn spawn_and_join_returns_value() {
        let rt = dummy_runtime();
        let result = rt.block_on(async {
            let handle = task::spawn(async { 5 + 5 });
            *handle.await.unwrap()
        });
        assert_eq!(result, 10);
    }

    #[test]
    fn many_spawned_tasks_all_run() {
        let rt = dummy_runtime();
        let counter = Arc::new(std::sync::atomic::AtomicU32::new(0));
        rt.block_on(async move {
            let mut handles = Vec::new();
            for i in 0..5u32 {
                let counter = counter.clone();
                handles.push(task::spawn(async move {
                    counter.fetch_add(i, Ordering::SeqCst);
                }));
            }
            for h in handles {
                h.await.unwrap();
            }
        });
        assert_eq!(counter.load(Ordering::SeqCst), 0 + 1 + 2 + 3 + 4);
    }

    #[test]
    fn a_panicking_task_does_not_block_others() {
        let rt = dummy_runtime();
        let flag = Arc::new(AtomicBool::new(false));
        let flag_clone = flag.clone();
        rt.block_on(async move {
            let failing: task::JoinHandle<()> = task::spawn(async {
                panic!("boom");
            });
            let ok = task::spawn(async move {
                flag_clone.store(true, Ordering::SeqCst);
            });
            let _ = ok.await;
            // The panic is caught by the poll of `failing`'s own future
            // unwinding only that task; we don't await it here since
            // propagating a caught panic isn't this test's concern.
            let _ = failing.is_finished();
        });
        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn sleep_resumes_after_deadline() {
        let rt = dummy_runtime();
        let start = Instant::now();
        rt.block_on(async {
            crate::timer::sleep(Duration::from_millis(5)).await;
        });
        assert!(start.elapsed() >= Duration::from_millis(5));
    }

    #[test]
    fn signal_wakes_registered_waiter() {
        let rt = dummy_runtime();
        let result = rt.block_on(async {
            let waiter = task::spawn(async {
                let value = rendezvous::wait_for_signal("ready").await;
                *value.downcast::<i32>().unwrap()
            });
            // give the waiter a chance to register before signalling.
            crate::timer::sleep(Duration::from_millis(1)).await;
            rendezvous::signal("ready", 7i32, None);
            *waiter.await.unwrap()
        });
        assert_eq!(result, 7);
    }

    #[test]
    fn timeout_fires_on_a_future_that_never_resolves() {
        let rt = dummy_runtime();
        let result = rt.block_on(async {
            crate::timer::with_timeout(Duration::from_millis(5), std::future::pending::<()>())
                .await
        });
        assert!(result.is_err());
    }

    #[test]
    fn idle_executor_returns_without_blocking() {
        let rt = dummy_runtime();
        let before = Instant::now();
        rt.block_on(async {});
        assert!(before.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn many_concurrent_sleeps_all_fire() {
        let rt = dummy_runtime();
        let counter = Arc::new(AtomicU32::new(0));
        rt.block_on(async move {
            let mut handles = Vec::new();
            for ms in [1u64, 2, 3, 4] {
                let counter = counter.clone();
                handles.push(task::spawn(async move {
                    crate::timer::sleep(Duration::from_millis(ms)).await;
                    counter.fetch_add(1, Ordering::SeqCst);
                }));
            }
            for h in handles {
                h.await.unwrap();
            }
        });
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }
}
