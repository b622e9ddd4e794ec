//! Per-operation deadlines, including the *weak timeout* extension used by
//! socket reads/writes: a weak deadline resets itself as long as the
//! operation keeps making partial progress.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use pin_project_lite::pin_project;

use crate::error::OpError;
use crate::runtime_context;
use crate::waker::TaskId;

struct DeadlineInner {
    last_update: Mutex<Instant>,
    timed_out: AtomicBool,
}

/// Handle an in-flight operation holds to its own deadline.
///
/// The executor's `timeouts` heap only ever sees a [`Weak`] clone of the
/// inner state: once the handle (and the operation holding it) is dropped,
/// the heap entry silently becomes dead and is discarded, without the
/// operation needing to actively deregister itself. This is the "weak
/// reference" referred to by the design: a stale heap entry never keeps a
/// finished operation alive.
pub(crate) struct DeadlineHandle {
    inner: Arc<DeadlineInner>,
}

impl DeadlineHandle {
    fn new() -> Self {
        DeadlineHandle {
            inner: Arc::new(DeadlineInner {
                last_update: Mutex::new(Instant::now()),
                timed_out: AtomicBool::new(false),
            }),
        }
    }

    /// Create a handle and register it with the current thread's running
    /// executor. `weak` selects weak-timeout semantics (reset on
    /// `touch()`); `delta` is the timeout duration.
    ///
    /// # Panics
    /// Panics if called outside of a running executor (see
    /// [`runtime_context::with_executor`]).
    pub fn register(delta: Duration, weak: bool) -> Self {
        let handle = Self::new();
        let task = runtime_context::current_task();
        let entry = DeadlineEntry {
            inner: Arc::downgrade(&handle.inner),
            weak,
            delta,
            task,
        };
        let deadline = Instant::now() + delta;
        runtime_context::with_executor(|ex| ex.schedule_timeout(deadline, entry));
        handle
    }

    /// Record partial progress, resetting a weak deadline.
    pub fn touch(&self) {
        *self.inner.last_update.lock().unwrap() = Instant::now();
    }

    pub fn is_timed_out(&self) -> bool {
        self.inner.timed_out.load(Ordering::Acquire)
    }

    #[cfg(test)]
    fn entry(&self, weak: bool, delta: Duration) -> DeadlineEntry {
        DeadlineEntry {
            inner: Arc::downgrade(&self.inner),
            weak,
            delta,
            task: TaskId(0),
        }
    }
}

/// What the executor's `timeouts` heap actually stores.
pub(crate) struct DeadlineEntry {
    inner: Weak<DeadlineInner>,
    weak: bool,
    delta: Duration,
    /// Task to re-queue when this entry fires, so the timed-out operation
    /// gets re-polled and observes `is_timed_out()` promptly instead of
    /// waiting on whatever else might eventually wake it.
    task: TaskId,
}

/// Outcome of draining one due entry from the timeouts heap: either it was
/// dead already (the operation finished on its own), it needed extending
/// (weak timeout saw progress), or it genuinely timed out.
pub(crate) enum TimeoutOutcome {
    Dead,
    Extended { new_deadline: Instant },
    Fired { task: TaskId },
}

impl DeadlineEntry {
    /// Resolve this entry at `now`, given the deadline it was popped under.
    pub fn resolve(&self, now: Instant, deadline_at_pop: Instant) -> TimeoutOutcome {
        let Some(inner) = self.inner.upgrade() else {
            return TimeoutOutcome::Dead;
        };
        if self.weak {
            let last_update = *inner.last_update.lock().unwrap();
            let checkpoint = deadline_at_pop - self.delta;
            if last_update > checkpoint {
                let new_deadline = last_update + self.delta;
                if new_deadline > now {
                    return TimeoutOutcome::Extended { new_deadline };
                }
            }
        }
        inner.timed_out.store(true, Ordering::Release);
        TimeoutOutcome::Fired { task: self.task }
    }

    pub fn is_live(&self) -> bool {
        Weak::strong_count(&self.inner) > 0
    }
}

/// Error returned when a future doesn't resolve before its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("future timed out")]
pub struct TimeoutElapsed;

pin_project! {
    /// Races `future` against a [`crate::timer::sleep::SleepFuture`];
    /// resolves to `Err(TimeoutElapsed)` if the deadline elapses first.
    pub struct Timeout<F> {
        #[pin]
        future: F,
        #[pin]
        sleep: crate::timer::sleep::SleepFuture,
    }
}

/// Apply a deadline to `future`.
pub fn with_timeout<F: Future>(duration: Duration, future: F) -> Timeout<F> {
    Timeout {
        future,
        sleep: crate::timer::sleep::sleep(duration),
    }
}

impl<F: Future> Future for Timeout<F> {
    type Output = Result<F::Output, TimeoutElapsed>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        if let Poll::Ready(out) = this.future.poll(cx) {
            return Poll::Ready(Ok(out));
        }
        if this.sleep.poll(cx).is_ready() {
            return Poll::Ready(Err(TimeoutElapsed));
        }
        Poll::Pending
    }
}

/// Convenience extension mirroring the teacher's `FutureExt::with_timeout`.
pub trait FutureExt: Future + Sized {
    fn with_timeout(self, duration: Duration) -> Timeout<Self> {
        with_timeout(duration, self)
    }
}
impl<F: Future> FutureExt for F {}

impl From<TimeoutElapsed> for OpError {
    fn from(_: TimeoutElapsed) -> Self {
        OpError::OperationTimeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_entry_reports_dead_once_handle_dropped() {
        let handle = DeadlineHandle::new();
        let entry = handle.entry(false, Duration::from_millis(10));
        drop(handle);
        assert!(!entry.is_live());
        let now = Instant::now();
        assert!(matches!(entry.resolve(now, now), TimeoutOutcome::Dead));
    }

    #[test]
    fn weak_deadline_extends_on_progress() {
        let delta = Duration::from_millis(50);
        let handle = DeadlineHandle::new();
        let entry = handle.entry(true, delta);
        std::thread::sleep(Duration::from_millis(5));
        handle.touch();
        let deadline_at_pop = Instant::now();
        match entry.resolve(Instant::now(), deadline_at_pop) {
            TimeoutOutcome::Extended { new_deadline } => {
                assert!(new_deadline > Instant::now());
            }
            _ => panic!("expected an extension"),
        }
        assert!(!handle.is_timed_out());
    }

    #[test]
    fn no_progress_fires_timeout() {
        let delta = Duration::from_millis(5);
        let handle = DeadlineHandle::new();
        let entry = handle.entry(true, delta);
        std::thread::sleep(Duration::from_millis(10));
        let deadline_at_pop = Instant::now();
        assert!(matches!(
            entry.resolve(Instant::now(), deadline_at_pop),
            TimeoutOutcome::Fired { .. }
        ));
        assert!(handle.is_timed_out());
    }
}
