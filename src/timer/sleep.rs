//! `Sleep`: suspend the current task until a deadline passes.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use crate::runtime_context;

/// Suspend the current task for `duration`.
pub fn sleep(duration: Duration) -> SleepFuture {
    SleepFuture {
        deadline: Instant::now() + duration,
        registered: false,
    }
}

/// Suspend the current task until `deadline`.
pub fn sleep_until(deadline: Instant) -> SleepFuture {
    SleepFuture {
        deadline,
        registered: false,
    }
}

/// The future returned by [`sleep`] / [`sleep_until`].
///
/// On its first poll it registers the current task with the executor's
/// sleep heap (the `timewait` heap of the design) and returns `Pending`.
/// Since the runtime is single-threaded and the executor itself pushes the
/// task back onto the ready queue when the deadline elapses, no `Waker` is
/// stored here — the task simply sits dormant until the executor re-polls
/// it directly.
pub struct SleepFuture {
    deadline: Instant,
    registered: bool,
}

impl SleepFuture {
    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

impl Future for SleepFuture {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        if Instant::now() >= self.deadline {
            return Poll::Ready(());
        }
        if !self.registered {
            self.registered = true;
            let task_id = runtime_context::current_task();
            let deadline = self.deadline;
            runtime_context::with_executor(|ex| ex.schedule_sleep(task_id, deadline));
        }
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_deadline_reports_ready_on_first_poll() {
        let fut = sleep(Duration::from_millis(0));
        assert!(fut.deadline() <= Instant::now() + Duration::from_millis(1));
    }
}
