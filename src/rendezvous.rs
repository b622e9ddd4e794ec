//! Named signal rendezvous: `WaitForSignal`/`Signal`.
//!
//! This has nothing to do with OS signals (SIGINT etc., see
//! [`crate::shutdown`]) — it's an in-process synchronization primitive where
//! any number of tasks block on a name and a `Signal` call wakes a chosen
//! number of them, in registration order, each with the signalled value.
//!
//! Grounded in `schedulers.py`'s `t.sigwait: defaultdict(deque)`, keyed by
//! signal name, and the `Events.Signal`/`Events.WaitForSignal` dispatch in
//! `Scheduler.run`.

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::waker::TaskId;

pub type SignalValue = Arc<dyn Any + Send + Sync>;

#[derive(Default)]
pub(crate) struct Registry {
    waiters: HashMap<String, VecDeque<TaskId>>,
    /// Delivered values waiting to be picked up by a waiter that hasn't
    /// been polled again yet.
    delivered: HashMap<TaskId, SignalValue>,
}

impl Registry {
    pub fn register_waiter(&mut self, name: &str, task: TaskId) {
        self.waiters.entry(name.to_string()).or_default().push_back(task);
    }

    /// Wake up to `recipients` waiters registered under `name` (all of them
    /// if `None`), delivering `value` to each; returns the task IDs woken,
    /// in registration order, so the caller can re-queue them.
    pub fn signal(
        &mut self,
        name: &str,
        value: SignalValue,
        recipients: Option<usize>,
    ) -> Vec<TaskId> {
        let Some(queue) = self.waiters.get_mut(name) else {
            return Vec::new();
        };
        let n = recipients.unwrap_or(queue.len()).min(queue.len());
        let woken: Vec<TaskId> = queue.drain(..n).collect();
        if queue.is_empty() {
            self.waiters.remove(name);
        }
        for task in &woken {
            self.delivered.insert(*task, value.clone());
        }
        woken
    }

    pub fn take_delivered(&mut self, task: TaskId) -> Option<SignalValue> {
        self.delivered.remove(&task)
    }

    /// Remove `task` from every name it might be waiting on — used when a
    /// task's `WaitForSignal` is abandoned via a timeout.
    pub fn cancel_waiter(&mut self, task: TaskId) {
        self.waiters.retain(|_, queue| {
            queue.retain(|t| *t != task);
            !queue.is_empty()
        });
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    #[cfg(test)]
    pub fn waiting_count(&self, name: &str) -> usize {
        self.waiters.get(name).map_or(0, VecDeque::len)
    }
}

/// Suspend the current task until `name` is signalled.
pub fn wait_for_signal(name: impl Into<String>) -> WaitForSignal {
    WaitForSignal {
        name: name.into(),
        registered: false,
    }
}

pub struct WaitForSignal {
    name: String,
    registered: bool,
}

impl Future for WaitForSignal {
    type Output = SignalValue;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let task_id = crate::runtime_context::current_task();
        crate::runtime_context::with_executor(|ex| {
            if let Some(value) = ex.take_delivered_signal(task_id) {
                return Poll::Ready(value);
            }
            if !this.registered {
                this.registered = true;
                ex.register_signal_waiter(&this.name, task_id);
            }
            Poll::Pending
        })
    }
}

/// Wake up to `recipients` tasks waiting on `name` (all, if `None`),
/// delivering `value`. Returns the number of tasks actually woken.
pub fn signal<T: Send + Sync + 'static>(
    name: impl AsRef<str>,
    value: T,
    recipients: Option<usize>,
) -> usize {
    crate::runtime_context::with_executor(|ex| {
        ex.signal(name.as_ref(), Arc::new(value), recipients)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_wakes_up_to_recipients_in_order() {
        let mut reg = Registry::default();
        for id in [1, 2, 3, 4, 5] {
            reg.register_waiter("go", TaskId(id));
        }
        let woken = reg.signal("go", Arc::new(42i32), Some(3));
        assert_eq!(woken, vec![TaskId(1), TaskId(2), TaskId(3)]);
        assert_eq!(reg.waiting_count("go"), 2);
        for id in [1, 2, 3] {
            let v = reg.take_delivered(TaskId(id)).unwrap();
            assert_eq!(*v.downcast::<i32>().unwrap(), 42);
        }
    }

    #[test]
    fn signal_with_no_recipients_limit_wakes_everyone() {
        let mut reg = Registry::default();
        reg.register_waiter("go", TaskId(1));
        reg.register_waiter("go", TaskId(2));
        let woken = reg.signal("go", Arc::new(()), None);
        assert_eq!(woken.len(), 2);
        assert!(reg.is_empty());
    }

    #[test]
    fn cancel_waiter_removes_from_all_names() {
        let mut reg = Registry::default();
        reg.register_waiter("a", TaskId(1));
        reg.register_waiter("b", TaskId(1));
        reg.register_waiter("b", TaskId(2));
        reg.cancel_waiter(TaskId(1));
        assert_eq!(reg.waiting_count("a"), 0);
        assert_eq!(reg.waiting_count("b"), 1);
    }
}
