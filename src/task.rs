//! The task abstraction: one schedulable unit wrapping a single coroutine.
//!
//! A task is modeled directly as a `Future` — advancing it "by one step" is
//! exactly `Future::poll`, and whatever an inner `.await` yields is the
//! resume value. This is the design's answer to the reference
//! implementation's generator-based coroutines: it composes through
//! ordinary Rust control flow instead of a separate dispatch loop.

use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::error::OpError;
use crate::waker::TaskId;

/// What a task produces when it terminates: either a type-erased return
/// value, shared via `Arc` so every current and future joiner gets its own
/// handle without requiring the value to be `Clone`, or the error that
/// killed it.
pub type TaskOutcome = Result<Arc<dyn Any + Send + Sync>, OpError>;

pub(crate) type BoxedTaskFuture = Pin<Box<dyn Future<Output = TaskOutcome>>>;

/// One schedulable task.
///
/// Lifecycle: created by [`crate::executor::Executor::add`] (or by `Call`);
/// each time it reaches the front of the ready queue the executor calls
/// [`Task::poll`]; once it returns `Ready`, the executor finalizes it —
/// resuming every entry in `waiters` and, if present, `caller` — and the
/// task's `outcome` field becomes the permanent answer to any future Join.
pub(crate) struct Task {
    pub id: TaskId,
    future: Option<BoxedTaskFuture>,
    pub outcome: Option<TaskOutcome>,
    pub waiters: Vec<TaskId>,
    pub caller: Option<TaskId>,
    /// Default CORO-bit for this task's own re-queueing (not of operations
    /// it issues — those carry their own priority).
    pub requeue_front: bool,
}

impl Task {
    pub fn new(id: TaskId, future: BoxedTaskFuture) -> Self {
        Task {
            id,
            future: Some(future),
            outcome: None,
            waiters: Vec::new(),
            caller: None,
            requeue_front: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    /// Advance the task by one step. Must not be called again after it has
    /// returned `Ready` once.
    pub fn poll(&mut self, cx: &mut Context<'_>) -> Poll<TaskOutcome> {
        let future = self
            .future
            .as_mut()
            .expect("Task::poll called after the task already finished");
        match future.as_mut().poll(cx) {
            Poll::Ready(outcome) => {
                self.future = None;
                Poll::Ready(outcome)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Wrap a user future so its output is stored as the type-erased
/// [`TaskOutcome`] every task carries internally.
pub(crate) fn wrap<F>(future: F) -> BoxedTaskFuture
where
    F: Future + 'static,
    F::Output: Send + Sync + 'static,
{
    Box::pin(async move { Ok(Arc::new(future.await) as Arc<dyn Any + Send + Sync>) })
}

/// Result of looking up a task's completion state, used by both the typed
/// [`JoinHandle`] and the raw `Join` operation.
pub(crate) enum JoinLookup {
    NotFound,
    Pending,
    Done(TaskOutcome),
}

/// A handle to a spawned task, resolving to its return value once the task
/// terminates.
///
/// Because the underlying `Join` mechanism supports more than one waiter,
/// the resolved value is handed out as `Arc<T>` rather than `T` — this lets
/// any number of `JoinHandle<T>`s (or raw `Join` callers) observe the same
/// result without requiring `T: Clone`.
pub struct JoinHandle<T> {
    task_id: TaskId,
    registered: bool,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T> JoinHandle<T> {
    pub(crate) fn new(task_id: TaskId) -> Self {
        JoinHandle {
            task_id,
            registered: false,
            _marker: std::marker::PhantomData,
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn is_finished(&self) -> bool {
        crate::runtime_context::try_with_executor(|ex| ex.is_task_finished(self.task_id))
            .unwrap_or(false)
    }
}

impl<T: Send + Sync + 'static> Future for JoinHandle<T> {
    type Output = Result<Arc<T>, OpError>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let waiter = crate::runtime_context::current_task();
        let lookup = crate::runtime_context::with_executor(|ex| {
            if !this.registered {
                this.registered = true;
                ex.lookup_or_register_waiter(this.task_id, waiter)
            } else {
                ex.lookup_join(this.task_id)
            }
        });
        match lookup {
            JoinLookup::Pending => Poll::Pending,
            JoinLookup::NotFound => Poll::Ready(Err(OpError::CoroutineException(format!(
                "joined task {:?} does not exist",
                this.task_id
            )))),
            JoinLookup::Done(Ok(value)) => {
                let value = value.downcast::<T>().unwrap_or_else(|_| {
                    panic!("JoinHandle<T> polled with a mismatched task return type")
                });
                Poll::Ready(Ok(value))
            }
            JoinLookup::Done(Err(e)) => Poll::Ready(Err(e)),
        }
    }
}

/// Spawn `future` as a new task, returning a handle to await its result.
///
/// # Panics
/// Panics if called outside of a running executor.
pub fn spawn<F, T>(future: F) -> JoinHandle<T>
where
    F: Future<Output = T> + 'static,
    T: Send + Sync + 'static,
{
    let task_id = crate::runtime_context::with_executor(|ex| ex.add(wrap(future), false));
    JoinHandle::new(task_id)
}

/// A builder for customizing how a spawned task is scheduled.
pub struct TaskBuilder {
    requeue_front: bool,
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskBuilder {
    pub fn new() -> Self {
        TaskBuilder {
            requeue_front: false,
        }
    }

    /// Give this task's own re-queueing the CORO priority bit.
    pub fn front_priority(mut self, front: bool) -> Self {
        self.requeue_front = front;
        self
    }

    pub fn spawn<F, T>(self, future: F) -> JoinHandle<T>
    where
        F: Future<Output = T> + 'static,
        T: Send + Sync + 'static,
    {
        let task_id =
            crate::runtime_context::with_executor(|ex| ex.add(wrap(future), self.requeue_front));
        JoinHandle::new(task_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn dummy_waker() -> std::task::Waker {
        use std::task::{RawWaker, RawWakerVTable};

        fn dummy_clone(_: *const ()) -> RawWaker {
            dummy_raw_waker()
        }
        fn dummy_wake(_: *const ()) {}
        fn dummy_wake_by_ref(_: *const ()) {}
        fn dummy_drop(_: *const ()) {}
        fn dummy_raw_waker() -> RawWaker {
            RawWaker::new(
                std::ptr::null(),
                &RawWakerVTable::new(dummy_clone, dummy_wake, dummy_wake_by_ref, dummy_drop),
            )
        }
        unsafe { std::task::Waker::from_raw(dummy_raw_waker()) }
    }

    #[test]
    fn task_completes_and_stores_outcome() {
        let completed = Arc::new(AtomicBool::new(false));
        let completed_clone = completed.clone();

        let mut task = Task::new(
            TaskId(1),
            wrap(async move {
                completed_clone.store(true, Ordering::SeqCst);
                7i32
            }),
        );

        let waker = dummy_waker();
        let mut cx = Context::from_waker(&waker);
        match task.poll(&mut cx) {
            Poll::Ready(Ok(value)) => {
                assert_eq!(*value.downcast::<i32>().unwrap(), 7);
            }
            _ => panic!("expected immediate completion with Ok(7)"),
        }
        assert!(completed.load(Ordering::SeqCst));
    }

    #[test]
    fn pending_task_stays_pending() {
        let mut task = Task::new(TaskId(2), wrap(std::future::pending::<()>()));
        let waker = dummy_waker();
        let mut cx = Context::from_waker(&waker);
        assert!(matches!(task.poll(&mut cx), Poll::Pending));
    }
}
