//! Thread-local access to the currently running [`crate::executor::Executor`].
//!
//! Leaf operations (`Sleep`, socket ops, signal rendezvous) need to reach the
//! single-threaded scheduler's state (timer heaps, backend, rendezvous
//! registry, ready queue) without threading an `&Executor` through every
//! `async fn` signature. Since the runtime is strictly single-threaded, a
//! thread-local raw pointer to the currently-running `Executor` is sound:
//! the pointer is installed for the duration of `Executor::run` and cleared
//! before `run` returns, so it never outlives the executor it points to.

use std::cell::{Cell, RefCell};

use crate::executor::Executor;
use crate::waker::TaskId;

thread_local! {
    static CURRENT: RefCell<Option<*const Executor>> = const { RefCell::new(None) };
    static CURRENT_TASK: Cell<Option<TaskId>> = const { Cell::new(None) };
}

/// RAII guard that installs `executor` as current for its lifetime and
/// restores the previous value (normally `None`) on drop.
pub(crate) struct EnterGuard {
    previous: Option<*const Executor>,
}

impl Drop for EnterGuard {
    fn drop(&mut self) {
        CURRENT.with(|cell| *cell.borrow_mut() = self.previous.take());
    }
}

/// Install `executor` as the current thread's runtime for as long as the
/// returned guard lives.
pub(crate) fn enter(executor: &Executor) -> EnterGuard {
    let ptr = executor as *const Executor;
    let previous = CURRENT.with(|cell| cell.replace(Some(ptr)));
    EnterGuard { previous }
}

/// Access the current thread's running executor.
///
/// # Panics
/// Panics if called outside of `Executor::run` (no runtime context on this
/// thread).
pub fn with_executor<F, R>(f: F) -> R
where
    F: FnOnce(&Executor) -> R,
{
    CURRENT.with(|cell| {
        let ptr = cell
            .borrow()
            .expect("not in a runtime context: no executor is running on this thread");
        f(unsafe { &*ptr })
    })
}

/// Like [`with_executor`] but returns `None` instead of panicking when no
/// executor is current.
pub fn try_with_executor<F, R>(f: F) -> Option<R>
where
    F: FnOnce(&Executor) -> R,
{
    CURRENT.with(|cell| cell.borrow().map(|ptr| f(unsafe { &*ptr })))
}

/// RAII guard that records which task is presently being polled, so that
/// leaf futures (`Sleep`, et al.) can identify themselves to the scheduler
/// without threading a `TaskId` through every `async fn` signature.
pub(crate) struct CurrentTaskGuard {
    previous: Option<TaskId>,
}

impl Drop for CurrentTaskGuard {
    fn drop(&mut self) {
        CURRENT_TASK.with(|cell| cell.set(self.previous));
    }
}

pub(crate) fn enter_task(task_id: TaskId) -> CurrentTaskGuard {
    let previous = CURRENT_TASK.with(|cell| cell.replace(Some(task_id)));
    CurrentTaskGuard { previous }
}

/// The task currently being polled on this thread.
///
/// # Panics
/// Panics if called outside of a task poll (e.g. from a plain non-runtime
/// thread, or from code that isn't itself being driven by the executor).
pub fn current_task() -> TaskId {
    CURRENT_TASK
        .with(|cell| cell.get())
        .expect("not inside a task poll: no task is current on this thread")
}

/// Like [`current_task`] but returns `None` instead of panicking outside a
/// task poll.
pub(crate) fn try_current_task() -> Option<TaskId> {
    CURRENT_TASK.with(|cell| cell.get())
}
