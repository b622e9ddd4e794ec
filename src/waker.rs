//! The ready queue and the `Waker` adapter that feeds it.
//!
//! Every task that can make progress sits in the ready queue as a bare
//! [`TaskId`]; the actual resume value (an I/O result, a signal payload, a
//! join return) lives wherever the leaf future that produced it stashed it
//! (the I/O backend's completion map, the timer heap, the rendezvous
//! registry) and is picked back up the next time that leaf future is polled.
//! The ready queue itself never carries payloads, which keeps waking cheap
//! and independent of what's being waited on.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::task::{RawWaker, RawWakerVTable, Waker};

/// A task ID that uniquely identifies a task in the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) u64);

impl TaskId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// The scheduler's ready queue: a double-ended queue of runnable task IDs.
///
/// A plain `Mutex<VecDeque<_>>` rather than a lock-free structure: the CORO
/// priority bit requires pushing to either end, which `crossbeam_queue`'s
/// `SegQueue` cannot do, and the queue is touched only by the single
/// executor thread plus the rare cross-thread wakeup (e.g. a signal handler
/// waking a sleeping scheduler), so contention is a non-issue.
#[derive(Debug, Default)]
pub struct ReadyQueue {
    inner: Mutex<VecDeque<TaskId>>,
}

impl ReadyQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(VecDeque::with_capacity(
                crate::config::INITIAL_TASK_QUEUE_CAPACITY,
            )),
        })
    }

    /// Queue a task at the back (normal, fair wakeup).
    pub fn push_back(&self, task: TaskId) {
        self.inner.lock().unwrap().push_back(task);
    }

    /// Queue a task at the front (the CORO priority bit: resume it before
    /// any task already waiting).
    pub fn push_front(&self, task: TaskId) {
        self.inner.lock().unwrap().push_front(task);
    }

    pub fn pop_front(&self) -> Option<TaskId> {
        self.inner.lock().unwrap().pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `Waker` implementation that re-queues a task, honoring its CORO priority
/// bit (front vs. back insertion).
pub struct CoroWaker {
    task_id: TaskId,
    queue: Arc<ReadyQueue>,
    front: bool,
}

impl CoroWaker {
    /// Build a `std::task::Waker` for `task_id` that pushes to the front of
    /// `queue` on wake if `front` is set, else to the back.
    pub fn new(task_id: TaskId, queue: Arc<ReadyQueue>, front: bool) -> Waker {
        let waker = Arc::new(CoroWaker {
            task_id,
            queue,
            front,
        });
        let raw = RawWaker::new(Arc::into_raw(waker) as *const (), &VTABLE);
        unsafe { Waker::from_raw(raw) }
    }

    fn wake_impl(&self) {
        if self.front {
            self.queue.push_front(self.task_id);
        } else {
            self.queue.push_back(self.task_id);
        }
    }
}

static VTABLE: RawWakerVTable =
    RawWakerVTable::new(waker_clone, waker_wake, waker_wake_by_ref, waker_drop);

unsafe fn waker_clone(data: *const ()) -> RawWaker {
    let waker = Arc::from_raw(data as *const CoroWaker);
    let cloned = Arc::clone(&waker);
    std::mem::forget(waker);
    RawWaker::new(Arc::into_raw(cloned) as *const (), &VTABLE)
}

unsafe fn waker_wake(data: *const ()) {
    let waker = Arc::from_raw(data as *const CoroWaker);
    waker.wake_impl();
}

unsafe fn waker_wake_by_ref(data: *const ()) {
    let waker = &*(data as *const CoroWaker);
    waker.wake_impl();
}

unsafe fn waker_drop(data: *const ()) {
    drop(Arc::from_raw(data as *const CoroWaker));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wake_pushes_to_back_by_default() {
        let queue = ReadyQueue::new();
        let waker = CoroWaker::new(TaskId(42), queue.clone(), false);
        waker.wake();
        assert_eq!(queue.pop_front(), Some(TaskId(42)));
    }

    #[test]
    fn wake_with_coro_bit_pushes_to_front() {
        let queue = ReadyQueue::new();
        queue.push_back(TaskId(1));
        let waker = CoroWaker::new(TaskId(2), queue.clone(), true);
        waker.wake();
        assert_eq!(queue.pop_front(), Some(TaskId(2)));
        assert_eq!(queue.pop_front(), Some(TaskId(1)));
    }

    #[test]
    fn clone_and_wake_by_ref_both_work() {
        let queue = ReadyQueue::new();
        let waker1 = CoroWaker::new(TaskId(99), queue.clone(), false);
        let waker2 = waker1.clone();
        waker1.wake_by_ref();
        waker2.wake();
        assert_eq!(queue.pop_front(), Some(TaskId(99)));
        assert_eq!(queue.pop_front(), Some(TaskId(99)));
        assert_eq!(queue.pop_front(), None);
    }
}
