//! Timer stores: two stable min-heaps (`timewait` for sleeps, `timeouts` for
//! per-operation deadlines), and the public `sleep`/`timeout`/`Interval` API
//! built on top of them.
//!
//! Both heaps are owned by [`crate::executor::Executor`], not by this
//! module — the heap data structure itself (`heap::TimerHeap`) is generic
//! and reusable, but it knows nothing about tasks or operations.

pub mod heap;
pub mod interval;
pub mod sleep;
pub mod timeout;

pub use interval::Interval;
pub use sleep::{sleep, sleep_until, SleepFuture};
pub use timeout::{with_timeout, FutureExt, Timeout, TimeoutElapsed};
