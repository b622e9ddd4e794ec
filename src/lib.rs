//! cogen-rs: a single-threaded cooperative concurrency runtime with a
//! pluggable OS I/O backend.
//!
//! Tasks are ordinary Rust futures, scheduled by a single-threaded
//! [`Executor`] that multiplexes blocking I/O through one of several
//! backends (epoll/kqueue/poll/select/IOCP), picked at compile time — see
//! `build.rs` for the selection logic.
//!
//! # Example
//!
//! ```rust,no_run
//! use cogen_rs::{task, timer};
//! use std::time::Duration;
//!
//! # async fn example() {
//! timer::sleep(Duration::from_millis(10)).await;
//!
//! let result = timer::with_timeout(Duration::from_secs(5), async {
//!     timer::sleep(Duration::from_secs(2)).await;
//!     "completed"
//! }).await;
//!
//! let handle = task::spawn(async { 1 + 1 });
//! let _ = handle.await;
//! # }
//! ```
//!
//! # Graceful shutdown via signals
//!
//! With the `signal` feature enabled, [`shutdown::SignalHandler`] listens
//! for `SIGINT`/`SIGTERM`/`SIGHUP` on a dedicated thread and flips a shared
//! flag a running task can poll.

#![deny(warnings)]

pub mod buffer;
pub mod config;
pub mod error;
pub mod executor;
pub mod io;
pub mod net;
pub mod rendezvous;
pub mod socket;
pub mod task;
pub mod timer;
pub mod waker;

mod runtime_context;

#[cfg(feature = "signal")]
pub mod shutdown;

pub use buffer::{Buffer, BufferPool};
pub use error::{OpError, OpResult, RuntimeError};
pub use executor::{Executor, Runtime};
pub use io::{CompletionKind, DummyIoBackend, IoBackend, IoError, IoToken, Op};
pub use task::{spawn, JoinHandle, TaskBuilder};
pub use timer::{sleep, sleep_until, with_timeout, FutureExt, Interval, TimeoutElapsed};

/// Create a new runtime (using the platform's default I/O backend) and
/// block the current thread running `future` to completion.
pub fn block_on<F>(future: F) -> F::Output
where
    F: std::future::Future,
{
    Runtime::new().block_on(future)
}
