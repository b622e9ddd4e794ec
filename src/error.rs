//! Error taxonomy for the runtime.
//!
//! Errors delivered to a task as its resume value (connection/timeout/overflow
//! errors, and caught panics re-surfaced as [`CoroutineException`]) are distinct
//! from errors the scheduler itself considers fatal ([`RuntimeError`]).

use std::io;

use thiserror::Error;

/// An error delivered in-task, as the resume value of a suspended operation.
#[derive(Debug, Error)]
pub enum OpError {
    /// The peer closed the connection (EOF on read, or `EPIPE` on write).
    #[error("connection closed")]
    ConnectionClosed,

    /// Any other socket-level failure.
    #[error("connection error: {0}")]
    ConnectionError(#[source] io::Error),

    /// The operation's deadline elapsed before it completed.
    #[error("operation timed out")]
    OperationTimeout,

    /// `ReadLine` accumulated its full buffer limit without finding a
    /// newline.
    #[error("line exceeded buffer limit before a newline was found")]
    OverflowError,

    /// The task panicked, or an inner future returned an error that was
    /// never caught by the task itself; carries the panic message or error
    /// text for diagnostics.
    #[error("coroutine exception: {0}")]
    CoroutineException(String),
}

impl OpError {
    pub fn connection_error(err: io::Error) -> Self {
        if err.raw_os_error() == Some(libc::EPIPE) {
            OpError::ConnectionClosed
        } else {
            OpError::ConnectionError(err)
        }
    }
}

impl From<io::Error> for OpError {
    fn from(err: io::Error) -> Self {
        OpError::connection_error(err)
    }
}

impl Clone for OpError {
    fn clone(&self) -> Self {
        match self {
            OpError::ConnectionClosed => OpError::ConnectionClosed,
            OpError::ConnectionError(e) => {
                OpError::ConnectionError(io::Error::new(e.kind(), e.to_string()))
            }
            OpError::OperationTimeout => OpError::OperationTimeout,
            OpError::OverflowError => OpError::OverflowError,
            OpError::CoroutineException(s) => OpError::CoroutineException(s.clone()),
        }
    }
}

/// An error the scheduler itself considers fatal; bubbles out of
/// [`crate::executor::Executor::run`] rather than being delivered to a task.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime not initialized: no executor is current on this thread")]
    NotInitialized,

    #[error("task failed: {0}")]
    TaskFailed(String),

    #[error("I/O backend failure: {0}")]
    IoFailed(#[from] io::Error),

    #[error("backend registration invariant violated: {0}")]
    BackendInvariant(String),
}

/// Convenience alias for results flowing out of in-task operations.
pub type OpResult<T> = Result<T, OpError>;

/// Convenience alias for a task's overall outcome.
pub type TaskResult<T> = Result<T, OpError>;
