//! A future that drives a single [`Op`] through the executor's I/O backend.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::io::{CompletionKind, IoError, IoToken, Op};
use crate::runtime_context;

enum State {
    /// Not yet submitted to the backend.
    Pending(Op),
    /// Submitted; waiting on `token`.
    Submitted(IoToken),
    /// Already resolved and handed out — polling again is a bug.
    Done,
}

/// Waits for a submitted [`Op`] to complete.
///
/// On its first poll this submits the op to the current executor's backend
/// (which itself attempts the synchronous fast path before registering for
/// readiness — see `io::epoll`'s module doc) and immediately checks whether
/// it already resolved. Every later poll is just a completion-map lookup, a
/// waker registration on miss.
pub struct IoFuture {
    state: State,
}

impl IoFuture {
    /// Build a future for an op that hasn't been submitted yet.
    pub fn new(op: Op) -> Self {
        IoFuture {
            state: State::Pending(op),
        }
    }

    /// Build a future for an op already submitted (token in hand).
    pub fn from_token(token: IoToken) -> Self {
        IoFuture {
            state: State::Submitted(token),
        }
    }
}

impl Future for IoFuture {
    type Output = Result<CompletionKind, IoError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        let token = match std::mem::replace(&mut this.state, State::Done) {
            State::Pending(op) => {
                runtime_context::with_executor(|ex| ex.submit_io(op))
            }
            State::Submitted(token) => token,
            State::Done => panic!("IoFuture polled after it already resolved"),
        };

        let result = runtime_context::with_executor(|ex| ex.take_io_completion(token));
        match result {
            Some(result) => Poll::Ready(result),
            None => {
                runtime_context::with_executor(|ex| {
                    ex.register_io_waker(token, cx.waker().clone())
                });
                this.state = State::Submitted(token);
                Poll::Pending
            }
        }
    }
}

impl Drop for IoFuture {
    fn drop(&mut self) {
        if let State::Submitted(token) = self.state {
            // Best-effort: drop our bookkeeping so a late completion is
            // silently discarded rather than waking a future that no
            // longer exists. `try_with_executor` rather than `with_executor`
            // since a drop happening outside a running executor (e.g. the
            // runtime was torn down first) is not this future's problem.
            runtime_context::try_with_executor(|ex| ex.cancel_io(token));
        }
    }
}
