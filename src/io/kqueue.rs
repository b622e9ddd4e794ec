//! A `kqueue` backend (via `mio`) for macOS/BSD.
//!
//! Structurally identical to [`crate::io::epoll::EpollBackend`] — `mio`
//! already abstracts epoll vs. kqueue at the `mio::Poll` level, so this
//! module exists mainly to give the backend selection in
//! [`crate::io::default_backend`] an explicit, platform-named choice.

use std::cell::UnsafeCell;
use std::collections::HashMap;
use std::io;
use std::task::{Context, Poll as TaskPoll};
use std::time::Duration;

use mio::{Events, Interest, Token};

use crate::io::syscall;
use crate::io::{AsRawFd as OpAsRawFd, Completion, IoBackend, IoError, IoToken, Op};

struct Pending {
    io_token: IoToken,
    op: Op,
}

/// A `kqueue`-based [`IoBackend`].
pub struct KqueueBackend {
    poll: UnsafeCell<mio::Poll>,
    events: UnsafeCell<Events>,
    pending: UnsafeCell<HashMap<Token, Pending>>,
    next_token: UnsafeCell<usize>,
    ready: UnsafeCell<Vec<Completion>>,
}

unsafe impl Send for KqueueBackend {}
unsafe impl Sync for KqueueBackend {}

impl KqueueBackend {
    pub fn new() -> Self {
        Self {
            poll: UnsafeCell::new(mio::Poll::new().expect("failed to create kqueue instance")),
            events: UnsafeCell::new(Events::with_capacity(1024)),
            pending: UnsafeCell::new(HashMap::new()),
            next_token: UnsafeCell::new(0),
            ready: UnsafeCell::new(Vec::new()),
        }
    }

    fn register(&self, interest: Interest, io_token: IoToken, op: Op) {
        let next_token = unsafe { &mut *self.next_token.get() };
        let poll = unsafe { &mut *self.poll.get() };
        let pending = unsafe { &mut *self.pending.get() };

        let mio_token = Token(*next_token);
        *next_token += 1;

        let fd = op.as_raw_fd();
        let mut source = mio::unix::SourceFd(&fd);
        poll.registry()
            .register(&mut source, mio_token, interest)
            .expect("failed to register fd with kqueue");
        pending.insert(mio_token, Pending { io_token, op });
    }

    fn drain(&self, timeout: Option<Duration>) -> Vec<Completion> {
        let poll = unsafe { &mut *self.poll.get() };
        let events = unsafe { &mut *self.events.get() };
        let pending = unsafe { &mut *self.pending.get() };

        if let Err(err) = poll.poll(events, timeout) {
            if err.kind() != io::ErrorKind::Interrupted {
                tracing::warn!(%err, "kqueue poll() failed");
            }
            return Vec::new();
        }

        let ready_tokens: Vec<Token> = events.iter().map(|e| e.token()).collect();
        let mut completions = Vec::with_capacity(ready_tokens.len());
        for token in ready_tokens {
            if let Some(entry) = pending.remove(&token) {
                let fd = entry.op.as_raw_fd();
                let mut source = mio::unix::SourceFd(&fd);
                let _ = poll.registry().deregister(&mut source);
                completions.push(Completion {
                    token: entry.io_token,
                    result: syscall::confirm_op(entry.op),
                });
            }
        }
        completions
    }
}

impl Default for KqueueBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl IoBackend for KqueueBackend {
    fn submit(&self, op: Op) -> IoToken {
        let io_token = IoToken::new();

        if matches!(
            op,
            Op::Fsync { .. } | Op::Close { .. } | Op::ReadFile { .. } | Op::WriteFile { .. }
        ) {
            let result = syscall::run_op(op);
            unsafe { &mut *self.ready.get() }.push(Completion {
                token: io_token,
                result,
            });
            return io_token;
        }

        let interest = match &op {
            Op::Accept { .. } | Op::Read { .. } | Op::UdpRecv { .. } => Interest::READABLE,
            Op::Connect { .. } | Op::Write { .. } | Op::SendFile { .. } | Op::UdpSend { .. } => {
                Interest::WRITABLE
            }
            _ => unreachable!("synchronous ops handled above"),
        };

        let fast = syscall::run_op(op.clone());
        if !syscall::would_block(&fast) {
            unsafe { &mut *self.ready.get() }.push(Completion {
                token: io_token,
                result: fast,
            });
            return io_token;
        }

        self.register(interest, io_token, op);
        io_token
    }

    fn poll_complete(&self, _cx: &mut Context<'_>) -> TaskPoll<Vec<Completion>> {
        let mut completions = std::mem::take(unsafe { &mut *self.ready.get() });
        completions.extend(self.drain(Some(Duration::ZERO)));
        if completions.is_empty() {
            TaskPoll::Pending
        } else {
            TaskPoll::Ready(completions)
        }
    }

    fn run(&self, timeout: Option<Duration>) -> Vec<Completion> {
        let ready = unsafe { &mut *self.ready.get() };
        if !ready.is_empty() {
            return std::mem::take(ready);
        }
        self.drain(timeout)
    }

    fn len(&self) -> usize {
        unsafe { &*self.pending.get() }.len()
    }
}
