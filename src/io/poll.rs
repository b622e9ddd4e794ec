//! A `poll(2)`-based backend — the fallback for Unix platforms without
//! epoll/kqueue, and a simpler baseline used in testing.
//!
//! Grounded in the same readiness-then-inline-syscall shape as
//! [`crate::io::epoll`], but tracks interest with a flat `Vec<libc::pollfd>`
//! instead of delegating to `mio`.

use std::cell::UnsafeCell;
use std::io;
use std::os::unix::io::RawFd;
use std::task::{Context, Poll as TaskPoll};
use std::time::Duration;

use crate::io::syscall;
use crate::io::{AsRawFd as OpAsRawFd, Completion, IoBackend, IoToken, Op};

struct Pending {
    fd: RawFd,
    events: libc::c_short,
    io_token: IoToken,
    op: Op,
}

/// A `poll`-based [`IoBackend`].
pub struct PollBackend {
    pending: UnsafeCell<Vec<Pending>>,
    ready: UnsafeCell<Vec<Completion>>,
}

unsafe impl Send for PollBackend {}
unsafe impl Sync for PollBackend {}

impl PollBackend {
    pub fn new() -> Self {
        Self {
            pending: UnsafeCell::new(Vec::new()),
            ready: UnsafeCell::new(Vec::new()),
        }
    }

    fn drain(&self, timeout: Option<Duration>) -> Vec<Completion> {
        let pending = unsafe { &mut *self.pending.get() };
        if pending.is_empty() {
            if let Some(d) = timeout {
                std::thread::sleep(d);
            }
            return Vec::new();
        }

        let mut pollfds: Vec<libc::pollfd> = pending
            .iter()
            .map(|p| libc::pollfd {
                fd: p.fd,
                events: p.events,
                revents: 0,
            })
            .collect();

        let timeout_ms = timeout.map_or(-1, |d| d.as_millis().min(i32::MAX as u128) as i32);
        let ret = unsafe {
            libc::poll(
                pollfds.as_mut_ptr(),
                pollfds.len() as libc::nfds_t,
                timeout_ms,
            )
        };
        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                tracing::warn!(%err, "poll() failed");
            }
            return Vec::new();
        }

        let mut completions = Vec::new();
        let mut i = 0;
        while i < pending.len() {
            if pollfds[i].revents != 0 {
                let entry = pending.remove(i);
                completions.push(Completion {
                    token: entry.io_token,
                    result: syscall::confirm_op(entry.op),
                });
            } else {
                i += 1;
            }
        }
        completions
    }
}

impl Default for PollBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl IoBackend for PollBackend {
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

        let events = match &op {
            Op::Accept { .. } | Op::Read { .. } | Op::UdpRecv { .. } => libc::POLLIN,
            Op::Connect { .. } | Op::Write { .. } | Op::SendFile { .. } | Op::UdpSend { .. } => {
                libc::POLLOUT
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

        let fd = op.as_raw_fd();
        unsafe { &mut *self.pending.get() }.push(Pending {
            fd,
            events: events as libc::c_short,
            io_token,
            op,
        });
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
