//! A `select(2)`-based backend — the lowest common denominator, kept around
//! for platforms or sandboxes where neither epoll/kqueue nor even `poll`
//! are wired up. Limited to `FD_SETSIZE` (typically 1024) descriptors, as
//! `select` itself is.
//!
//! Same inline-fast-path/readiness-registration shape as
//! [`crate::io::poll`], just with `fd_set` bitmasks instead of a
//! `pollfd` array.

use std::cell::UnsafeCell;
use std::io;
use std::mem::MaybeUninit;
use std::os::unix::io::RawFd;
use std::task::{Context, Poll as TaskPoll};
use std::time::Duration;

use crate::io::syscall;
use crate::io::{AsRawFd as OpAsRawFd, Completion, IoBackend, IoToken, Op};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
    Read,
    Write,
}

struct Pending {
    fd: RawFd,
    direction: Direction,
    io_token: IoToken,
    op: Op,
}

/// A `select`-based [`IoBackend`].
pub struct SelectBackend {
    pending: UnsafeCell<Vec<Pending>>,
    ready: UnsafeCell<Vec<Completion>>,
}

unsafe impl Send for SelectBackend {}
unsafe impl Sync for SelectBackend {}

impl SelectBackend {
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

        let mut read_set = unsafe { MaybeUninit::<libc::fd_set>::zeroed().assume_init() };
        let mut write_set = unsafe { MaybeUninit::<libc::fd_set>::zeroed().assume_init() };
        unsafe {
            libc::FD_ZERO(&mut read_set);
            libc::FD_ZERO(&mut write_set);
        }
        let mut max_fd = 0;
        for p in pending.iter() {
            unsafe {
                match p.direction {
                    Direction::Read => libc::FD_SET(p.fd, &mut read_set),
                    Direction::Write => libc::FD_SET(p.fd, &mut write_set),
                }
            }
            max_fd = max_fd.max(p.fd);
        }

        let mut tv;
        let tv_ptr = match timeout {
            Some(d) => {
                tv = libc::timeval {
                    tv_sec: d.as_secs() as libc::time_t,
                    tv_usec: d.subsec_micros() as libc::suseconds_t,
                };
                &mut tv as *mut libc::timeval
            }
            None => std::ptr::null_mut(),
        };

        let ret = unsafe {
            libc::select(
                max_fd + 1,
                &mut read_set,
                &mut write_set,
                std::ptr::null_mut(),
                tv_ptr,
            )
        };
        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                tracing::warn!(%err, "select() failed");
            }
            return Vec::new();
        }

        let mut completions = Vec::new();
        let mut i = 0;
        while i < pending.len() {
            let p = &pending[i];
            let is_ready = unsafe {
                match p.direction {
                    Direction::Read => libc::FD_ISSET(p.fd, &read_set),
                    Direction::Write => libc::FD_ISSET(p.fd, &write_set),
                }
            };
            if is_ready {
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

impl Default for SelectBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl IoBackend for SelectBackend {
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

        let direction = match &op {
            Op::Accept { .. } | Op::Read { .. } | Op::UdpRecv { .. } => Direction::Read,
            Op::Connect { .. } | Op::Write { .. } | Op::SendFile { .. } | Op::UdpSend { .. } => {
                Direction::Write
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
            direction,
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
