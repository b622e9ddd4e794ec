//! The I/O backend abstraction: one uniform trait implemented by five OS
//! backends (select, poll, epoll, kqueue, IOCP), four readiness-based and
//! one completion-based.
//!
//! Readiness backends perform the actual syscall themselves once the
//! kernel reports a descriptor ready, producing a [`CompletionKind`]
//! directly — this is what lets a single `poll_complete` signature serve
//! both reactor and proactor backends: a proactor like IOCP already has the
//! completion (bytes transferred) handed to it by the kernel, while a
//! reactor performs the read/write inline and wraps the result the same
//! way.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use crate::buffer::Buffer;
use crate::config::DEFAULT_POLL_RESOLUTION_MS;

/// The OS-native descriptor type for an I/O resource: a file descriptor on
/// Unix, a `HANDLE` on Windows (where IOCP operates on file/socket handles
/// rather than small integers).
#[cfg(unix)]
pub type RawFd = std::os::unix::io::RawFd;
#[cfg(windows)]
pub type RawFd = std::os::windows::io::RawHandle;

/// A trait for I/O resources that can be represented by a raw descriptor.
pub trait AsRawFd {
    fn as_raw_fd(&self) -> RawFd;
}

/// A specific I/O operation submitted to a backend.
#[derive(Debug, Clone)]
pub enum Op {
    Accept {
        fd: RawFd,
    },
    Connect {
        fd: RawFd,
        addr: SocketAddr,
    },
    Read {
        fd: RawFd,
        len: usize,
    },
    Write {
        fd: RawFd,
        data: Buffer,
    },
    SendFile {
        file_fd: RawFd,
        sock_fd: RawFd,
        offset: u64,
        /// `None` means "send until a zero-byte send", matching the
        /// no-length `SendFile` variant.
        len: Option<usize>,
    },
    Fsync {
        fd: RawFd,
    },
    Close {
        fd: RawFd,
    },
    ReadFile {
        fd: RawFd,
        offset: u64,
        len: usize,
    },
    WriteFile {
        fd: RawFd,
        offset: u64,
        data: Buffer,
    },
    UdpRecv {
        fd: RawFd,
        buffer: Buffer,
    },
    UdpSend {
        fd: RawFd,
        data: Buffer,
        addr: SocketAddr,
    },
}

impl AsRawFd for Op {
    fn as_raw_fd(&self) -> RawFd {
        match self {
            Op::Accept { fd }
            | Op::Connect { fd, .. }
            | Op::Read { fd, .. }
            | Op::Write { fd, .. }
            | Op::Fsync { fd }
            | Op::Close { fd }
            | Op::ReadFile { fd, .. }
            | Op::WriteFile { fd, .. }
            | Op::UdpRecv { fd, .. }
            | Op::UdpSend { fd, .. } => *fd,
            Op::SendFile { sock_fd, .. } => *sock_fd,
        }
    }
}

/// A unique identifier for a submitted I/O operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IoToken {
    id: u64,
}

static TOKEN_COUNTER: AtomicU64 = AtomicU64::new(1);

impl Default for IoToken {
    fn default() -> Self {
        Self::new()
    }
}

impl IoToken {
    pub fn new() -> Self {
        Self {
            id: TOKEN_COUNTER.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// The outcome of a completed operation.
#[derive(Debug, Clone)]
pub enum CompletionKind {
    Accept {
        fd: RawFd,
        addr: Option<SocketAddr>,
    },
    Connect,
    Read {
        bytes_read: usize,
        data: Buffer,
    },
    Write {
        bytes_written: usize,
    },
    SendFile {
        sent: usize,
    },
    Fsync,
    Close,
    ReadFile {
        bytes_read: usize,
        data: Buffer,
    },
    WriteFile {
        bytes_written: usize,
    },
    UdpRecv {
        bytes_read: usize,
        buffer: Buffer,
        addr: SocketAddr,
    },
    UdpSend {
        bytes_written: usize,
        data: Buffer,
    },
}

/// Error originating from a backend or the underlying syscall it wraps.
#[derive(Debug)]
pub enum IoError {
    Io(std::io::Error),
    Other(String),
}

impl std::fmt::Display for IoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IoError::Io(err) => write!(f, "I/O error: {err}"),
            IoError::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for IoError {}

impl From<std::io::Error> for IoError {
    fn from(err: std::io::Error) -> Self {
        IoError::Io(err)
    }
}

impl From<IoError> for std::io::Error {
    fn from(e: IoError) -> Self {
        match e {
            IoError::Io(err) => err,
            IoError::Other(s) => std::io::Error::other(s),
        }
    }
}

/// One completed operation, reported by a backend's `poll_complete`.
#[derive(Debug)]
pub struct Completion {
    pub token: IoToken,
    pub result: Result<CompletionKind, IoError>,
}

/// The uniform backend interface (§4.1 of the design): submit an operation,
/// drain completions, and report how many registrations are outstanding
/// (used by the scheduler's termination check).
pub trait IoBackend: 'static {
    /// Register `op`; returns a token used to correlate completions.
    fn submit(&self, op: Op) -> IoToken;

    /// Non-blocking drain of whatever completed since the last call. A
    /// backend that needs to block to make progress (all readiness
    /// backends) still returns promptly here — actual blocking happens in
    /// [`IoBackend::run`].
    fn poll_complete(&self, cx: &mut Context<'_>) -> Poll<Vec<Completion>>;

    /// Block for up to `timeout` (or indefinitely if `None`) running the
    /// underlying event mechanism once, returning whatever completed.
    /// `timeout` of `Some(Duration::ZERO)` is a non-blocking poll.
    fn run(&self, timeout: Option<Duration>) -> Vec<Completion>;

    /// Number of operations currently registered and not yet completed.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The backend's polling resolution: how long `run(None)` is willing to
    /// block when there's nothing else for the scheduler to do.
    fn resolution(&self) -> Duration {
        Duration::from_millis(DEFAULT_POLL_RESOLUTION_MS)
    }
}

#[cfg(io_backend = "kqueue")]
pub mod kqueue;

#[cfg(io_backend = "epoll")]
pub mod epoll;

#[cfg(io_backend = "poll")]
pub mod poll;

#[cfg(io_backend = "select")]
pub mod select;

#[cfg(io_backend = "iocp")]
pub mod iocp;

pub mod future;
#[cfg(unix)]
pub(crate) mod syscall;

/// Convert a [`SocketAddr`] into the raw `sockaddr_storage` form the
/// `connect`/`sendto`/`bind` family of syscalls expects. Shared by every
/// Unix backend so none of them need a socket-address crate of their own.
#[cfg(unix)]
pub(crate) fn addr_to_raw(addr: SocketAddr) -> (libc::sockaddr_storage, libc::socklen_t) {
    let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
    let len = match addr {
        SocketAddr::V4(v4) => {
            let sin = libc::sockaddr_in {
                sin_family: libc::AF_INET as libc::sa_family_t,
                sin_port: v4.port().to_be(),
                sin_addr: libc::in_addr {
                    s_addr: u32::from_ne_bytes(v4.ip().octets()),
                },
                sin_zero: [0; 8],
            };
            unsafe {
                std::ptr::write(&mut storage as *mut _ as *mut libc::sockaddr_in, sin);
            }
            std::mem::size_of::<libc::sockaddr_in>()
        }
        SocketAddr::V6(v6) => {
            let sin6 = libc::sockaddr_in6 {
                sin6_family: libc::AF_INET6 as libc::sa_family_t,
                sin6_port: v6.port().to_be(),
                sin6_flowinfo: v6.flowinfo(),
                sin6_addr: libc::in6_addr {
                    s6_addr: v6.ip().octets(),
                },
                sin6_scope_id: v6.scope_id(),
            };
            unsafe {
                std::ptr::write(&mut storage as *mut _ as *mut libc::sockaddr_in6, sin6);
            }
            std::mem::size_of::<libc::sockaddr_in6>()
        }
    };
    (storage, len as libc::socklen_t)
}

/// A backend that completes nothing, ever — used by tests that don't touch
/// real I/O and as the absolute fallback when no platform-specific backend
/// is available.
#[derive(Debug, Default)]
pub struct DummyIoBackend;

impl IoBackend for DummyIoBackend {
    fn submit(&self, _op: Op) -> IoToken {
        IoToken::new()
    }

    fn poll_complete(&self, _cx: &mut Context<'_>) -> Poll<Vec<Completion>> {
        Poll::Ready(Vec::new())
    }

    fn run(&self, _timeout: Option<Duration>) -> Vec<Completion> {
        Vec::new()
    }

    fn len(&self) -> usize {
        0
    }
}

/// Construct the default backend for this platform, in priority order IOCP
/// > kqueue > epoll > poll > select, as selected by `build.rs` via the
/// `io_backend` cfg.
pub fn default_backend() -> Box<dyn IoBackend> {
    #[cfg(windows)]
    {
        return Box::new(iocp::IocpBackend::new());
    }
    #[cfg(all(not(windows), any(target_os = "macos", target_os = "ios", io_backend = "kqueue")))]
    {
        return Box::new(kqueue::KqueueBackend::new());
    }
    #[cfg(all(
        not(windows),
        not(any(target_os = "macos", target_os = "ios", io_backend = "kqueue")),
        any(target_os = "linux", io_backend = "epoll")
    ))]
    {
        return Box::new(epoll::EpollBackend::new());
    }
    #[cfg(all(
        not(windows),
        not(any(target_os = "macos", target_os = "ios", io_backend = "kqueue")),
        not(any(target_os = "linux", io_backend = "epoll")),
        unix
    ))]
    {
        return Box::new(poll::PollBackend::new());
    }
    #[cfg(not(any(windows, unix)))]
    {
        Box::new(DummyIoBackend)
    }
}
