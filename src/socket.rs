//! The buffered, non-blocking socket wrapper: `Read`/`ReadAll`/`ReadLine`/
//! `Write`/`WriteAll` over a raw descriptor, plus the free-standing
//! `accept`/`connect`/`send_file` operations that don't need any buffering
//! state of their own.
//!
//! The buffering algebra (`rl_pending`/`rl_list`/`rl_list_sz`) is carried
//! over verbatim in semantics from the reference socket operations: `Read`
//! drains any already-buffered bytes before ever touching the fd again,
//! `ReadAll`/`ReadLine` accumulate across several reads and hand back
//! whatever didn't belong to them as the new `rl_pending`.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::net::SocketAddr;
use std::os::unix::io::AsRawFd;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use crate::buffer::Buffer;
use crate::config::DEFAULT_OPERATION_TIMEOUT_MS;
use crate::error::{OpError, OpResult};
use crate::io::future::IoFuture;
use crate::io::{CompletionKind, Op, RawFd};
use crate::timer::timeout::DeadlineHandle;

/// A non-blocking socket with read-side line/accumulation buffering.
///
/// Generic over the underlying OS socket type (`std::net::TcpStream` /
/// `UdpSocket`) purely so that type keeps owning (and closing) the
/// descriptor; `Socket` itself only ever asks it for the raw fd.
pub struct Socket<T> {
    inner: T,
    rl_pending: RefCell<Vec<u8>>,
    rl_list: RefCell<Vec<Vec<u8>>>,
    rl_list_sz: Cell<usize>,
    timeout: Cell<Option<Duration>>,
}

impl<T: AsRawFd> Socket<T> {
    pub fn new(inner: T) -> Self {
        Socket {
            inner,
            rl_pending: RefCell::new(Vec::new()),
            rl_list: RefCell::new(Vec::new()),
            rl_list_sz: Cell::new(0),
            timeout: Cell::new(DEFAULT_OPERATION_TIMEOUT_MS.map(Duration::from_millis)),
        }
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    fn fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }

    /// Apply a default weak timeout to every op issued on this socket from
    /// now on (`None` disables it).
    pub fn set_timeout(&self, timeout: Option<Duration>) {
        self.timeout.set(timeout);
    }

    /// Consume up to `n` bytes already sitting in `rl_pending`, without
    /// touching the fd. Returns `None` if `rl_pending` is empty.
    fn take_pending(&self, n: usize) -> Option<Buffer> {
        let mut pending = self.rl_pending.borrow_mut();
        if pending.is_empty() {
            return None;
        }
        if pending.len() <= n {
            Some(Buffer::from(std::mem::take(&mut *pending)))
        } else {
            let rest = pending.split_off(n);
            let taken = std::mem::replace(&mut *pending, rest);
            Some(Buffer::from(taken))
        }
    }

    /// Read up to `n` bytes. An empty successful read means the peer closed
    /// the connection.
    pub async fn read(&self, n: usize) -> OpResult<Buffer> {
        if let Some(buf) = self.take_pending(n) {
            return Ok(buf);
        }
        let op = Op::Read { fd: self.fd(), len: n };
        match self.run_timed(op).await? {
            CompletionKind::Read { bytes_read, data } => {
                if bytes_read == 0 {
                    Err(OpError::ConnectionClosed)
                } else {
                    Ok(data)
                }
            }
            _ => unreachable!("Read op resolved with a mismatched completion kind"),
        }
    }

    /// Accumulate exactly `n` bytes across as many reads as it takes.
    pub async fn read_all(&self, n: usize) -> OpResult<Buffer> {
        loop {
            if self.rl_list_sz.get() >= n {
                let mut joined = Vec::with_capacity(self.rl_list_sz.get());
                for chunk in self.rl_list.borrow_mut().drain(..) {
                    joined.extend_from_slice(&chunk);
                }
                self.rl_list_sz.set(0);
                if joined.len() > n {
                    let rest = joined.split_off(n);
                    let mut pending = self.rl_pending.borrow_mut();
                    pending.splice(0..0, rest);
                }
                return Ok(Buffer::from(joined));
            }
            let want = n - self.rl_list_sz.get();
            let chunk = self.read(want).await?;
            self.rl_list_sz.set(self.rl_list_sz.get() + chunk.len());
            self.rl_list.borrow_mut().push(chunk.to_vec());
        }
    }

    /// Read until (and including) the next `\n`, or raise `OverflowError`
    /// if `n` bytes accumulate first.
    pub async fn read_line(&self, n: usize) -> OpResult<Buffer> {
        loop {
            {
                let mut pending = self.rl_pending.borrow_mut();
                if let Some(pos) = pending.iter().position(|&b| b == b'\n') {
                    let tail = pending.split_off(pos + 1);
                    let head = std::mem::replace(&mut *pending, tail);
                    return Ok(Buffer::from(head));
                }
            }
            if self.rl_list_sz.get() >= n {
                self.rl_pending.borrow_mut().clear();
                self.rl_list.borrow_mut().clear();
                self.rl_list_sz.set(0);
                return Err(OpError::OverflowError);
            }
            let want = (n - self.rl_list_sz.get()).max(1);
            let chunk = self.read(want).await?;
            if let Some(pos) = chunk.iter().position(|&b| b == b'\n') {
                let mut out = Vec::with_capacity(self.rl_list_sz.get() + pos + 1);
                for piece in self.rl_list.borrow_mut().drain(..) {
                    out.extend_from_slice(&piece);
                }
                out.extend_from_slice(&chunk[..=pos]);
                self.rl_list_sz.set(0);
                if pos + 1 < chunk.len() {
                    self.rl_pending.borrow_mut().extend_from_slice(&chunk[pos + 1..]);
                }
                return Ok(Buffer::from(out));
            }
            self.rl_list_sz.set(self.rl_list_sz.get() + chunk.len());
            self.rl_list.borrow_mut().push(chunk.to_vec());
        }
    }

    /// One send; returns the byte count actually written.
    pub async fn write(&self, data: &[u8]) -> OpResult<usize> {
        let mut buf = Buffer::new_zeroed(0);
        buf.copy_from_slice(data);
        let op = Op::Write { fd: self.fd(), data: buf };
        match self.run_timed(op).await? {
            CompletionKind::Write { bytes_written } => Ok(bytes_written),
            _ => unreachable!("Write op resolved with a mismatched completion kind"),
        }
    }

    /// Repeated partial sends until every byte of `data` is written.
    pub async fn write_all(&self, mut data: &[u8]) -> OpResult<()> {
        while !data.is_empty() {
            let n = self.write(data).await?;
            if n == 0 {
                return Err(OpError::ConnectionClosed);
            }
            data = &data[n..];
        }
        Ok(())
    }

    /// Drive `op` to completion, applying this socket's default timeout (if
    /// any) as a weak deadline — partial progress keeps extending it.
    async fn run_timed(&self, op: Op) -> OpResult<CompletionKind> {
        let io = IoFuture::new(op);
        let handle = self.timeout.get().map(|delta| DeadlineHandle::register(delta, true));
        TimedIo { io, handle }.await
    }
}

/// Races an [`IoFuture`] against a weak [`DeadlineHandle`], checked on every
/// poll (including the spurious wake a fired timeout forces) rather than
/// only after the I/O future itself resolves — a deadline that's merely
/// "close" never gets the chance to interrupt an `.await` sitting inside an
/// inner future that never re-evaluates its own exit condition on wake.
struct TimedIo {
    io: IoFuture,
    handle: Option<DeadlineHandle>,
}

impl Future for TimedIo {
    type Output = OpResult<CompletionKind>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(handle) = &this.handle {
            if handle.is_timed_out() {
                return Poll::Ready(Err(OpError::OperationTimeout));
            }
        }
        match Pin::new(&mut this.io).poll(cx) {
            Poll::Ready(result) => {
                if let Some(handle) = &this.handle {
                    handle.touch();
                }
                Poll::Ready(result.map_err(OpError::from))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Accept a connection on a listening `fd`.
pub async fn accept(fd: RawFd) -> OpResult<(RawFd, Option<SocketAddr>)> {
    match IoFuture::new(Op::Accept { fd }).await.map_err(OpError::from)? {
        CompletionKind::Accept { fd, addr } => Ok((fd, addr)),
        _ => unreachable!("Accept op resolved with a mismatched completion kind"),
    }
}

/// Connect a non-blocking `fd` to `addr`.
pub async fn connect(fd: RawFd, addr: SocketAddr) -> OpResult<()> {
    match IoFuture::new(Op::Connect { fd, addr }).await.map_err(OpError::from)? {
        CompletionKind::Connect => Ok(()),
        _ => unreachable!("Connect op resolved with a mismatched completion kind"),
    }
}

/// Send bytes from `file_fd` to `sock_fd` via the backend's `SendFile` op.
/// `len = None` issues a single send and returns however much it moved;
/// `len = Some(n)` loops until `n` bytes are sent or a zero-byte send
/// signals EOF on the source file.
pub async fn send_file(
    file_fd: RawFd,
    sock_fd: RawFd,
    offset: u64,
    len: Option<usize>,
) -> OpResult<usize> {
    match len {
        None => match IoFuture::new(Op::SendFile { file_fd, sock_fd, offset, len: None })
            .await
            .map_err(OpError::from)?
        {
            CompletionKind::SendFile { sent } => Ok(sent),
            _ => unreachable!("SendFile op resolved with a mismatched completion kind"),
        },
        Some(total) => {
            let mut sent_total = 0usize;
            let mut offset = offset;
            while sent_total < total {
                let remaining = total - sent_total;
                let op = Op::SendFile {
                    file_fd,
                    sock_fd,
                    offset,
                    len: Some(remaining),
                };
                match IoFuture::new(op).await.map_err(OpError::from)? {
                    CompletionKind::SendFile { sent } => {
                        if sent == 0 {
                            return Ok(sent_total);
                        }
                        sent_total += sent;
                        offset += sent as u64;
                    }
                    _ => unreachable!("SendFile op resolved with a mismatched completion kind"),
                }
            }
            Ok(sent_total)
        }
    }
}
