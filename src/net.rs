//! Async networking primitives built on top of [`crate::socket::Socket`].

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, UdpSocket};
use std::os::unix::io::{AsRawFd, FromRawFd, IntoRawFd, RawFd};

use crate::buffer::Buffer;
use crate::error::OpResult;
use crate::io::future::IoFuture;
use crate::io::{CompletionKind, Op};
use crate::socket::{self, Socket};

/// An asynchronous TCP listener.
pub struct AsyncTcpListener {
    inner: TcpListener,
}

impl AsyncTcpListener {
    pub fn bind<A: Into<SocketAddr>>(addr: A) -> io::Result<Self> {
        let listener = TcpListener::bind(addr.into())?;
        listener.set_nonblocking(true)?;
        Ok(Self { inner: listener })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    /// Accept a connection, handing back a socket already wrapped for async
    /// read/write.
    pub async fn accept(&self) -> OpResult<(AsyncTcpStream, Option<SocketAddr>)> {
        let (fd, addr) = socket::accept(self.inner.as_raw_fd()).await?;
        let stream = unsafe { TcpStream::from_raw_fd(fd) };
        Ok((AsyncTcpStream::from(stream), addr))
    }
}

impl AsRawFd for AsyncTcpListener {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }
}

/// An asynchronous TCP stream: buffered reads (`read`/`read_all`/
/// `read_line`) and writes (`write`/`write_all`) over a non-blocking socket.
pub struct AsyncTcpStream {
    socket: Socket<TcpStream>,
}

impl AsyncTcpStream {
    /// Open a non-blocking connection to `addr`.
    pub async fn connect(addr: SocketAddr) -> OpResult<Self> {
        let fd = new_nonblocking_tcp_socket(addr)?;
        if let Err(e) = socket::connect(fd, addr).await {
            unsafe { libc::close(fd) };
            return Err(e);
        }
        let stream = unsafe { TcpStream::from_raw_fd(fd) };
        Ok(Self::from(stream))
    }

    pub fn set_timeout(&self, timeout: Option<std::time::Duration>) {
        self.socket.set_timeout(timeout);
    }

    pub async fn read(&self, n: usize) -> OpResult<Buffer> {
        self.socket.read(n).await
    }

    pub async fn read_all(&self, n: usize) -> OpResult<Buffer> {
        self.socket.read_all(n).await
    }

    pub async fn read_line(&self, n: usize) -> OpResult<Buffer> {
        self.socket.read_line(n).await
    }

    pub async fn write(&self, buf: &[u8]) -> OpResult<usize> {
        self.socket.write(buf).await
    }

    pub async fn write_all(&self, buf: &[u8]) -> OpResult<()> {
        self.socket.write_all(buf).await
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.get_ref().local_addr()
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.socket.get_ref().peer_addr()
    }
}

impl From<TcpStream> for AsyncTcpStream {
    fn from(stream: TcpStream) -> Self {
        stream.set_nonblocking(true).ok();
        Self {
            socket: Socket::new(stream),
        }
    }
}

impl AsRawFd for AsyncTcpStream {
    fn as_raw_fd(&self) -> RawFd {
        self.socket.get_ref().as_raw_fd()
    }
}

impl IntoRawFd for AsyncTcpStream {
    fn into_raw_fd(self) -> RawFd {
        self.socket.into_inner().into_raw_fd()
    }
}

/// Build a non-blocking TCP socket of the right address family, unconnected.
fn new_nonblocking_tcp_socket(addr: SocketAddr) -> io::Result<RawFd> {
    let domain = match addr {
        SocketAddr::V4(_) => libc::AF_INET,
        SocketAddr::V6(_) => libc::AF_INET6,
    };
    let fd = unsafe { libc::socket(domain, libc::SOCK_STREAM | libc::SOCK_NONBLOCK, 0) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(fd)
}

/// An asynchronous UDP socket. Datagram I/O doesn't need the stream
/// buffering `Socket<T>` provides, so it talks to the backend directly.
pub struct AsyncUdpSocket {
    inner: UdpSocket,
}

impl AsyncUdpSocket {
    pub fn bind<A: Into<SocketAddr>>(addr: A) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr.into())?;
        socket.set_nonblocking(true)?;
        Ok(Self { inner: socket })
    }

    pub async fn send_to<A: Into<SocketAddr>>(&self, buf: &[u8], target: A) -> OpResult<usize> {
        let mut buffer = Buffer::new_zeroed(0);
        buffer.copy_from_slice(buf);
        let op = Op::UdpSend {
            fd: self.inner.as_raw_fd(),
            data: buffer,
            addr: target.into(),
        };
        match IoFuture::new(op).await.map_err(crate::error::OpError::from)? {
            CompletionKind::UdpSend { bytes_written, .. } => Ok(bytes_written),
            _ => unreachable!("UdpSend op resolved with a mismatched completion kind"),
        }
    }

    pub async fn recv_from(&self, buf: &mut [u8]) -> OpResult<(usize, SocketAddr)> {
        let recv_buffer = Buffer::new_zeroed(buf.len());
        let op = Op::UdpRecv {
            fd: self.inner.as_raw_fd(),
            buffer: recv_buffer,
        };
        match IoFuture::new(op).await.map_err(crate::error::OpError::from)? {
            CompletionKind::UdpRecv {
                bytes_read,
                buffer,
                addr,
            } => {
                let n = bytes_read.min(buf.len());
                buf[..n].copy_from_slice(&buffer[..n]);
                Ok((bytes_read, addr))
            }
            _ => unreachable!("UdpRecv op resolved with a mismatched completion kind"),
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}

impl AsRawFd for AsyncUdpSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }
}

impl IntoRawFd for AsyncUdpSocket {
    fn into_raw_fd(self) -> RawFd {
        self.inner.into_raw_fd()
    }
}
