//! The raw syscalls shared by every readiness-based backend (epoll, kqueue,
//! poll, select): performing the actual read/write/accept/etc. once a
//! descriptor is believed ready. Kept in one place so the four backend
//! modules differ only in how they discover readiness, not in what they do
//! once they have it.

use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::os::unix::io::RawFd;

use crate::io::{CompletionKind, IoError, Op};

pub(crate) fn sockaddr_from_storage(storage: &libc::sockaddr_storage) -> Option<SocketAddr> {
    unsafe {
        match storage.ss_family as libc::c_int {
            libc::AF_INET => {
                let sin = &*(storage as *const _ as *const libc::sockaddr_in);
                let ip = std::net::Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr));
                Some(SocketAddr::from((ip, u16::from_be(sin.sin_port))))
            }
            libc::AF_INET6 => {
                let sin6 = &*(storage as *const _ as *const libc::sockaddr_in6);
                let ip = std::net::Ipv6Addr::from(sin6.sin6_addr.s6_addr);
                Some(SocketAddr::from((ip, u16::from_be(sin6.sin6_port))))
            }
            _ => None,
        }
    }
}

fn syscall_accept(fd: RawFd) -> io::Result<(RawFd, Option<SocketAddr>)> {
    let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
    let mut len = std::mem::size_of_val(&storage) as libc::socklen_t;
    let new_fd = unsafe { libc::accept(fd, &mut storage as *mut _ as *mut _, &mut len) };
    if new_fd < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok((new_fd, sockaddr_from_storage(&storage)))
}

fn syscall_connect(fd: RawFd, addr: SocketAddr) -> io::Result<()> {
    let (storage, len) = crate::io::addr_to_raw(addr);
    let ret = unsafe { libc::connect(fd, &storage as *const _ as *const libc::sockaddr, len) };
    if ret == 0 {
        return Ok(());
    }
    // EINPROGRESS is surfaced as a real error (not mapped to success) so
    // `would_block` sees it and registers the fd for WRITABLE readiness
    // instead of declaring the connect done before it is.
    Err(io::Error::last_os_error())
}

/// Resolve a `Connect` op once its fd has gone writable: the connect()
/// syscall itself already ran at submit time, so this confirms the outcome
/// rather than reissuing it. `getpeername` succeeds once connected; on
/// `ENOTCONN` the actual failure is recovered via `SO_ERROR`, since
/// `getpeername` alone doesn't carry it.
fn confirm_connect(fd: RawFd) -> io::Result<()> {
    let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
    let mut len = std::mem::size_of_val(&storage) as libc::socklen_t;
    let ret = unsafe { libc::getpeername(fd, &mut storage as *mut _ as *mut _, &mut len) };
    if ret == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() != Some(libc::ENOTCONN) {
        return Err(err);
    }

    let mut sock_err: libc::c_int = 0;
    let mut sock_err_len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
    let ret = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_ERROR,
            &mut sock_err as *mut _ as *mut libc::c_void,
            &mut sock_err_len,
        )
    };
    if ret == 0 && sock_err != 0 {
        Err(io::Error::from_raw_os_error(sock_err))
    } else {
        Err(err)
    }
}

/// Run the syscall behind `op`, assuming its descriptor is believed ready
/// (or that it needs no readiness check at all, e.g. `Fsync`).
pub(crate) fn run_op(op: Op) -> Result<CompletionKind, IoError> {
    match op {
        Op::Accept { fd } => syscall_accept(fd)
            .map(|(new_fd, addr)| CompletionKind::Accept { fd: new_fd, addr })
            .map_err(IoError::Io),
        Op::Connect { fd, addr } => syscall_connect(fd, addr)
            .map(|_| CompletionKind::Connect)
            .map_err(IoError::Io),
        Op::Read { fd, len } => {
            let mut buf = vec![0u8; len];
            let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, len) };
            if n < 0 {
                Err(IoError::Io(io::Error::last_os_error()))
            } else {
                buf.truncate(n as usize);
                Ok(CompletionKind::Read {
                    bytes_read: n as usize,
                    data: buf.into(),
                })
            }
        }
        Op::Write { fd, data } => {
            let n = unsafe { libc::write(fd, data.as_ptr() as *const libc::c_void, data.len()) };
            if n < 0 {
                Err(IoError::Io(io::Error::last_os_error()))
            } else {
                Ok(CompletionKind::Write {
                    bytes_written: n as usize,
                })
            }
        }
        Op::SendFile {
            file_fd,
            sock_fd,
            offset,
            len,
        } => {
            #[cfg(target_os = "linux")]
            {
                let mut off = offset as libc::off_t;
                let count = len.unwrap_or(usize::MAX);
                let n = unsafe { libc::sendfile(sock_fd, file_fd, &mut off, count) };
                if n < 0 {
                    Err(IoError::Io(io::Error::last_os_error()))
                } else {
                    Ok(CompletionKind::SendFile { sent: n as usize })
                }
            }
            #[cfg(not(target_os = "linux"))]
            {
                let mut file = unsafe {
                    <std::fs::File as std::os::unix::io::FromRawFd>::from_raw_fd(file_fd)
                };
                let res = (|| {
                    use std::io::{Seek, SeekFrom};
                    file.seek(SeekFrom::Start(offset))?;
                    let cap = len.unwrap_or(64 * 1024).min(64 * 1024);
                    let mut buf = vec![0u8; cap];
                    let n = file.read(&mut buf)?;
                    let sent =
                        unsafe { libc::write(sock_fd, buf.as_ptr() as *const libc::c_void, n) };
                    if sent < 0 {
                        return Err(io::Error::last_os_error());
                    }
                    Ok(CompletionKind::SendFile {
                        sent: sent as usize,
                    })
                })();
                std::mem::forget(file);
                res.map_err(IoError::Io)
            }
        }
        Op::Fsync { fd } => {
            let ret = unsafe { libc::fsync(fd) };
            if ret == 0 {
                Ok(CompletionKind::Fsync)
            } else {
                Err(IoError::Io(io::Error::last_os_error()))
            }
        }
        Op::Close { fd } => {
            let ret = unsafe { libc::close(fd) };
            if ret == 0 {
                Ok(CompletionKind::Close)
            } else {
                Err(IoError::Io(io::Error::last_os_error()))
            }
        }
        Op::ReadFile { fd, offset, len } => {
            let mut file =
                unsafe { <std::fs::File as std::os::unix::io::FromRawFd>::from_raw_fd(fd) };
            let res = (|| {
                use std::io::{Seek, SeekFrom};
                file.seek(SeekFrom::Start(offset))?;
                let mut buf = vec![0u8; len];
                let n = file.read(&mut buf)?;
                buf.truncate(n);
                Ok(CompletionKind::ReadFile {
                    bytes_read: n,
                    data: buf.into(),
                })
            })();
            std::mem::forget(file);
            res.map_err(IoError::Io)
        }
        Op::WriteFile { fd, offset, data } => {
            let mut file =
                unsafe { <std::fs::File as std::os::unix::io::FromRawFd>::from_raw_fd(fd) };
            let res = (|| {
                use std::io::{Seek, SeekFrom};
                file.seek(SeekFrom::Start(offset))?;
                let n = file.write(&data)?;
                Ok(CompletionKind::WriteFile { bytes_written: n })
            })();
            std::mem::forget(file);
            res.map_err(IoError::Io)
        }
        Op::UdpRecv { fd, buffer } => {
            let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
            let mut slen = std::mem::size_of_val(&storage) as libc::socklen_t;
            let mut buf = buffer.to_vec();
            let n = unsafe {
                libc::recvfrom(
                    fd,
                    buf.as_mut_ptr() as *mut libc::c_void,
                    buf.len(),
                    0,
                    &mut storage as *mut _ as *mut _,
                    &mut slen,
                )
            };
            if n < 0 {
                Err(IoError::Io(io::Error::last_os_error()))
            } else {
                buf.truncate(n as usize);
                Ok(CompletionKind::UdpRecv {
                    bytes_read: n as usize,
                    buffer: buf.into(),
                    addr: sockaddr_from_storage(&storage)
                        .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 0))),
                })
            }
        }
        Op::UdpSend { fd, data, addr } => {
            let (storage, len) = crate::io::addr_to_raw(addr);
            let n = unsafe {
                libc::sendto(
                    fd,
                    data.as_ptr() as *const libc::c_void,
                    data.len(),
                    0,
                    &storage as *const _ as *const libc::sockaddr,
                    len,
                )
            };
            if n < 0 {
                Err(IoError::Io(io::Error::last_os_error()))
            } else {
                Ok(CompletionKind::UdpSend {
                    bytes_written: n as usize,
                    data,
                })
            }
        }
    }
}

/// Resolve `op` once its descriptor is believed ready, the same as
/// [`run_op`] except for `Connect`: a connect's readiness means the
/// kernel-side attempt has settled, not that it's safe to call `connect()`
/// again, so this confirms the outcome instead of reissuing the syscall.
pub(crate) fn confirm_op(op: Op) -> Result<CompletionKind, IoError> {
    match op {
        Op::Connect { fd, .. } => confirm_connect(fd)
            .map(|_| CompletionKind::Connect)
            .map_err(IoError::Io),
        other => run_op(other),
    }
}

/// Whether `result` represents "would block" rather than a real failure,
/// meaning the caller should register for readiness and retry later instead
/// of surfacing the error.
pub(crate) fn would_block(result: &Result<CompletionKind, IoError>) -> bool {
    matches!(
        result,
        Err(IoError::Io(e))
            if e.kind() == io::ErrorKind::WouldBlock || e.raw_os_error() == Some(libc::EINPROGRESS)
    )
}
