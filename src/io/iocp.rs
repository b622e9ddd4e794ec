//! A Windows I/O Completion Port backend — the one true proactor among
//! these backends.
//!
//! Unlike the readiness backends, `submit` here starts the operation
//! itself (`AcceptEx`/`ConnectEx`/`WSARecv`/`WSASend`/`ReadFile`/...)
//! against a pinned `OVERLAPPED` right away; the kernel delivers the
//! finished byte count through the completion port rather than a "you may
//! now try" readiness event. `run`/`poll_complete` just drain
//! `GetQueuedCompletionStatus`.
//!
//! `AcceptEx`/`ConnectEx` aren't ordinary Winsock entry points — they're
//! Mswsock extension functions only reachable by asking the socket for
//! their address via `WSAIoctl(SIO_GET_EXTENSION_FUNCTION_POINTER)`, so
//! this module resolves and caches both the first time they're needed.

use std::cell::UnsafeCell;
use std::collections::HashMap;
use std::ffi::c_void;
use std::io;
use std::mem::size_of;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::os::windows::io::RawHandle;
use std::ptr;
use std::task::{Context, Poll as TaskPoll};
use std::time::Duration;

use windows_sys::Win32::Foundation::{
    CloseHandle, BOOL, ERROR_IO_PENDING, ERROR_OPERATION_ABORTED, HANDLE, INVALID_HANDLE_VALUE,
};
use windows_sys::Win32::Networking::WinSock::{
    bind, getsockname, socket, WSAIoctl, AF_INET, AF_INET6, INVALID_SOCKET, IN_ADDR, IPPROTO_TCP,
    SIO_GET_EXTENSION_FUNCTION_POINTER, SOCKADDR, SOCKADDR_IN, SOCKADDR_IN6, SOCKADDR_STORAGE,
    SOCKET, SOCKET_ERROR, SOCK_STREAM, SOL_SOCKET, WSABUF, WSAID_ACCEPTEX, WSAID_CONNECTEX,
    WSARecv, WSARecvFrom, WSASend, WSASendTo,
};
use windows_sys::Win32::Storage::FileSystem::{FlushFileBuffers, ReadFile, WriteFile};
use windows_sys::Win32::System::IO::{CreateIoCompletionPort, GetQueuedCompletionStatus, OVERLAPPED};

use crate::io::{Completion, CompletionKind, IoBackend, IoError, IoToken, Op};

const SO_UPDATE_ACCEPT_CONTEXT: i32 = 0x700B;
const SO_UPDATE_CONNECT_CONTEXT: i32 = 0x7010;
/// `AcceptEx` wants each embedded sockaddr buffer at least
/// `sizeof(SOCKADDR_STORAGE) + 16` bytes; we give it exactly that for both
/// the local and remote halves.
const ACCEPTEX_ADDR_LEN: u32 = (size_of::<SOCKADDR_STORAGE>() + 16) as u32;

type AcceptExFn = unsafe extern "system" fn(
    SOCKET,
    SOCKET,
    *mut c_void,
    u32,
    u32,
    u32,
    *mut u32,
    *mut OVERLAPPED,
) -> BOOL;

type ConnectExFn = unsafe extern "system" fn(
    SOCKET,
    *const SOCKADDR,
    i32,
    *const c_void,
    u32,
    *mut u32,
    *mut OVERLAPPED,
) -> BOOL;

/// Per-operation auxiliary state that only some `Op` variants need: output
/// buffers the kernel writes into, and (for `Accept`/`UdpRecv`) the room to
/// write a peer address back into.
enum Aux {
    Accept {
        accept_socket: SOCKET,
        addr_buf: Vec<u8>,
    },
    Connect {
        socket: SOCKET,
    },
    Read {
        buf: Vec<u8>,
    },
    Write,
    ReadFile {
        buf: Vec<u8>,
    },
    WriteFile,
    UdpRecv {
        buf: Vec<u8>,
        from: SOCKADDR_STORAGE,
        from_len: i32,
    },
    UdpSend,
}

/// State tracked per submitted operation, pinned behind a `Box` so its
/// address is stable for the lifetime of the kernel operation — the
/// `OVERLAPPED` pointer the kernel hands back on completion is this box's
/// address (`overlapped` is declared first and the struct is `repr(C)` so
/// the two addresses coincide).
#[repr(C)]
struct Inflight {
    overlapped: OVERLAPPED,
    io_token: IoToken,
    op: Op,
    aux: Aux,
}

/// An IOCP-based [`IoBackend`].
pub struct IocpBackend {
    port: HANDLE,
    /// Handles registered with the port so far, to avoid re-registering the
    /// same fd twice (`CreateIoCompletionPort` errors on that).
    registered: UnsafeCell<HashMap<RawHandle, ()>>,
    inflight_count: UnsafeCell<usize>,
    accept_ex: UnsafeCell<Option<AcceptExFn>>,
    connect_ex: UnsafeCell<Option<ConnectExFn>>,
    /// Completions resolved inline at submit time: `Fsync`/`Close`/
    /// `SendFile` have no overlapped form worth pursuing here, so they run
    /// synchronously and never touch the completion port.
    ready: UnsafeCell<Vec<Completion>>,
}

unsafe impl Send for IocpBackend {}
unsafe impl Sync for IocpBackend {}

impl IocpBackend {
    pub fn new() -> Self {
        let port = unsafe { CreateIoCompletionPort(INVALID_HANDLE_VALUE, 0, 0, 0) };
        if port == 0 {
            panic!(
                "failed to create I/O completion port: {}",
                io::Error::last_os_error()
            );
        }
        Self {
            port,
            registered: UnsafeCell::new(HashMap::new()),
            inflight_count: UnsafeCell::new(0),
            accept_ex: UnsafeCell::new(None),
            connect_ex: UnsafeCell::new(None),
            ready: UnsafeCell::new(Vec::new()),
        }
    }

    fn ensure_registered(&self, handle: RawHandle) {
        let registered = unsafe { &mut *self.registered.get() };
        if registered.contains_key(&handle) {
            return;
        }
        let ret = unsafe { CreateIoCompletionPort(handle as HANDLE, self.port, 0, 0) };
        if ret != 0 {
            registered.insert(handle, ());
        }
    }

    fn push_ready(&self, token: IoToken, result: Result<CompletionKind, IoError>) {
        unsafe { &mut *self.ready.get() }.push(Completion { token, result });
    }

    fn resolve_accept_ex(&self, socket: SOCKET) -> io::Result<AcceptExFn> {
        if let Some(f) = unsafe { *self.accept_ex.get() } {
            return Ok(f);
        }
        let f: AcceptExFn = unsafe { resolve_extension_fn(socket, WSAID_ACCEPTEX)? };
        unsafe { *self.accept_ex.get() = Some(f) };
        Ok(f)
    }

    fn resolve_connect_ex(&self, socket: SOCKET) -> io::Result<ConnectExFn> {
        if let Some(f) = unsafe { *self.connect_ex.get() } {
            return Ok(f);
        }
        let f: ConnectExFn = unsafe { resolve_extension_fn(socket, WSAID_CONNECTEX)? };
        unsafe { *self.connect_ex.get() = Some(f) };
        Ok(f)
    }

    /// Start `op` against the kernel, pinning its state in an `Inflight`
    /// box the kernel's completion packet will hand back. `Ok` means the
    /// operation is either already satisfied or genuinely pending — either
    /// way a completion packet is on its way and `inflight_count` has been
    /// bumped. `Err` means it never reached the kernel at all.
    fn start(&self, io_token: IoToken, op: Op) -> Result<(), (IoError, IoToken)> {
        let handle = op.as_raw_fd();
        self.ensure_registered(handle);

        let aux = match build_aux(&op) {
            Ok(aux) => aux,
            Err(err) => return Err((IoError::Io(err), io_token)),
        };

        let mut inflight = Box::new(Inflight {
            overlapped: unsafe { std::mem::zeroed() },
            io_token,
            op: op.clone(),
            aux,
        });

        let issued = unsafe { self.issue(&op, &mut inflight) };
        match issued {
            Ok(()) => {
                *unsafe { &mut *self.inflight_count.get() } += 1;
                // The kernel now owns this allocation; it comes back to us
                // as the `lpOverlapped` pointer handed to
                // `GetQueuedCompletionStatus`.
                Box::into_raw(inflight);
                Ok(())
            }
            Err(err) => Err((IoError::Io(err), inflight.io_token)),
        }
    }

    /// Issue the overlapped Win32 call for `op` against `inflight`'s
    /// pinned `OVERLAPPED`/auxiliary buffers. `Ok` covers both immediate
    /// completion and `ERROR_IO_PENDING` — both still post a completion
    /// packet unless the handle opted out of that via
    /// `SetFileCompletionNotificationModes`, which this backend never does.
    unsafe fn issue(&self, op: &Op, inflight: &mut Inflight) -> io::Result<()> {
        let overlapped = &mut inflight.overlapped as *mut OVERLAPPED;
        match (op, &mut inflight.aux) {
            (Op::Accept { fd }, Aux::Accept { accept_socket, addr_buf }) => {
                let accept_ex = self.resolve_accept_ex(*fd as usize)?;
                let mut bytes_received: u32 = 0;
                let ok = accept_ex(
                    *fd as usize,
                    *accept_socket,
                    addr_buf.as_mut_ptr() as *mut c_void,
                    0,
                    ACCEPTEX_ADDR_LEN,
                    ACCEPTEX_ADDR_LEN,
                    &mut bytes_received,
                    overlapped,
                );
                check_overlapped_result(ok)
            }
            (Op::Connect { addr, .. }, Aux::Connect { socket }) => {
                bind_any(*socket, addr)?;
                let connect_ex = self.resolve_connect_ex(*socket)?;
                let (raw, raw_len) = sockaddr_from(*addr);
                let mut bytes_sent: u32 = 0;
                let ok = connect_ex(
                    *socket,
                    &raw as *const _ as *const SOCKADDR,
                    raw_len,
                    ptr::null(),
                    0,
                    &mut bytes_sent,
                    overlapped,
                );
                check_overlapped_result(ok)
            }
            (Op::Read { fd, .. }, Aux::Read { buf }) => {
                let mut wsabuf = WSABUF {
                    len: buf.len() as u32,
                    buf: buf.as_mut_ptr() as *mut u8,
                };
                let mut bytes_recvd: u32 = 0;
                let mut flags: u32 = 0;
                let ret = WSARecv(
                    *fd as usize,
                    &mut wsabuf,
                    1,
                    &mut bytes_recvd,
                    &mut flags,
                    overlapped,
                    None,
                );
                check_wsa_result(ret)
            }
            (Op::Write { fd, data }, Aux::Write) => {
                let mut wsabuf = WSABUF {
                    len: data.len() as u32,
                    buf: data.as_ptr() as *mut u8,
                };
                let mut bytes_sent: u32 = 0;
                let ret = WSASend(*fd as usize, &mut wsabuf, 1, &mut bytes_sent, 0, overlapped, None);
                check_wsa_result(ret)
            }
            (Op::ReadFile { fd, offset, .. }, Aux::ReadFile { buf }) => {
                set_overlapped_offset(&mut inflight.overlapped, *offset);
                let mut bytes_read: u32 = 0;
                let ok = ReadFile(
                    *fd as HANDLE,
                    buf.as_mut_ptr() as *mut c_void,
                    buf.len() as u32,
                    &mut bytes_read,
                    overlapped,
                );
                check_overlapped_result(ok)
            }
            (Op::WriteFile { fd, offset, data }, Aux::WriteFile) => {
                set_overlapped_offset(&mut inflight.overlapped, *offset);
                let mut bytes_written: u32 = 0;
                let ok = WriteFile(
                    *fd as HANDLE,
                    data.as_ptr() as *const c_void,
                    data.len() as u32,
                    &mut bytes_written,
                    overlapped,
                );
                check_overlapped_result(ok)
            }
            (Op::UdpRecv { fd, .. }, Aux::UdpRecv { buf, from, from_len }) => {
                let mut wsabuf = WSABUF {
                    len: buf.len() as u32,
                    buf: buf.as_mut_ptr() as *mut u8,
                };
                let mut bytes_recvd: u32 = 0;
                let mut flags: u32 = 0;
                *from_len = size_of::<SOCKADDR_STORAGE>() as i32;
                let ret = WSARecvFrom(
                    *fd as usize,
                    &mut wsabuf,
                    1,
                    &mut bytes_recvd,
                    &mut flags,
                    from as *mut _ as *mut SOCKADDR,
                    from_len,
                    overlapped,
                    None,
                );
                check_wsa_result(ret)
            }
            (Op::UdpSend { fd, data, addr }, Aux::UdpSend) => {
                let (raw, raw_len) = sockaddr_from(*addr);
                let mut wsabuf = WSABUF {
                    len: data.len() as u32,
                    buf: data.as_ptr() as *mut u8,
                };
                let mut bytes_sent: u32 = 0;
                let ret = WSASendTo(
                    *fd as usize,
                    &mut wsabuf,
                    1,
                    &mut bytes_sent,
                    0,
                    &raw as *const _ as *const SOCKADDR,
                    raw_len,
                    overlapped,
                    None,
                );
                check_wsa_result(ret)
            }
            _ => unreachable!("build_aux and issue must agree on op shape"),
        }
    }

    fn drain(&self, timeout: Option<Duration>) -> Vec<Completion> {
        let timeout_ms = timeout.map_or(u32::MAX, |d| d.as_millis().min(u32::MAX as u128) as u32);

        let mut bytes_transferred: u32 = 0;
        let mut completion_key: usize = 0;
        let mut overlapped_ptr: *mut OVERLAPPED = std::ptr::null_mut();

        let ok = unsafe {
            GetQueuedCompletionStatus(
                self.port,
                &mut bytes_transferred,
                &mut completion_key,
                &mut overlapped_ptr,
                timeout_ms,
            )
        };

        if overlapped_ptr.is_null() {
            return Vec::new();
        }

        let inflight = unsafe { Box::from_raw(overlapped_ptr as *mut Inflight) };
        *unsafe { &mut *self.inflight_count.get() } -= 1;

        let result = if ok == 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(ERROR_OPERATION_ABORTED as i32) {
                tracing::debug!(token = ?inflight.io_token, "overlapped operation aborted");
            }
            Err(IoError::Io(err))
        } else {
            finish(inflight.op.clone(), inflight.aux, bytes_transferred)
        };

        vec![Completion {
            token: inflight.io_token,
            result,
        }]
    }

    fn send_file_sync(
        &self,
        file_fd: RawHandle,
        sock_fd: RawHandle,
        offset: u64,
        len: Option<usize>,
    ) -> Result<CompletionKind, IoError> {
        use std::io::{Read, Seek, SeekFrom};
        let mut file = unsafe {
            <std::fs::File as std::os::windows::io::FromRawHandle>::from_raw_handle(file_fd)
        };
        let res = (|| -> io::Result<usize> {
            file.seek(SeekFrom::Start(offset))?;
            let cap = len.unwrap_or(64 * 1024).min(64 * 1024);
            let mut buf = vec![0u8; cap];
            let n = file.read(&mut buf)?;
            let mut wsabuf = WSABUF {
                len: n as u32,
                buf: buf.as_mut_ptr(),
            };
            let mut bytes_sent: u32 = 0;
            let ret = unsafe {
                WSASend(
                    sock_fd as usize,
                    &mut wsabuf,
                    1,
                    &mut bytes_sent,
                    0,
                    ptr::null_mut(),
                    None,
                )
            };
            if ret == SOCKET_ERROR {
                return Err(io::Error::last_os_error());
            }
            Ok(bytes_sent as usize)
        })();
        std::mem::forget(file);
        res.map(|sent| CompletionKind::SendFile { sent })
            .map_err(IoError::Io)
    }
}

/// Build the auxiliary buffers/sockets `issue` needs for `op`, or `None`
/// for ops resolved synchronously in `submit` before reaching here.
fn build_aux(op: &Op) -> io::Result<Aux> {
    match op {
        Op::Accept { fd } => {
            let family = socket_family(*fd as usize)?;
            let accept_socket = unsafe { socket(family, SOCK_STREAM, IPPROTO_TCP as i32) };
            if accept_socket == INVALID_SOCKET {
                return Err(io::Error::last_os_error());
            }
            Ok(Aux::Accept {
                accept_socket,
                addr_buf: vec![0u8; (ACCEPTEX_ADDR_LEN * 2) as usize],
            })
        }
        Op::Connect { fd, .. } => Ok(Aux::Connect { socket: *fd as usize }),
        Op::Read { len, .. } => Ok(Aux::Read { buf: vec![0u8; *len] }),
        Op::Write { .. } => Ok(Aux::Write),
        Op::ReadFile { len, .. } => Ok(Aux::ReadFile { buf: vec![0u8; *len] }),
        Op::WriteFile { .. } => Ok(Aux::WriteFile),
        Op::UdpRecv { buffer, .. } => Ok(Aux::UdpRecv {
            buf: vec![0u8; buffer.len().max(1)],
            from: unsafe { std::mem::zeroed() },
            from_len: 0,
        }),
        Op::UdpSend { .. } => Ok(Aux::UdpSend),
        Op::Fsync { .. } | Op::Close { .. } | Op::SendFile { .. } => {
            unreachable!("resolved synchronously before build_aux")
        }
    }
}

/// Turn a completed overlapped op into its `CompletionKind`, consuming the
/// auxiliary buffers it ran against.
fn finish(op: Op, aux: Aux, bytes_transferred: u32) -> Result<CompletionKind, IoError> {
    match (op, aux) {
        (Op::Accept { fd: listen_fd }, Aux::Accept { accept_socket, addr_buf }) => {
            unsafe {
                let listen_fd = listen_fd as usize;
                windows_sys::Win32::Networking::WinSock::setsockopt(
                    accept_socket,
                    SOL_SOCKET,
                    SO_UPDATE_ACCEPT_CONTEXT,
                    &listen_fd as *const _ as *const u8,
                    size_of::<usize>() as i32,
                );
            }
            let remote = &addr_buf[ACCEPTEX_ADDR_LEN as usize..];
            let addr = sockaddr_bytes_to_socketaddr(remote.as_ptr());
            Ok(CompletionKind::Accept {
                fd: accept_socket as RawHandle,
                addr,
            })
        }
        (Op::Connect { .. }, Aux::Connect { socket }) => {
            unsafe {
                windows_sys::Win32::Networking::WinSock::setsockopt(
                    socket,
                    SOL_SOCKET,
                    SO_UPDATE_CONNECT_CONTEXT,
                    ptr::null(),
                    0,
                );
            }
            Ok(CompletionKind::Connect)
        }
        (Op::Read { .. }, Aux::Read { mut buf }) => {
            buf.truncate(bytes_transferred as usize);
            Ok(CompletionKind::Read {
                bytes_read: bytes_transferred as usize,
                data: buf.into(),
            })
        }
        (Op::Write { .. }, Aux::Write) => Ok(CompletionKind::Write {
            bytes_written: bytes_transferred as usize,
        }),
        (Op::ReadFile { .. }, Aux::ReadFile { mut buf }) => {
            buf.truncate(bytes_transferred as usize);
            Ok(CompletionKind::ReadFile {
                bytes_read: bytes_transferred as usize,
                data: buf.into(),
            })
        }
        (Op::WriteFile { .. }, Aux::WriteFile) => Ok(CompletionKind::WriteFile {
            bytes_written: bytes_transferred as usize,
        }),
        (Op::UdpRecv { .. }, Aux::UdpRecv { mut buf, from, .. }) => {
            buf.truncate(bytes_transferred as usize);
            let addr = sockaddr_bytes_to_socketaddr(&from as *const _ as *const u8)
                .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 0)));
            Ok(CompletionKind::UdpRecv {
                bytes_read: bytes_transferred as usize,
                buffer: buf.into(),
                addr,
            })
        }
        (Op::UdpSend { data, .. }, Aux::UdpSend) => Ok(CompletionKind::UdpSend {
            bytes_written: bytes_transferred as usize,
            data,
        }),
        _ => unreachable!("finish called with mismatched op/aux pair"),
    }
}

fn socket_family(socket: SOCKET) -> io::Result<i32> {
    let mut storage: SOCKADDR_STORAGE = unsafe { std::mem::zeroed() };
    let mut len = size_of::<SOCKADDR_STORAGE>() as i32;
    let ret = unsafe { getsockname(socket, &mut storage as *mut _ as *mut SOCKADDR, &mut len) };
    if ret == SOCKET_ERROR {
        return Err(io::Error::last_os_error());
    }
    Ok(storage.ss_family as i32)
}

fn bind_any(socket: SOCKET, addr: &SocketAddr) -> io::Result<()> {
    let (raw, raw_len) = match addr {
        SocketAddr::V4(_) => sockaddr_from(SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0))),
        SocketAddr::V6(_) => sockaddr_from(SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, 0, 0, 0))),
    };
    let ret = unsafe { bind(socket, &raw as *const _ as *const SOCKADDR, raw_len) };
    if ret == SOCKET_ERROR {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Convert a [`SocketAddr`] into the raw `sockaddr_storage` form
/// `ConnectEx`/`bind`/`WSASendTo` expect.
fn sockaddr_from(addr: SocketAddr) -> (SOCKADDR_STORAGE, i32) {
    let mut storage: SOCKADDR_STORAGE = unsafe { std::mem::zeroed() };
    let len = match addr {
        SocketAddr::V4(v4) => {
            let sin = SOCKADDR_IN {
                sin_family: AF_INET,
                sin_port: v4.port().to_be(),
                sin_addr: IN_ADDR {
                    S_un: unsafe { std::mem::transmute(u32::from_ne_bytes(v4.ip().octets())) },
                },
                sin_zero: [0; 8],
            };
            unsafe { ptr::write(&mut storage as *mut _ as *mut SOCKADDR_IN, sin) };
            size_of::<SOCKADDR_IN>()
        }
        SocketAddr::V6(v6) => {
            let sin6 = SOCKADDR_IN6 {
                sin6_family: AF_INET6,
                sin6_port: v6.port().to_be(),
                sin6_flowinfo: v6.flowinfo(),
                sin6_addr: unsafe { std::mem::transmute(v6.ip().octets()) },
                Anonymous: unsafe { std::mem::transmute(v6.scope_id()) },
            };
            unsafe { ptr::write(&mut storage as *mut _ as *mut SOCKADDR_IN6, sin6) };
            size_of::<SOCKADDR_IN6>()
        }
    };
    (storage, len as i32)
}

/// Read a sockaddr back out of raw bytes written by `AcceptEx`/
/// `WSARecvFrom`, without the extra Mswsock extension call
/// (`GetAcceptExSockaddrs`) would need: the family tag is the first `u16`
/// of either `SOCKADDR_IN`/`SOCKADDR_IN6`, so it's read directly.
fn sockaddr_bytes_to_socketaddr(ptr: *const u8) -> Option<SocketAddr> {
    unsafe {
        let family = *(ptr as *const u16);
        match family as i32 {
            AF_INET => {
                let sin = &*(ptr as *const SOCKADDR_IN);
                let octets = u32::from_ne_bytes(std::mem::transmute(sin.sin_addr.S_un));
                Some(SocketAddr::V4(SocketAddrV4::new(
                    Ipv4Addr::from(octets),
                    u16::from_be(sin.sin_port),
                )))
            }
            AF_INET6 => {
                let sin6 = &*(ptr as *const SOCKADDR_IN6);
                let octets: [u8; 16] = std::mem::transmute(sin6.sin6_addr);
                Some(SocketAddr::V6(SocketAddrV6::new(
                    Ipv6Addr::from(octets),
                    u16::from_be(sin6.sin6_port),
                    sin6.sin6_flowinfo,
                    0,
                )))
            }
            _ => None,
        }
    }
}

fn set_overlapped_offset(overlapped: &mut OVERLAPPED, offset: u64) {
    overlapped.Anonymous.Anonymous.Offset = offset as u32;
    overlapped.Anonymous.Anonymous.OffsetHigh = (offset >> 32) as u32;
}

fn check_overlapped_result(ok: BOOL) -> io::Result<()> {
    if ok != 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(ERROR_IO_PENDING as i32) {
        Ok(())
    } else {
        Err(err)
    }
}

fn check_wsa_result(ret: i32) -> io::Result<()> {
    if ret == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(ERROR_IO_PENDING as i32) {
        Ok(())
    } else {
        Err(err)
    }
}

unsafe fn resolve_extension_fn<F: Copy>(socket: SOCKET, guid: windows_sys::core::GUID) -> io::Result<F> {
    assert_eq!(size_of::<F>(), size_of::<usize>());
    let mut fn_ptr: usize = 0;
    let mut bytes_returned: u32 = 0;
    let ret = WSAIoctl(
        socket,
        SIO_GET_EXTENSION_FUNCTION_POINTER,
        &guid as *const _ as *const c_void,
        size_of::<windows_sys::core::GUID>() as u32,
        &mut fn_ptr as *mut _ as *mut c_void,
        size_of::<usize>() as u32,
        &mut bytes_returned,
        ptr::null_mut(),
        None,
    );
    if ret == SOCKET_ERROR {
        return Err(io::Error::last_os_error());
    }
    Ok(std::mem::transmute_copy(&fn_ptr))
}

impl Default for IocpBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl IoBackend for IocpBackend {
    fn submit(&self, op: Op) -> IoToken {
        let io_token = IoToken::new();

        match &op {
            Op::Fsync { fd } => {
                let ret = unsafe { FlushFileBuffers(*fd as HANDLE) };
                let result = if ret != 0 {
                    Ok(CompletionKind::Fsync)
                } else {
                    Err(IoError::Io(io::Error::last_os_error()))
                };
                self.push_ready(io_token, result);
                return io_token;
            }
            Op::Close { fd } => {
                let ret = unsafe { CloseHandle(*fd as HANDLE) };
                let result = if ret != 0 {
                    Ok(CompletionKind::Close)
                } else {
                    Err(IoError::Io(io::Error::last_os_error()))
                };
                self.push_ready(io_token, result);
                return io_token;
            }
            Op::SendFile { file_fd, sock_fd, offset, len } => {
                let result = self.send_file_sync(*file_fd, *sock_fd, *offset, *len);
                self.push_ready(io_token, result);
                return io_token;
            }
            _ => {}
        }

        match self.start(io_token, op) {
            Ok(()) => io_token,
            Err((err, token)) => {
                tracing::warn!(%err, "failed to start overlapped operation");
                self.push_ready(token, Err(err));
                token
            }
        }
    }

    fn poll_complete(&self, _cx: &mut Context<'_>) -> TaskPoll<Vec<Completion>> {
        let completions = self.run(Some(Duration::ZERO));
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
        unsafe { *self.inflight_count.get() }
    }
}

impl Drop for IocpBackend {
    fn drop(&mut self) {
        unsafe {
            CloseHandle(self.port);
        }
    }
}
