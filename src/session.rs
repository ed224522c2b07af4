//! iSCSI session connection management
//!
//! A [`Session`] owns one TCP connection to one target portal. The
//! connect path tunes the socket before dialing: TCP_NODELAY is
//! mandatory (login and command PDUs are small and latency-sensitive),
//! while the optional window-size override is best effort.

use crate::deadline::Deadline;
use crate::error::{TransportError, TransportResult};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpStream};

/// Default seconds allowed for the connect phase
pub const DEFAULT_LOGIN_TIMEOUT: u64 = 15;

/// Digest type for header/data segments
///
/// Accepted by `send_pdu`/`recv_pdu` for parity with login negotiation.
/// Digest insertion and verification are a separate capability layered
/// on top of the transport and are not performed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigestType {
    #[default]
    None,
    Crc32c,
}

/// One TCP connection to one iSCSI target portal
///
/// The socket handle is either absent (closed) or holds exactly one live
/// connection; [`Session::disconnect`] is idempotent. A session is not
/// internally synchronized: `&mut self` receivers serialize operations
/// per session, and deadlines are per-operation, so sessions on
/// different threads do not interfere.
#[derive(Debug)]
pub struct Session {
    ip_address: [u8; 4],
    ip_length: usize,
    port: u16,
    login_timeout: u64,
    tcp_window_size: u32,
    stream: Option<TcpStream>,
}

impl Session {
    /// Create a disconnected session for the given portal.
    ///
    /// `ip_address` holds up to 4 IPv4 address bytes; a shorter slice is
    /// zero-extended, excess bytes are ignored.
    pub fn new(ip_address: &[u8], port: u16) -> Self {
        let ip_length = ip_address.len().min(4);
        let mut address = [0u8; 4];
        address[..ip_length].copy_from_slice(&ip_address[..ip_length]);
        Session {
            ip_address: address,
            ip_length,
            port,
            login_timeout: DEFAULT_LOGIN_TIMEOUT,
            tcp_window_size: 0,
            stream: None,
        }
    }

    /// Seconds allowed for the connect phase; `0` disables the deadline
    pub fn set_login_timeout(&mut self, seconds: u64) {
        self.login_timeout = seconds;
    }

    /// Request a TCP receive/send window override, in bytes.
    /// `0` leaves the kernel defaults in place.
    pub fn set_tcp_window_size(&mut self, bytes: u32) {
        self.tcp_window_size = bytes;
    }

    /// The address bytes supplied by the caller
    pub fn address_bytes(&self) -> &[u8] {
        &self.ip_address[..self.ip_length]
    }

    /// Target portal address
    pub fn peer_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::from(self.ip_address), self.port)
    }

    /// Whether the socket handle is open
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub(crate) fn stream_mut(&mut self) -> TransportResult<&mut TcpStream> {
        self.stream.as_mut().ok_or(TransportError::NotConnected)
    }

    /// Establish the TCP connection to the target portal.
    ///
    /// The whole phase runs under the login timeout. TCP_NODELAY failure
    /// is fatal; window-size override failure is logged and ignored. On
    /// any error the socket is closed and the handle remains absent.
    pub fn connect(&mut self) -> TransportResult<()> {
        let deadline = Deadline::after_secs(self.login_timeout);

        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))
            .map_err(TransportError::Resource)?;

        socket.set_nodelay(true).map_err(|e| {
            log::error!("cannot set TCP_NODELAY option on socket: {}", e);
            TransportError::Resource(e)
        })?;

        if self.tcp_window_size > 0 {
            self.set_window_sizes(&socket);
        }

        let addr = SocketAddr::from(self.peer_addr());
        log::debug!("connecting to {}", addr);
        let connected = match deadline.budget()? {
            Some(timeout) => socket.connect_timeout(&addr.into(), timeout),
            None => socket.connect(&addr.into()),
        };
        match connected {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::TimedOut || e.kind() == io::ErrorKind::WouldBlock => {
                log::debug!("connect to {} timed out", addr);
                return Err(TransportError::Timeout);
            }
            Err(e) => {
                log::error!("cannot make connection to {}: {}", addr, e);
                return Err(TransportError::Socket(e));
            }
        }

        let stream: TcpStream = socket.into();
        if log::log_enabled!(log::Level::Debug) {
            if let Ok(local) = stream.local_addr() {
                log::debug!("connected local port {} to {}", local.port(), addr);
            }
        }
        self.stream = Some(stream);
        Ok(())
    }

    /// Best-effort SO_RCVBUF/SO_SNDBUF override, with read-back of what
    /// the kernel actually granted
    fn set_window_sizes(&self, socket: &Socket) {
        let window = self.tcp_window_size as usize;

        if let Err(e) = socket.set_recv_buffer_size(window) {
            log::warn!("failed to set TCP recv window size to {}: {}", window, e);
        } else if let Ok(actual) = socket.recv_buffer_size() {
            log::debug!("set TCP recv window size to {}, actually got {}", window, actual);
        }

        if let Err(e) = socket.set_send_buffer_size(window) {
            log::warn!("failed to set TCP send window size to {}: {}", window, e);
        } else if let Ok(actual) = socket.send_buffer_size() {
            log::debug!("set TCP send window size to {}, actually got {}", window, actual);
        }
    }

    /// Close the connection if open. Calling this on an already-closed
    /// session is a no-op.
    pub fn disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            log::debug!("disconnecting session to {}", self.peer_addr());
            drop(stream);
        }
    }
}
