//! Standard library UDP transport for the [`ntpstamp`] NTP library.
//!
//! This crate provides a thin wrapper around [`std::net::UdpSocket`] that implements
//! the [`NtpUdpSocket`] trait, plus [`StdTransport`] which resolves server names with
//! [`std::net::ToSocketAddrs`] and opens one such socket per client attempt.
//!
//! Sockets are blocking. A read timeout turns a lost datagram into
//! [`Error::Timeout`], which the client retries and the server uses to check for
//! shutdown.
//!
//! # Example
//!
//! ```no_run
//! use ntpstamp::{sync::get_time, NtpContext, StdBackoff, StdTimestampGen};
//! use ntpstamp_net_std::StdTransport;
//!
//! let mut context = NtpContext::new(StdTimestampGen::default()).with_backoff(StdBackoff);
//!
//! match get_time("pool.ntp.org", &StdTransport::default(), &mut context) {
//!     Ok(time) => println!("Offset: {} us", time.offset()),
//!     Err(e) => eprintln!("Failed to get time: {e}"),
//! }
//! ```

use ntpstamp::{Error, NtpTransport, NtpUdpSocket, Result};

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

/// Receive timeout [`StdTransport`] puts on client sockets unless told otherwise
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Large enough that discarded datagrams are never truncated
const DISCARD_BUFFER_SIZE: usize = 512;

/// Map an I/O error onto the library error type: timeouts become [`Error::Timeout`],
/// anything else [`Error::Network`]
#[must_use]
pub fn map_io_error(err: &io::Error) -> Error {
    match err.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => Error::Timeout,
        _ => Error::Network,
    }
}

/// A wrapper around [`std::net::UdpSocket`] that implements [`NtpUdpSocket`].
///
/// # Example
///
/// ```no_run
/// use ntpstamp::{NtpServer, StdTimestampGen};
/// use ntpstamp_net_std::UdpSocketWrapper;
/// use std::time::Duration;
///
/// let socket = UdpSocketWrapper::bind("0.0.0.0:123", Some(Duration::from_secs(1)))
///     .expect("Failed to bind");
/// let server = NtpServer::new(socket, StdTimestampGen::default());
/// ```
#[derive(Debug)]
pub struct UdpSocketWrapper {
    socket: UdpSocket,
}

impl UdpSocketWrapper {
    /// Creates a new `UdpSocketWrapper` from a [`std::net::UdpSocket`].
    #[must_use]
    pub fn new(socket: UdpSocket) -> Self {
        Self { socket }
    }

    /// Bind a new socket to `addr` with the given receive timeout
    ///
    /// # Errors
    ///
    /// Will return [`Error::Network`] if the socket can not be bound or the timeout is
    /// rejected (a zero duration is)
    pub fn bind<A: ToSocketAddrs>(
        addr: A,
        read_timeout: Option<Duration>,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(addr).map_err(|e| map_io_error(&e))?;
        socket
            .set_read_timeout(read_timeout)
            .map_err(|_| Error::Network)?;

        Ok(Self::new(socket))
    }

    /// Local address the socket is bound to
    ///
    /// # Errors
    ///
    /// Will return [`Error::Network`] if the OS can not report it
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().map_err(|_| Error::Network)
    }

    fn drain(&self) -> Result<usize> {
        let mut buf = [0u8; DISCARD_BUFFER_SIZE];
        let mut dropped = 0;

        loop {
            match self.socket.recv_from(&mut buf) {
                Ok(_) => dropped += 1,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(dropped),
                Err(e) => return Err(map_io_error(&e)),
            }
        }
    }
}

impl From<UdpSocket> for UdpSocketWrapper {
    fn from(socket: UdpSocket) -> Self {
        UdpSocketWrapper::new(socket)
    }
}

impl NtpUdpSocket for UdpSocketWrapper {
    async fn send_to(&self, buf: &[u8], addr: SocketAddr) -> Result<usize> {
        self.socket.send_to(buf, addr).map_err(|e| map_io_error(&e))
    }

    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf).map_err(|e| map_io_error(&e))
    }

    async fn discard_pending(&self) -> Result<usize> {
        self.socket
            .set_nonblocking(true)
            .map_err(|_| Error::Network)?;
        let dropped = self.drain();
        self.socket
            .set_nonblocking(false)
            .map_err(|_| Error::Network)?;

        dropped
    }
}

/// Blocking [`NtpTransport`] over the standard library
#[derive(Debug, Copy, Clone)]
pub struct StdTransport {
    read_timeout: Option<Duration>,
}

impl Default for StdTransport {
    fn default() -> Self {
        Self {
            read_timeout: Some(DEFAULT_READ_TIMEOUT),
        }
    }
}

impl StdTransport {
    /// Receive timeout for sockets opened from now on, `None` blocks forever
    #[must_use]
    pub fn with_read_timeout(mut self, read_timeout: Option<Duration>) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    #[must_use]
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }
}

impl NtpTransport for StdTransport {
    type Socket = UdpSocketWrapper;

    async fn resolve(&self, host: &str, port: u16) -> Result<SocketAddr> {
        (host, port)
            .to_socket_addrs()
            .map_err(|_| Error::AddressResolve)?
            .next()
            .ok_or(Error::AddressResolve)
    }

    async fn open(&self, server: SocketAddr) -> Result<UdpSocketWrapper> {
        let local = if server.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };

        UdpSocketWrapper::bind(local, self.read_timeout)
    }
}
