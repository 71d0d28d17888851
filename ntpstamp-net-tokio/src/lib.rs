//! Tokio async runtime UDP transport for the [`ntpstamp`] NTP library.
//!
//! This crate provides a wrapper around [`tokio::net::UdpSocket`] that implements
//! the [`NtpUdpSocket`] trait, a [`TokioTransport`] resolving names with
//! [`tokio::net::lookup_host`], and a [`TokioBackoff`] that sleeps on the Tokio timer
//! instead of blocking the thread.
//!
//! # Example
//!
//! ```ignore
//! use ntpstamp::{get_time, NtpContext, StdTimestampGen};
//! use ntpstamp_net_tokio::{TokioBackoff, TokioTransport};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut context = NtpContext::new(StdTimestampGen::default()).with_backoff(TokioBackoff);
//!
//!     match get_time("pool.ntp.org", &TokioTransport::default(), &mut context).await {
//!         Ok(time) => println!("Offset: {} us", time.offset()),
//!         Err(e) => eprintln!("Failed to get time: {e}"),
//!     }
//! }
//! ```
#![no_std]

extern crate std;

use ntpstamp::{Error, NtpTransport, NtpUdpSocket, Result, RetryBackoff};
use tokio::net::{ToSocketAddrs, UdpSocket};

use core::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use core::time::Duration;
use std::io;

/// Receive timeout [`TokioTransport`] puts on client sockets unless told otherwise
pub const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Large enough that discarded datagrams are never truncated
const DISCARD_BUFFER_SIZE: usize = 512;

/// A wrapper around [`tokio::net::UdpSocket`] that implements [`NtpUdpSocket`].
///
/// Receives are bounded by an optional timeout, reported as [`Error::Timeout`].
pub struct UdpSocketWrapper {
    socket: UdpSocket,
    recv_timeout: Option<Duration>,
}

impl UdpSocketWrapper {
    /// Wrap a socket without a receive timeout
    #[must_use]
    pub fn new(socket: UdpSocket) -> Self {
        Self {
            socket,
            recv_timeout: None,
        }
    }

    /// Bind a new socket to `addr`
    ///
    /// # Errors
    ///
    /// Will return [`Error::Network`] if the socket can not be bound
    pub async fn bind<A: ToSocketAddrs>(
        addr: A,
        recv_timeout: Option<Duration>,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await.map_err(|_| Error::Network)?;

        Ok(Self::new(socket).with_recv_timeout(recv_timeout))
    }

    #[must_use]
    pub fn with_recv_timeout(mut self, recv_timeout: Option<Duration>) -> Self {
        self.recv_timeout = recv_timeout;
        self
    }

    /// Local address the socket is bound to
    ///
    /// # Errors
    ///
    /// Will return [`Error::Network`] if the OS can not report it
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().map_err(|_| Error::Network)
    }
}

impl From<UdpSocket> for UdpSocketWrapper {
    fn from(socket: UdpSocket) -> Self {
        UdpSocketWrapper::new(socket)
    }
}

impl NtpUdpSocket for UdpSocketWrapper {
    async fn send_to(&self, buf: &[u8], addr: SocketAddr) -> Result<usize> {
        self.socket.send_to(buf, addr).await.map_err(|_| Error::Network)
    }

    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        let recv = self.socket.recv_from(buf);

        match self.recv_timeout {
            Some(limit) => tokio::time::timeout(limit, recv)
                .await
                .map_err(|_| Error::Timeout)?
                .map_err(|_| Error::Network),
            None => recv.await.map_err(|_| Error::Network),
        }
    }

    async fn discard_pending(&self) -> Result<usize> {
        let mut buf = [0u8; DISCARD_BUFFER_SIZE];
        let mut dropped = 0;

        loop {
            match self.socket.try_recv_from(&mut buf) {
                Ok(_) => dropped += 1,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(dropped),
                Err(_) => return Err(Error::Network),
            }
        }
    }
}

/// Asynchronous [`NtpTransport`] on the Tokio runtime
#[derive(Debug, Copy, Clone)]
pub struct TokioTransport {
    recv_timeout: Option<Duration>,
}

impl Default for TokioTransport {
    fn default() -> Self {
        Self {
            recv_timeout: Some(DEFAULT_RECV_TIMEOUT),
        }
    }
}

impl TokioTransport {
    /// Receive timeout for sockets opened from now on, `None` waits forever
    #[must_use]
    pub fn with_recv_timeout(mut self, recv_timeout: Option<Duration>) -> Self {
        self.recv_timeout = recv_timeout;
        self
    }
}

impl NtpTransport for TokioTransport {
    type Socket = UdpSocketWrapper;

    async fn resolve(&self, host: &str, port: u16) -> Result<SocketAddr> {
        tokio::net::lookup_host((host, port))
            .await
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

        UdpSocketWrapper::bind(local, self.recv_timeout).await
    }
}

/// Backoff that yields to the runtime with [`tokio::time::sleep`]
#[derive(Debug, Copy, Clone, Default)]
pub struct TokioBackoff;

impl RetryBackoff for TokioBackoff {
    async fn wait(&mut self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}
