//! Rust NTP client and server core
//!
//! # Overview
//!
//! This crate implements the basic NTP exchange: a client sends a timestamped request,
//! a server stamps the arrival and departure of that request and sends it back, and
//! the client computes round-trip delay and clock offset from the four timestamps.
//! Clock selection, clock stepping/slewing, authentication and extension fields are
//! out of scope.
//!
//! # Usage
//!
//! Put this in your `Cargo.toml`:
//! ```cargo
//! [dependencies]
//! ntpstamp = "0.1"
//! ```
//!
//! ## Features
//!
//! `ntpstamp` supports several features:
//! - `std`: host clock and blocking backoff built on the standard library
//! - `sync`: enables synchronous interface
//! - `log`: enables library debug output during execution
//! - `chrono`: conversion of NTP timestamps into `chrono` date-times
//!
//! # Details
//!
//! The core never touches the network or the system clock directly. As it supports
//! `no_std` environments, everything host specific comes in through traits:
//! - [`NtpUdpSocket`] should be implemented for `UdpSocket`-like objects to send and
//!   receive datagrams
//! - [`NtpTransport`] resolves server names and opens sockets for the client
//! - [`NtpTimestampGenerator`] provides wall-clock readings
//! - [`RetryBackoff`] waits between client attempts
//!
//! Ready-made implementations for `std::net` and `tokio` live in the
//! `ntpstamp-net-std` and `ntpstamp-net-tokio` crates.
//!
//! ## Logging support
//!
//! Library debug logs can be enabled in executables by enabling `log` feature. Exchange
//! state transitions, retries, discarded datagrams and packet contents will be printed.
//!
//! # Example
//!
//! ```no_run
//! use ntpstamp::{get_time, Error, NtpContext, NtpTransport, NtpUdpSocket, Result, StdTimestampGen};
//! # use miniloop::executor::Executor;
//! use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
//!
//! struct Socket(UdpSocket);
//!
//! impl NtpUdpSocket for Socket {
//!     async fn send_to(&self, buf: &[u8], addr: SocketAddr) -> Result<usize> {
//!         self.0.send_to(buf, addr).map_err(|_| Error::Network)
//!     }
//!
//!     async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
//!         self.0.recv_from(buf).map_err(|_| Error::Network)
//!     }
//! }
//!
//! struct Transport;
//!
//! impl NtpTransport for Transport {
//!     type Socket = Socket;
//!
//!     async fn resolve(&self, host: &str, port: u16) -> Result<SocketAddr> {
//!         (host, port)
//!             .to_socket_addrs()
//!             .ok()
//!             .and_then(|mut addrs| addrs.next())
//!             .ok_or(Error::AddressResolve)
//!     }
//!
//!     async fn open(&self, _server: SocketAddr) -> Result<Socket> {
//!         UdpSocket::bind("0.0.0.0:0")
//!             .map(Socket)
//!             .map_err(|_| Error::Network)
//!     }
//! }
//!
//! fn main() {
//!     let mut context = NtpContext::new(StdTimestampGen::default());
//!     # let mut executor = Executor::<1>::new();
//!
//!     match executor.block_on(get_time("pool.ntp.org", &Transport, &mut context)) {
//!         Ok(result) => println!(
//!             "Offset: {} us, delay: {} us",
//!             result.offset(),
//!             result.roundtrip()
//!         ),
//!         Err(err) => eprintln!("Error: {err}"),
//!     }
//! }
//! ```
#![cfg_attr(not(any(feature = "std", test)), no_std)]

mod client;
mod error;
mod logging;
mod offset;
mod packet;
mod server;
mod timestamp;
mod types;

pub use crate::client::{ClientConfig, ClientState, Exchange, SocketPolicy, NTP_PORT};
pub use crate::error::{Error, Result};
pub use crate::offset::{calculate, offset_calculate, roundtrip_calculate, ExchangeResult};
pub use crate::packet::{pack_li_vn_mode, NtpMode, NtpPacket, RawNtpPacket, NTP_PACKET_SIZE};
pub use crate::server::{NtpServer, ServeOutcome, ServeSummary, ServerConfig};
pub use crate::timestamp::{
    from_ntp_fraction, from_ntp_seconds, to_ntp_fraction, to_ntp_seconds, LocalTimestamp,
    NtpDuration, NtpTimestamp, NTP_TIMESTAMP_DELTA,
};
pub use crate::types::*;

/// Network types used by the `ntpstamp` crate
pub mod net {
    pub use core::net::SocketAddr;
}

/// Retrieves the current time from an NTP server.
///
/// Resolves `host` on the port from `context.config`, then runs a full client exchange
/// with bounded retries.
///
/// # Arguments
///
/// * `host` - server name or address, without port
/// * `transport` - resolves the name and opens sockets, see [`NtpTransport`]
/// * `context` - host clock, retry backoff and exchange configuration
///
/// # Errors
///
/// * [`Error::AddressResolve`] if `host` can not be resolved
/// * [`Error::Network`] on socket level failures
/// * [`Error::RetriesExhausted`] or [`Error::DeadlineExceeded`] once no attempts are left
/// * [`Error::IncorrectMode`] for a reply that is not a server answer
pub async fn get_time<X, T, B>(
    host: &str,
    transport: &X,
    context: &mut NtpContext<T, B>,
) -> Result<NtpResult>
where
    X: NtpTransport,
    T: NtpTimestampGenerator,
    B: RetryBackoff,
{
    Exchange::new(transport, context).run(host).await
}

/// Same as [`get_time`] for an already resolved server address
///
/// # Errors
///
/// See [`get_time`], except that no name resolution takes place
pub async fn get_time_from<X, T, B>(
    server: net::SocketAddr,
    transport: &X,
    context: &mut NtpContext<T, B>,
) -> Result<NtpResult>
where
    X: NtpTransport,
    T: NtpTimestampGenerator,
    B: RetryBackoff,
{
    Exchange::new(transport, context).run_with_addr(server).await
}

/// Blocking wrappers around the asynchronous interface.
///
/// Each call drives the future to completion on a single-threaded executor, which
/// suits transports whose I/O already blocks (like `std::net::UdpSocket`).
#[cfg(feature = "sync")]
pub mod sync {
    use core::sync::atomic::AtomicBool;

    use miniloop::executor::Executor;

    use crate::net;
    use crate::server::{NtpServer, ServeOutcome, ServeSummary};
    use crate::types::{
        NtpContext, NtpResult, NtpTimestampGenerator, NtpTransport, NtpUdpSocket,
        RetryBackoff,
    };
    use crate::Result;

    /// Blocking version of [`crate::get_time`]
    ///
    /// # Errors
    ///
    /// See [`crate::get_time`]
    pub fn get_time<X, T, B>(
        host: &str,
        transport: &X,
        context: &mut NtpContext<T, B>,
    ) -> Result<NtpResult>
    where
        X: NtpTransport,
        T: NtpTimestampGenerator,
        B: RetryBackoff,
    {
        Executor::<1>::new().block_on(crate::get_time(host, transport, context))
    }

    /// Blocking version of [`crate::get_time_from`]
    ///
    /// # Errors
    ///
    /// See [`crate::get_time`]
    pub fn get_time_from<X, T, B>(
        server: net::SocketAddr,
        transport: &X,
        context: &mut NtpContext<T, B>,
    ) -> Result<NtpResult>
    where
        X: NtpTransport,
        T: NtpTimestampGenerator,
        B: RetryBackoff,
    {
        Executor::<1>::new().block_on(crate::get_time_from(server, transport, context))
    }

    /// Blocking version of [`NtpServer::serve_once`]
    ///
    /// # Errors
    ///
    /// See [`NtpServer::serve_once`]
    pub fn serve_once<U, T>(server: &mut NtpServer<U, T>) -> Result<ServeOutcome>
    where
        U: NtpUdpSocket,
        T: NtpTimestampGenerator,
    {
        Executor::<1>::new().block_on(server.serve_once())
    }

    /// Blocking version of [`NtpServer::run`]
    pub fn run<U, T>(server: &mut NtpServer<U, T>, shutdown: &AtomicBool) -> ServeSummary
    where
        U: NtpUdpSocket,
        T: NtpTimestampGenerator,
    {
        Executor::<1>::new().block_on(server.run(shutdown))
    }
}
