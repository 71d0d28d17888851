use core::fmt::{Display, Formatter};
use core::future::Future;
use core::time::Duration;

use crate::client::ClientConfig;
use crate::error::Result;
use crate::net::SocketAddr;
use crate::offset::ExchangeResult;
use crate::timestamp::{NtpDuration, NtpTimestamp};

/// Milliseconds in second constant
pub(crate) const MSEC_IN_SEC: u32 = 1_000;
/// Microseconds in second constant
pub(crate) const USEC_IN_SEC: u32 = 1_000_000;
/// Nanoseconds in second constant
pub(crate) const NSEC_IN_SEC: u32 = 1_000_000_000;

/// Resolution of a local sub-second value
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Units {
    Milliseconds,
    Microseconds,
    Nanoseconds,
}

impl Units {
    /// Number of units in one second
    #[must_use]
    pub const fn per_second(self) -> u32 {
        match self {
            Units::Milliseconds => MSEC_IN_SEC,
            Units::Microseconds => USEC_IN_SEC,
            Units::Nanoseconds => NSEC_IN_SEC,
        }
    }
}

impl Display for Units {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        let unit = match self {
            Units::Milliseconds => "ms",
            Units::Microseconds => "us",
            Units::Nanoseconds => "ns",
        };

        write!(f, "{unit}")
    }
}

/// NTP exchange result representation
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct NtpResult {
    /// NTP server transmit timestamp seconds value
    pub seconds: u32,
    /// NTP server transmit timestamp seconds fraction value
    pub seconds_fraction: u32,
    /// Round-trip delay and clock offset of the exchange
    pub exchange: ExchangeResult,
    /// Clock stratum of NTP server
    pub stratum: u8,
    /// Precision of NTP server as log2(seconds) - this should usually be negative
    pub precision: i8,
    /// Number of attempts the client needed, including the successful one
    pub attempts: u32,
}

impl NtpResult {
    /// Create new NTP result
    /// Args:
    /// * `transmit` - server transmit timestamp of the reply
    /// * `exchange` - calculated delay and offset
    /// * `stratum` - integer indicating the stratum (level of server's hierarchy to stratum 0 - "reference clock")
    /// * `precision` - an exponent of two, where the resulting value is the precision of the system clock in seconds
    /// * `attempts` - attempts spent on the exchange
    #[must_use]
    pub fn new(
        transmit: NtpTimestamp,
        exchange: ExchangeResult,
        stratum: u8,
        precision: i8,
        attempts: u32,
    ) -> Self {
        NtpResult {
            seconds: transmit.seconds(),
            seconds_fraction: transmit.fraction(),
            exchange,
            stratum,
            precision,
            attempts,
        }
    }

    /// Returns number of seconds reported by an NTP server
    #[must_use]
    pub fn sec(&self) -> u32 {
        self.seconds
    }

    /// Returns number of seconds fraction reported by an NTP server
    #[must_use]
    pub fn sec_fraction(&self) -> u32 {
        self.seconds_fraction
    }

    /// Returns the server transmit timestamp
    #[must_use]
    pub fn transmit_timestamp(&self) -> NtpTimestamp {
        NtpTimestamp::from_parts(self.seconds, self.seconds_fraction)
    }

    /// Returns round-trip delay as a signed fixed-point duration
    #[must_use]
    pub fn delay(&self) -> NtpDuration {
        self.exchange.delay()
    }

    /// Returns request's roundtrip time (client -> server -> client) in microseconds.
    /// Not clamped: misbehaving clocks can make it negative.
    #[must_use]
    pub fn roundtrip(&self) -> i64 {
        self.exchange.delay().as_micros()
    }

    /// Returns system clock offset value in microseconds
    #[must_use]
    pub fn offset(&self) -> i64 {
        self.exchange.offset().as_micros()
    }

    /// Returns reported stratum value
    #[must_use]
    pub fn stratum(&self) -> u8 {
        self.stratum
    }

    /// Returns reported precision value (an exponent of two, which results in the precision of server's system clock in seconds)
    #[must_use]
    pub fn precision(&self) -> i8 {
        self.precision
    }

    /// Returns the number of attempts the exchange took
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// A trait encapsulating timestamp generator's operations
///
/// This is the host clock seen by the client and the server. Since under `no_std`
/// environment `time::now()` implementations may be not available, you can implement
/// that trait on an object you want and provide proper system timestamps. All
/// timestamps are calculated from UNIX EPOCH "_1970-01-01 00:00:00 UTC_" with
/// microsecond resolution.
pub trait NtpTimestampGenerator {
    /// Initialize timestamp generator state with `now` system time since UNIX EPOCH.
    /// Expected to be called every time before `timestamp_sec` and
    /// `timestamp_subsec_micros` usage. Basic flow would be the following:
    ///
    /// ```text
    /// # Timestamp A required
    /// init()
    /// timestamp_sec()
    /// timestamp_subsec_micros()
    /// // ...
    /// # Timestamp B required
    /// init()
    /// timestamp_sec()
    /// timestamp_subsec_micros()
    /// // ... so on
    /// ```
    fn init(&mut self);

    /// Returns timestamp in seconds since UNIX EPOCH for the initialized generator
    fn timestamp_sec(&self) -> u64;

    /// Returns the fractional part of the timestamp in whole micro seconds.
    /// That method **should not** return microseconds since UNIX EPOCH
    fn timestamp_subsec_micros(&self) -> u32;
}

/// A trait encapsulating UDP socket interface required for NTP client and server operations
pub trait NtpUdpSocket {
    /// Send the given buffer to an address provided. On success, returns the number
    /// of bytes written.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an underlying UDP send fails
    fn send_to(
        &self,
        buf: &[u8],
        addr: SocketAddr,
    ) -> impl Future<Output = Result<usize>>;

    /// Receives a single datagram message on the socket. On success, returns the number
    /// of bytes read and the origin.
    ///
    /// `buf` is larger than an NTP packet so that oversized datagrams are reported with
    /// their real length instead of being truncated.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an underlying UDP receive fails. A receive timeout
    /// should be reported as [`crate::Error::Timeout`].
    fn recv_from(
        &self,
        buf: &mut [u8],
    ) -> impl Future<Output = Result<(usize, SocketAddr)>>;

    /// Drops datagrams already queued on the socket without waiting for new ones.
    /// On success, returns the number of datagrams dropped.
    ///
    /// The client calls this before resending on a reused socket, so a late reply to
    /// an earlier attempt is never paired with a new request. The default
    /// implementation drops nothing.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an underlying UDP receive fails
    fn discard_pending(&self) -> impl Future<Output = Result<usize>> {
        async { Ok(0) }
    }
}

/// The networking substrate the client exchange loop needs: name resolution and
/// datagram socket creation.
pub trait NtpTransport {
    /// Socket type produced by [`NtpTransport::open`]
    type Socket: NtpUdpSocket;

    /// Resolve `host` and `port` into a single server address.
    ///
    /// # Errors
    ///
    /// Will return [`crate::Error::AddressResolve`] if the lookup fails or yields nothing
    fn resolve(
        &self,
        host: &str,
        port: u16,
    ) -> impl Future<Output = Result<SocketAddr>>;

    /// Create a datagram socket bound to an ephemeral local port suitable for
    /// talking to `server`.
    ///
    /// # Errors
    ///
    /// Will return [`crate::Error::Network`] if the socket can not be created or bound
    fn open(
        &self,
        server: SocketAddr,
    ) -> impl Future<Output = Result<Self::Socket>>;
}

/// Wait policy between client attempts
pub trait RetryBackoff {
    /// Wait `delay` before the next attempt
    fn wait(&mut self, delay: Duration) -> impl Future<Output = ()>;
}

/// Backoff that never waits. Useful for tests and for callers that pace retries
/// themselves.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoBackoff;

impl RetryBackoff for NoBackoff {
    async fn wait(&mut self, _delay: Duration) {}
}

#[cfg(feature = "std")]
/// Supplementary module to implement some `ntpstamp` boilerplate that environments with
/// `std` enable have to re-implement.
mod sup {
    use std::time::{Duration, SystemTime};

    use crate::{NtpTimestampGenerator, RetryBackoff};

    /// Standard library timestamp generator wrapper type
    /// that relies on `std::time` to provide timestamps
    #[derive(Copy, Clone, Default)]
    pub struct StdTimestampGen {
        duration: Duration,
    }

    impl NtpTimestampGenerator for StdTimestampGen {
        fn init(&mut self) {
            // A clock set before 1970 reads as the epoch itself.
            self.duration = SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default();
        }

        fn timestamp_sec(&self) -> u64 {
            self.duration.as_secs()
        }

        fn timestamp_subsec_micros(&self) -> u32 {
            self.duration.subsec_micros()
        }
    }

    /// Blocking backoff that puts the current thread to sleep
    #[derive(Copy, Clone, Debug, Default)]
    pub struct StdBackoff;

    impl RetryBackoff for StdBackoff {
        async fn wait(&mut self, delay: Duration) {
            std::thread::sleep(delay);
        }
    }
}

#[cfg(feature = "std")]
pub use sup::*;

/// NTP client context that contains of objects that may be required for client's
/// operation: the host clock, the retry backoff and the exchange configuration
#[derive(Copy, Clone, Debug)]
pub struct NtpContext<T: NtpTimestampGenerator, B: RetryBackoff = NoBackoff> {
    pub timestamp_gen: T,
    pub backoff: B,
    pub config: ClientConfig,
}

impl<T: NtpTimestampGenerator> NtpContext<T> {
    /// Create client context with the given timestamp generator, default configuration
    /// and no backoff between attempts
    pub fn new(timestamp_gen: T) -> Self {
        NtpContext {
            timestamp_gen,
            backoff: NoBackoff,
            config: ClientConfig::default(),
        }
    }
}

impl<T: NtpTimestampGenerator, B: RetryBackoff> NtpContext<T, B> {
    /// Replace the backoff used between attempts
    pub fn with_backoff<R: RetryBackoff>(self, backoff: R) -> NtpContext<T, R> {
        NtpContext {
            timestamp_gen: self.timestamp_gen,
            backoff,
            config: self.config,
        }
    }

    /// Replace the exchange configuration
    #[must_use]
    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }
}
