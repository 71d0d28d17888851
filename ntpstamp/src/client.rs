//! Client side of the exchange: resolve, open a socket, send a request, stamp the
//! reply and compute delay/offset, retrying transient failures a bounded number of
//! times.
use core::fmt::{Display, Formatter};
use core::time::Duration;

use crate::error::{Error, Result};
use crate::logging::{debug, warn};
use crate::net::SocketAddr;
use crate::offset::calculate;
use crate::packet::{
    debug_ntp_packet, NtpMode, NtpPacket, RawNtpPacket, NTP_PACKET_SIZE,
    RECV_BUFFER_SIZE,
};
use crate::timestamp::NtpTimestamp;
use crate::types::{
    NtpContext, NtpResult, NtpTimestampGenerator, NtpTransport, NtpUdpSocket,
    RetryBackoff,
};

/// Well-known NTP server port
pub const NTP_PORT: u16 = 123;

/// Datagrams from other peers tolerated while one attempt waits for its reply
const MAX_FOREIGN_DATAGRAMS: u32 = 4;

/// Whether a retry gets a fresh socket
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum SocketPolicy {
    /// Close the socket after a failed attempt and open a new one
    #[default]
    PerAttempt,
    /// Keep one socket for the whole exchange
    PerExchange,
}

/// Client exchange configuration
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Server UDP port
    pub port: u16,
    /// Total number of attempts, values below 1 behave as 1
    pub max_attempts: u32,
    /// Pause between attempts
    pub backoff: Duration,
    /// Upper bound on the whole exchange, measured with the context's clock
    pub deadline: Option<Duration>,
    pub socket_policy: SocketPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            port: NTP_PORT,
            max_attempts: 5,
            backoff: Duration::from_secs(4),
            deadline: None,
            socket_policy: SocketPolicy::PerAttempt,
        }
    }
}

impl ClientConfig {
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    #[must_use]
    pub fn with_socket_policy(mut self, socket_policy: SocketPolicy) -> Self {
        self.socket_policy = socket_policy;
        self
    }
}

/// Progress of a client exchange
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ClientState {
    Idle,
    Resolving,
    Connecting,
    Sending,
    AwaitingReply,
    Stamped,
    Done,
    Failed,
}

impl Display for ClientState {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        let state = match self {
            ClientState::Idle => "idle",
            ClientState::Resolving => "resolving",
            ClientState::Connecting => "connecting",
            ClientState::Sending => "sending",
            ClientState::AwaitingReply => "awaiting reply",
            ClientState::Stamped => "stamped",
            ClientState::Done => "done",
            ClientState::Failed => "failed",
        };

        write!(f, "{state}")
    }
}

/// A single client exchange with one server.
///
/// Every attempt regenerates T1 and waits for a fresh reply; nothing measured in a
/// failed attempt is reused.
pub struct Exchange<'a, X, T, B>
where
    X: NtpTransport,
    T: NtpTimestampGenerator,
    B: RetryBackoff,
{
    transport: &'a X,
    context: &'a mut NtpContext<T, B>,
    state: ClientState,
    attempts: u32,
}

impl<'a, X, T, B> Exchange<'a, X, T, B>
where
    X: NtpTransport,
    T: NtpTimestampGenerator,
    B: RetryBackoff,
{
    pub fn new(transport: &'a X, context: &'a mut NtpContext<T, B>) -> Self {
        Exchange {
            transport,
            context,
            state: ClientState::Idle,
            attempts: 0,
        }
    }

    #[must_use]
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Attempts started so far
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Resolve `host` on the configured port and run the exchange against it
    ///
    /// # Errors
    ///
    /// [`Error::AddressResolve`] if `host` can not be resolved, otherwise see
    /// [`Exchange::run_with_addr`]
    pub async fn run(&mut self, host: &str) -> Result<NtpResult> {
        self.transition(ClientState::Resolving);

        let server = match self
            .transport
            .resolve(host, self.context.config.port)
            .await
        {
            Ok(server) => server,
            Err(_) => return self.fail(Error::AddressResolve),
        };
        debug!("Resolved {} to {}", host, server);

        self.run_with_addr(server).await
    }

    /// Run the exchange against an already resolved server address
    ///
    /// # Errors
    ///
    /// * [`Error::Network`] if a socket can not be opened or an I/O call fails
    /// * [`Error::RetriesExhausted`] once every allowed attempt hit a transient failure
    /// * [`Error::DeadlineExceeded`] if another attempt would cross the deadline
    /// * [`Error::IncorrectMode`] for a reply that is not a server answer
    pub async fn run_with_addr(
        &mut self,
        server: SocketAddr,
    ) -> Result<NtpResult> {
        let config = self.context.config;
        let max_attempts = config.max_attempts.max(1);
        let started = NtpTimestamp::now(&mut self.context.timestamp_gen);
        let mut kept_socket: Option<X::Socket> = None;

        loop {
            self.attempts += 1;

            let socket = if let Some(socket) = kept_socket.take() {
                // A late reply to the previous attempt must not answer this one
                match socket.discard_pending().await {
                    Ok(0) => {}
                    Ok(stale) => debug!("Dropped {} stale datagrams", stale),
                    Err(err) => return self.fail(err),
                }
                socket
            } else {
                self.transition(ClientState::Connecting);
                match self.transport.open(server).await {
                    Ok(socket) => socket,
                    Err(err) => return self.fail(err),
                }
            };

            let err = match self.attempt(server, &socket).await {
                Ok(result) => {
                    self.transition(ClientState::Done);
                    return Ok(result);
                }
                Err(err) if err.is_retryable() => err,
                Err(err) => return self.fail(err),
            };

            warn!(
                "Attempt {}/{} to {} failed: {}",
                self.attempts, max_attempts, server, err
            );

            if self.attempts >= max_attempts {
                return self.fail(Error::RetriesExhausted {
                    attempts: self.attempts,
                });
            }

            if let Some(deadline) = config.deadline {
                let elapsed =
                    NtpTimestamp::now(&mut self.context.timestamp_gen) - started;
                let elapsed = u128::from(elapsed.as_micros().max(0).unsigned_abs());

                if elapsed + config.backoff.as_micros() > deadline.as_micros() {
                    return self.fail(Error::DeadlineExceeded);
                }
            }

            match config.socket_policy {
                SocketPolicy::PerExchange => kept_socket = Some(socket),
                SocketPolicy::PerAttempt => drop(socket),
            }

            self.context.backoff.wait(config.backoff).await;
        }
    }

    async fn attempt(
        &mut self,
        server: SocketAddr,
        socket: &X::Socket,
    ) -> Result<NtpResult> {
        self.transition(ClientState::Sending);

        let request = RawNtpPacket::from(&NtpPacket::client_request());
        let t1 = NtpTimestamp::now(&mut self.context.timestamp_gen);
        let sent = socket.send_to(&request.0, server).await?;

        if sent != NTP_PACKET_SIZE {
            return Err(Error::ShortTransfer {
                expected: NTP_PACKET_SIZE,
                actual: sent,
            });
        }

        self.transition(ClientState::AwaitingReply);

        let mut response_buf = [0u8; RECV_BUFFER_SIZE];
        let mut foreign = 0;
        let (received, t4) = loop {
            let (received, src) = socket.recv_from(&mut response_buf).await?;

            if src == server {
                break (
                    received,
                    NtpTimestamp::now(&mut self.context.timestamp_gen),
                );
            }

            foreign += 1;
            warn!(
                "Ignoring {} bytes from {} while waiting for {}",
                received, src, server
            );

            if foreign >= MAX_FOREIGN_DATAGRAMS {
                return Err(Error::ResponseAddressMismatch);
            }
        };

        if received != NTP_PACKET_SIZE {
            return Err(Error::ShortTransfer {
                expected: NTP_PACKET_SIZE,
                actual: received,
            });
        }

        self.transition(ClientState::Stamped);

        process_response(t1, &response_buf[..received], t4, self.attempts)
    }

    fn transition(&mut self, state: ClientState) {
        debug!("Exchange: {} -> {}", self.state, state);
        self.state = state;
    }

    fn fail(&mut self, err: Error) -> Result<NtpResult> {
        self.transition(ClientState::Failed);
        Err(err)
    }
}

/// Turn a stamped reply into a result.
///
/// T1 is the locally recorded send time. The reply's originate field is whatever
/// the server echoed and is deliberately not used.
pub(crate) fn process_response(
    t1: NtpTimestamp,
    response: &[u8],
    t4: NtpTimestamp,
    attempts: u32,
) -> Result<NtpResult> {
    let packet = NtpPacket::decode(response)?;

    debug_ntp_packet(&packet, t4);

    let mode = packet.mode();

    if mode != NtpMode::Server && mode != NtpMode::Broadcast {
        return Err(Error::IncorrectMode { mode: mode as u8 });
    }

    let t2 = packet.receive_timestamp;
    let t3 = packet.transmit_timestamp;
    let exchange = calculate(t1, t2, t3, t4);

    debug!(
        "Roundtrip delay: {} us. Offset: {} us",
        exchange.delay().as_micros(),
        exchange.offset().as_micros()
    );

    Ok(NtpResult::new(
        t3,
        exchange,
        packet.stratum,
        packet.precision,
        attempts,
    ))
}
