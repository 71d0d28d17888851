//! Stateless responder: every valid 48-byte request gets exactly one reply stamped with
//! its own arrival and departure times, anything else is dropped.
use core::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Error, Result};
use crate::logging::{debug, error, warn};
use crate::net::SocketAddr;
use crate::packet::{
    pack_li_vn_mode, NtpMode, NtpPacket, NTP_PACKET_SIZE, RECV_BUFFER_SIZE,
};
use crate::timestamp::NtpTimestamp;
use crate::types::{NtpTimestampGenerator, NtpUdpSocket};

/// Fields the server writes into every reply
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub stratum: u8,
    /// log2 of the poll interval announced to clients
    pub poll: i8,
    pub version: u8,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            stratum: 2,
            poll: 16,
            version: 4,
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn with_stratum(mut self, stratum: u8) -> Self {
        self.stratum = stratum;
        self
    }

    #[must_use]
    pub fn with_poll(mut self, poll: i8) -> Self {
        self.poll = poll;
        self
    }

    #[must_use]
    pub fn with_version(mut self, version: u8) -> Self {
        self.version = version;
        self
    }
}

/// What happened to a single received datagram
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ServeOutcome {
    /// A reply was sent, `sent` may be short: there is no retry on the server side
    Replied { client: SocketAddr, sent: usize },
    /// The datagram was not 48 bytes long and got no reply
    Discarded { client: SocketAddr, len: usize },
}

/// Counters of a finished [`NtpServer::run`]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ServeSummary {
    pub replied: u64,
    pub discarded: u64,
}

/// NTP server bound to a single socket
pub struct NtpServer<U: NtpUdpSocket, T: NtpTimestampGenerator> {
    socket: U,
    timestamp_gen: T,
    config: ServerConfig,
}

impl<U: NtpUdpSocket, T: NtpTimestampGenerator> NtpServer<U, T> {
    pub fn new(socket: U, timestamp_gen: T) -> Self {
        NtpServer {
            socket,
            timestamp_gen,
            config: ServerConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    #[must_use]
    pub fn socket(&self) -> &U {
        &self.socket
    }

    /// Receive one datagram and answer it if it is a well-formed packet
    ///
    /// # Errors
    ///
    /// Will return `Err` if receiving or sending fails at the socket level, a receive
    /// timeout is reported as [`Error::Timeout`]
    pub async fn serve_once(&mut self) -> Result<ServeOutcome> {
        let mut buf = [0u8; RECV_BUFFER_SIZE];
        let (len, client) = self.socket.recv_from(&mut buf).await?;
        let arrival = NtpTimestamp::now(&mut self.timestamp_gen);

        let Ok(request) = NtpPacket::decode(&buf[..len]) else {
            warn!("Discarding {} byte datagram from {}", len, client);
            return Ok(ServeOutcome::Discarded { client, len });
        };

        let mut reply = request;
        reply.li_vn_mode = pack_li_vn_mode(0, self.config.version, NtpMode::Server);
        reply.stratum = self.config.stratum;
        reply.poll = self.config.poll;
        reply.receive_timestamp = arrival;
        reply.transmit_timestamp = NtpTimestamp::now(&mut self.timestamp_gen);

        let raw = reply.encode();
        let sent = self.socket.send_to(&raw.0, client).await?;

        if sent == NTP_PACKET_SIZE {
            debug!("Replied to {}", client);
        } else {
            warn!("Short reply to {}: {} of {} bytes", client, sent, NTP_PACKET_SIZE);
        }

        Ok(ServeOutcome::Replied { client, sent })
    }

    /// Serve requests until `shutdown` is set.
    ///
    /// The flag is checked between datagrams, so the socket needs a receive timeout
    /// for an idle server to notice it. Per-datagram failures are logged and never end
    /// the loop.
    pub async fn run(&mut self, shutdown: &AtomicBool) -> ServeSummary {
        let mut summary = ServeSummary::default();

        while !shutdown.load(Ordering::Relaxed) {
            match self.serve_once().await {
                Ok(ServeOutcome::Replied { .. }) => summary.replied += 1,
                Ok(ServeOutcome::Discarded { .. }) => summary.discarded += 1,
                Err(Error::Timeout) => {}
                Err(err) => error!("Serving request failed: {}", err),
            }
        }

        debug!(
            "Server stopped: {} replied, {} discarded",
            summary.replied, summary.discarded
        );

        summary
    }
}
