/// Library result type
pub type Result<T> = core::result::Result<T, Error>;

/// The error type for the NTP client and server
///
/// Errors originate in the transport layer, while decoding a datagram, or from the
/// client's bounded retry loop.
#[derive(Debug, PartialEq, Eq, Copy, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An NTP server address can not be resolved
    #[error("server address could not be resolved")]
    AddressResolve,
    /// Socket creation, bind or I/O failed with an OS error
    #[error("network error")]
    Network,
    /// Fewer (or more) bytes than a full NTP packet were sent or received
    #[error("short transfer: {actual} of {expected} bytes")]
    ShortTransfer {
        /// Bytes a complete transfer carries
        expected: usize,
        /// Bytes actually transferred
        actual: usize,
    },
    /// No datagram arrived before the socket receive timeout
    #[error("receive timed out")]
    Timeout,
    /// A buffer handed to the decoder is not exactly one NTP packet long
    #[error("malformed packet: {len} bytes")]
    MalformedPacket {
        /// Length of the rejected buffer
        len: usize,
    },
    /// Response mode is neither server nor broadcast
    #[error("unexpected mode {mode} in response")]
    IncorrectMode {
        /// Mode found in the response header
        mode: u8,
    },
    /// Too many datagrams arrived from addresses other than the server while
    /// waiting for its reply
    #[error("response came from an unexpected address")]
    ResponseAddressMismatch,
    /// Every attempt allowed by the client configuration failed
    #[error("gave up after {attempts} attempts")]
    RetriesExhausted {
        /// Number of attempts made
        attempts: u32,
    },
    /// Waiting for another attempt would exceed the configured deadline
    #[error("exchange deadline exceeded")]
    DeadlineExceeded,
}

impl Error {
    /// Whether the client exchange loop may recover from this error with another attempt.
    ///
    /// Short transfers, receive timeouts and replies drowned by other peers are
    /// transient: datagram loss is the client's responsibility. Everything else is
    /// fatal for the exchange.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ShortTransfer { .. } | Error::Timeout | Error::ResponseAddressMismatch
        )
    }
}
