//! Round-trip delay and clock offset of a single client/server exchange.
//!
//! ```text
//! System clock offset:
//! theta = T(B) - T(A) = 1/2 * [(T2-T1) + (T3-T4)]
//! Round-trip delay:
//! delta = T(ABA) = (T4-T1) - (T3-T2).
//! where:
//! - T1 = client's TX timestamp
//! - T2 = server's RX timestamp
//! - T3 = server's TX timestamp
//! - T4 = client's RX timestamp
//! ```
use crate::timestamp::{NtpDuration, NtpTimestamp};

/// Delay and offset produced by one successful exchange
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ExchangeResult {
    delay: NtpDuration,
    offset: NtpDuration,
}

impl ExchangeResult {
    #[must_use]
    pub fn new(delay: NtpDuration, offset: NtpDuration) -> Self {
        ExchangeResult { delay, offset }
    }

    /// Round-trip delay, expected non-negative with sane clocks but never clamped
    #[must_use]
    pub fn delay(&self) -> NtpDuration {
        self.delay
    }

    /// Offset of the server clock relative to the local clock
    #[must_use]
    pub fn offset(&self) -> NtpDuration {
        self.offset
    }
}

/// `(T4 - T1) - (T3 - T2)`
#[must_use]
pub fn roundtrip_calculate(
    t1: NtpTimestamp,
    t2: NtpTimestamp,
    t3: NtpTimestamp,
    t4: NtpTimestamp,
) -> NtpDuration {
    (t4 - t1) - (t3 - t2)
}

/// `((T2 - T1) + (T3 - T4)) / 2`, the sum is taken in 128 bits so it cannot overflow
/// before halving
#[allow(clippy::cast_possible_truncation)]
#[must_use]
pub fn offset_calculate(
    t1: NtpTimestamp,
    t2: NtpTimestamp,
    t3: NtpTimestamp,
    t4: NtpTimestamp,
) -> NtpDuration {
    let sum = i128::from((t2 - t1).to_bits()) + i128::from((t3 - t4).to_bits());

    NtpDuration::from_bits((sum / 2) as i64)
}

/// Compute delay and offset from the four exchange timestamps
#[must_use]
pub fn calculate(
    t1: NtpTimestamp,
    t2: NtpTimestamp,
    t3: NtpTimestamp,
    t4: NtpTimestamp,
) -> ExchangeResult {
    ExchangeResult::new(
        roundtrip_calculate(t1, t2, t3, t4),
        offset_calculate(t1, t2, t3, t4),
    )
}
