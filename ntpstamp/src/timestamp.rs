//! NTP 32.32 fixed-point time values and conversion from/to the local (UNIX) clock.
//!
//! Seconds and fraction are converted separately, matching the wire format, but all
//! arithmetic on timestamps happens on the concatenated 64-bit value so borrows between
//! the two halves are never lost.
use core::fmt::{Display, Formatter};
use core::ops::{Add, Sub};

use crate::types::{NtpTimestampGenerator, Units};

/// Seconds between the NTP era 0 origin (1900-01-01) and the UNIX epoch (1970-01-01),
/// see <https://www.rfc-editor.org/rfc/rfc5905>
pub const NTP_TIMESTAMP_DELTA: u32 = 2_208_988_800;

const FRACTION_SCALE: u64 = 1 << 32;
const HALF_FRACTION: u64 = FRACTION_SCALE / 2;
/// NTP seconds with the most significant bit clear belong to era 1 (from 2036-02-07),
/// see <https://www.rfc-editor.org/rfc/rfc4330#section-3>
const ERA_PIVOT_BIT: u32 = 0x8000_0000;

/// Convert seconds since the UNIX epoch into NTP seconds.
///
/// The result is truncated to 32 bits as the wire format requires; values past
/// 2036-02-07 wrap into the next era.
#[allow(clippy::cast_possible_truncation)]
#[must_use]
pub fn to_ntp_seconds(unix_seconds: u64) -> u32 {
    unix_seconds.wrapping_add(u64::from(NTP_TIMESTAMP_DELTA)) as u32
}

/// Convert NTP seconds back to seconds since the UNIX epoch, resolving the era with
/// the most significant bit rule.
#[must_use]
pub fn from_ntp_seconds(ntp_seconds: u32) -> u64 {
    if ntp_seconds & ERA_PIVOT_BIT == 0 {
        u64::from(ntp_seconds) + FRACTION_SCALE - u64::from(NTP_TIMESTAMP_DELTA)
    } else {
        u64::from(ntp_seconds) - u64::from(NTP_TIMESTAMP_DELTA)
    }
}

/// Rescale a sub-second value in `units` into units of 2^-32 seconds, rounding to
/// the nearest representable fraction.
///
/// Out of range input (`fraction >= units.per_second()`) saturates at the largest
/// fraction.
#[must_use]
pub fn to_ntp_fraction(fraction: u32, units: Units) -> u32 {
    let per_second = u64::from(units.per_second());
    let scaled = ((u64::from(fraction) << 32) + per_second / 2) / per_second;

    u32::try_from(scaled).unwrap_or(u32::MAX)
}

/// Rescale an NTP fraction into `units`, rounding to the nearest unit.
///
/// Fractions within half a unit of a whole second round up to
/// `units.per_second()`; callers that need a normalized value carry it into seconds.
#[allow(clippy::cast_possible_truncation)]
#[must_use]
pub fn from_ntp_fraction(ntp_fraction: u32, units: Units) -> u32 {
    ((u64::from(ntp_fraction) * u64::from(units.per_second()) + HALF_FRACTION) >> 32)
        as u32
}

/// A reading of the local clock: seconds since the UNIX epoch and a sub-second
/// fraction in the given `units`
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LocalTimestamp {
    pub seconds: u64,
    pub fraction: u32,
    pub units: Units,
}

impl LocalTimestamp {
    #[must_use]
    pub fn new(seconds: u64, fraction: u32, units: Units) -> Self {
        LocalTimestamp {
            seconds,
            fraction,
            units,
        }
    }
}

/// 64-bit NTP timestamp: whole seconds since 1900-01-01 in the high 32 bits, fraction
/// of a second in units of 2^-32 in the low 32 bits
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NtpTimestamp(u64);

impl NtpTimestamp {
    pub const ZERO: NtpTimestamp = NtpTimestamp(0);

    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        NtpTimestamp(bits)
    }

    #[must_use]
    pub const fn to_bits(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn from_parts(seconds: u32, fraction: u32) -> Self {
        NtpTimestamp(((seconds as u64) << 32) | fraction as u64)
    }

    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub const fn seconds(self) -> u32 {
        (self.0 >> 32) as u32
    }

    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub const fn fraction(self) -> u32 {
        self.0 as u32
    }

    /// Convert a local clock reading into an NTP timestamp
    #[must_use]
    pub fn from_local(local: LocalTimestamp) -> Self {
        NtpTimestamp::from_parts(
            to_ntp_seconds(local.seconds),
            to_ntp_fraction(local.fraction, local.units),
        )
    }

    /// Convert the timestamp to a local clock reading in `units`
    #[must_use]
    pub fn to_local(self, units: Units) -> LocalTimestamp {
        let mut seconds = from_ntp_seconds(self.seconds());
        let mut fraction = from_ntp_fraction(self.fraction(), units);

        if fraction >= units.per_second() {
            seconds += 1;
            fraction -= units.per_second();
        }

        LocalTimestamp::new(seconds, fraction, units)
    }

    /// Take a fresh reading from `timestamp_gen` and convert it to NTP format
    pub fn now<T: NtpTimestampGenerator>(timestamp_gen: &mut T) -> Self {
        timestamp_gen.init();

        NtpTimestamp::from_local(LocalTimestamp::new(
            timestamp_gen.timestamp_sec(),
            timestamp_gen.timestamp_subsec_micros(),
            Units::Microseconds,
        ))
    }

    /// UTC date and time of the timestamp, `None` if out of `chrono` range
    #[cfg(feature = "chrono")]
    #[must_use]
    pub fn to_datetime(self) -> Option<chrono::DateTime<chrono::Utc>> {
        let local = self.to_local(Units::Nanoseconds);

        chrono::DateTime::from_timestamp(
            i64::try_from(local.seconds).ok()?,
            local.fraction,
        )
    }
}

/// Differences are taken modulo 2^64 and interpreted as signed, so they stay
/// correct across an era rollover as long as the two timestamps are less than
/// 68 years apart.
impl Sub for NtpTimestamp {
    type Output = NtpDuration;

    #[allow(clippy::cast_possible_wrap)]
    fn sub(self, rhs: NtpTimestamp) -> NtpDuration {
        NtpDuration(self.0.wrapping_sub(rhs.0) as i64)
    }
}

impl Add<NtpDuration> for NtpTimestamp {
    type Output = NtpTimestamp;

    fn add(self, rhs: NtpDuration) -> NtpTimestamp {
        NtpTimestamp(self.0.wrapping_add_signed(rhs.0))
    }
}

impl Display for NtpTimestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{:010}", self.seconds(), self.fraction())
    }
}

/// Signed 32.32 fixed-point time interval
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NtpDuration(i64);

impl NtpDuration {
    pub const ZERO: NtpDuration = NtpDuration(0);

    #[must_use]
    pub const fn from_bits(bits: i64) -> Self {
        NtpDuration(bits)
    }

    #[must_use]
    pub const fn to_bits(self) -> i64 {
        self.0
    }

    /// Build an interval from a value in `units`, rounding to the nearest 2^-32 s
    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn from_units(value: i64, units: Units) -> Self {
        let per_second = i128::from(units.per_second());
        let scaled = i128::from(value) << 32;
        let half = per_second / 2;
        let bits = if scaled >= 0 {
            (scaled + half) / per_second
        } else {
            (scaled - half) / per_second
        };

        NtpDuration(bits as i64)
    }

    /// Whole seconds, rounded towards negative infinity
    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub const fn seconds(self) -> i32 {
        (self.0 >> 32) as i32
    }

    /// Fraction to add to [`NtpDuration::seconds`] to get the interval
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    #[must_use]
    pub const fn fraction(self) -> u32 {
        self.0 as u32
    }

    /// Interval in `units`, rounded half away from zero
    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn to_units(self, units: Units) -> i64 {
        let magnitude = u128::from(self.0.unsigned_abs()) * u128::from(units.per_second());
        let rounded = ((magnitude + u128::from(HALF_FRACTION)) >> 32) as i64;

        if self.0 < 0 {
            -rounded
        } else {
            rounded
        }
    }

    #[must_use]
    pub fn as_millis(self) -> i64 {
        self.to_units(Units::Milliseconds)
    }

    #[must_use]
    pub fn as_micros(self) -> i64 {
        self.to_units(Units::Microseconds)
    }

    #[must_use]
    pub fn as_nanos(self) -> i64 {
        self.to_units(Units::Nanoseconds)
    }
}

impl Sub for NtpDuration {
    type Output = NtpDuration;

    fn sub(self, rhs: NtpDuration) -> NtpDuration {
        NtpDuration(self.0.wrapping_sub(rhs.0))
    }
}

impl Add for NtpDuration {
    type Output = NtpDuration;

    fn add(self, rhs: NtpDuration) -> NtpDuration {
        NtpDuration(self.0.wrapping_add(rhs.0))
    }
}

impl Display for NtpDuration {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        let nanos = self.as_nanos();
        let sign = if nanos < 0 { "-" } else { "" };
        let nanos = nanos.unsigned_abs();

        write!(
            f,
            "{sign}{}.{:09}s",
            nanos / u64::from(crate::types::NSEC_IN_SEC),
            nanos % u64::from(crate::types::NSEC_IN_SEC)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NtpTimestampGenerator;

    #[test]
    fn test_to_ntp_seconds() {
        assert_eq!(to_ntp_seconds(0), NTP_TIMESTAMP_DELTA);
        assert_eq!(to_ntp_seconds(1_700_000_000), 3_908_988_800);
        // 2036-02-07T06:28:16Z is the first second of era 1
        assert_eq!(to_ntp_seconds(2_085_978_496), 0);
    }

    #[test]
    fn test_from_ntp_seconds_resolves_era() {
        assert_eq!(from_ntp_seconds(NTP_TIMESTAMP_DELTA), 0);
        assert_eq!(from_ntp_seconds(3_908_988_800), 1_700_000_000);
        assert_eq!(from_ntp_seconds(0), 2_085_978_496);
        assert_eq!(from_ntp_seconds(10), 2_085_978_506);
    }

    #[test]
    fn test_to_ntp_fraction() {
        let tests = [
            (0, Units::Microseconds, 0),
            (500_000, Units::Microseconds, 0x8000_0000),
            (250, Units::Milliseconds, 0x4000_0000),
            (1, Units::Microseconds, 4295),
            (999_999, Units::Microseconds, 4_294_963_001),
            (123_456, Units::Microseconds, 530_239_482),
            (1_000_000, Units::Microseconds, u32::MAX),
        ];

        for (fraction, units, expected) in tests {
            assert_eq!(to_ntp_fraction(fraction, units), expected, "{fraction} {units}");
        }
    }

    #[test]
    fn test_from_ntp_fraction() {
        assert_eq!(from_ntp_fraction(0, Units::Microseconds), 0);
        assert_eq!(from_ntp_fraction(0x8000_0000, Units::Microseconds), 500_000);
        assert_eq!(from_ntp_fraction(0x4000_0000, Units::Milliseconds), 250);
        assert_eq!(from_ntp_fraction(530_239_482, Units::Microseconds), 123_456);
        assert_eq!(from_ntp_fraction(u32::MAX, Units::Microseconds), 1_000_000);
    }

    #[test]
    fn test_to_local_carries_rounded_fraction() {
        let ts = NtpTimestamp::from_parts(NTP_TIMESTAMP_DELTA + 5, u32::MAX);
        let local = ts.to_local(Units::Microseconds);

        assert_eq!(local, LocalTimestamp::new(6, 0, Units::Microseconds));
    }

    #[test]
    fn test_local_roundtrip() {
        let local = LocalTimestamp::new(1_700_000_000, 654_321, Units::Microseconds);
        let ts = NtpTimestamp::from_local(local);

        assert_eq!(ts.seconds(), 3_908_988_800);
        assert_eq!(ts.to_local(Units::Microseconds), local);
    }

    #[test]
    fn test_split_and_concatenate() {
        let ts = NtpTimestamp::from_parts(0xdead_beef, 0x0123_4567);

        assert_eq!(ts.to_bits(), 0xdead_beef_0123_4567);
        assert_eq!(ts.seconds(), 0xdead_beef);
        assert_eq!(ts.fraction(), 0x0123_4567);
        assert_eq!(NtpTimestamp::from_bits(ts.to_bits()), ts);
    }

    #[test]
    fn test_subtraction_borrows_across_halves() {
        // 1001.1s - 1000.9s, the fraction half alone would underflow
        let later = NtpTimestamp::from_parts(1001, to_ntp_fraction(100_000, Units::Microseconds));
        let earlier = NtpTimestamp::from_parts(1000, to_ntp_fraction(900_000, Units::Microseconds));

        assert_eq!((later - earlier).as_micros(), 200_000);
        assert_eq!((earlier - later).as_micros(), -200_000);
    }

    #[test]
    fn test_subtraction_across_era_rollover() {
        let before = NtpTimestamp::from_parts(u32::MAX, 0);
        let after = NtpTimestamp::from_parts(1, 0);

        assert_eq!((after - before).as_micros(), 2_000_000);
        assert_eq!(before + (after - before), after);
    }

    #[test]
    fn test_duration_split_for_negative_values() {
        let d = NtpDuration::from_units(-250, Units::Milliseconds);

        assert_eq!(d.seconds(), -1);
        assert_eq!(d.fraction(), 0xc000_0000);
        assert_eq!(d.as_millis(), -250);
        assert_eq!(d.as_nanos(), -250_000_000);
    }

    #[test]
    fn test_duration_display() {
        assert_eq!(
            NtpDuration::from_units(1_500_000, Units::Microseconds).to_string(),
            "1.500000000s"
        );
        assert_eq!(
            NtpDuration::from_units(-20, Units::Milliseconds).to_string(),
            "-0.020000000s"
        );
    }

    #[test]
    fn test_timestamp_display() {
        let ts = NtpTimestamp::from_parts(3_908_988_800, 0x8000_0000);

        assert_eq!(ts.to_string(), "3908988800.2147483648");
    }

    struct FixedClock {
        seconds: u64,
        micros: u32,
        reads: u32,
    }

    impl NtpTimestampGenerator for FixedClock {
        fn init(&mut self) {
            self.reads += 1;
        }

        fn timestamp_sec(&self) -> u64 {
            self.seconds
        }

        fn timestamp_subsec_micros(&self) -> u32 {
            self.micros
        }
    }

    #[test]
    fn test_now_reads_generator() {
        let mut clock = FixedClock {
            seconds: 1_000,
            micros: 500_000,
            reads: 0,
        };
        let ts = NtpTimestamp::now(&mut clock);

        assert_eq!(clock.reads, 1);
        assert_eq!(ts, NtpTimestamp::from_parts(NTP_TIMESTAMP_DELTA + 1_000, 0x8000_0000));
    }

    #[cfg(feature = "chrono")]
    #[test]
    fn test_to_datetime() {
        let ts = NtpTimestamp::from_parts(3_908_988_800, 0x8000_0000);
        let datetime = ts.to_datetime().expect("in range");

        assert_eq!(datetime.timestamp(), 1_700_000_000);
        assert_eq!(datetime.timestamp_subsec_millis(), 500);
    }
}
