use crate::error::{Error, Result};
use crate::timestamp::NtpTimestamp;

#[cfg(feature = "log")]
use crate::logging::debug;

/// Size of an NTP packet without extension fields or MAC
pub const NTP_PACKET_SIZE: usize = 48;
/// Receive buffer size: anything longer than a bare header still reports its real length
pub(crate) const RECV_BUFFER_SIZE: usize = 128;

/// Mode value bit mask
pub(crate) const MODE_MASK: u8 = 0b0000_0111;
/// Mode bit mask shift value
pub(crate) const MODE_SHIFT: u8 = 0;
/// Version value bit mask
pub(crate) const VERSION_MASK: u8 = 0b0011_1000;
/// Version bit mask shift value
pub(crate) const VERSION_SHIFT: u8 = 3;
/// LI (leap indicator) bit mask value
pub(crate) const LI_MASK: u8 = 0b1100_0000;
/// LI bit mask shift value
pub(crate) const LI_SHIFT: u8 = 6;

/// NTP association modes
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NtpMode {
    Reserved = 0,
    SymmetricActive = 1,
    SymmetricPassive = 2,
    Client = 3,
    Server = 4,
    Broadcast = 5,
    Control = 6,
    ReservedPrivate = 7,
}

impl From<u8> for NtpMode {
    /// Only the low three bits are considered
    fn from(value: u8) -> Self {
        match value & MODE_MASK {
            0 => NtpMode::Reserved,
            1 => NtpMode::SymmetricActive,
            2 => NtpMode::SymmetricPassive,
            3 => NtpMode::Client,
            4 => NtpMode::Server,
            5 => NtpMode::Broadcast,
            6 => NtpMode::Control,
            _ => NtpMode::ReservedPrivate,
        }
    }
}

/// Pack leap indicator, version and mode into the first header byte
#[must_use]
pub const fn pack_li_vn_mode(leap: u8, version: u8, mode: NtpMode) -> u8 {
    ((leap << LI_SHIFT) & LI_MASK)
        | ((version << VERSION_SHIFT) & VERSION_MASK)
        | ((mode as u8) << MODE_SHIFT)
}

fn shifter(val: u8, mask: u8, shift: u8) -> u8 {
    (val & mask) >> shift
}

/// The 48-byte NTP header with every multi-byte field in host order
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct NtpPacket {
    pub li_vn_mode: u8,
    pub stratum: u8,
    pub poll: i8,
    pub precision: i8,
    pub root_delay: u32,
    pub root_dispersion: u32,
    pub reference_id: u32,
    pub reference_timestamp: NtpTimestamp,
    pub originate_timestamp: NtpTimestamp,
    pub receive_timestamp: NtpTimestamp,
    pub transmit_timestamp: NtpTimestamp,
}

impl NtpPacket {
    /// Version the client announces in its requests
    pub const CLIENT_VERSION: u8 = 3;

    /// A client request: leap indicator 0, version 3, mode 3, every other field zero
    #[must_use]
    pub fn client_request() -> Self {
        NtpPacket {
            li_vn_mode: pack_li_vn_mode(0, NtpPacket::CLIENT_VERSION, NtpMode::Client),
            ..NtpPacket::default()
        }
    }

    #[must_use]
    pub fn leap(&self) -> u8 {
        shifter(self.li_vn_mode, LI_MASK, LI_SHIFT)
    }

    #[must_use]
    pub fn version(&self) -> u8 {
        shifter(self.li_vn_mode, VERSION_MASK, VERSION_SHIFT)
    }

    #[must_use]
    pub fn mode(&self) -> NtpMode {
        NtpMode::from(shifter(self.li_vn_mode, MODE_MASK, MODE_SHIFT))
    }

    /// Serialize every field big-endian, in declaration order, without padding
    #[must_use]
    pub fn encode(&self) -> RawNtpPacket {
        RawNtpPacket::from(self)
    }

    /// Deserialize a packet from exactly [`NTP_PACKET_SIZE`] big-endian bytes
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedPacket`] if `buf` has any other length
    pub fn decode(buf: &[u8]) -> Result<Self> {
        NtpPacket::try_from(buf)
    }
}

/// Wire image of an [`NtpPacket`]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RawNtpPacket(pub [u8; NTP_PACKET_SIZE]);

impl Default for RawNtpPacket {
    fn default() -> Self {
        RawNtpPacket([0u8; NTP_PACKET_SIZE])
    }
}

impl AsRef<[u8]> for RawNtpPacket {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

fn be_u32(buf: &[u8; NTP_PACKET_SIZE], at: usize) -> u32 {
    u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn be_timestamp(buf: &[u8; NTP_PACKET_SIZE], at: usize) -> NtpTimestamp {
    NtpTimestamp::from_parts(be_u32(buf, at), be_u32(buf, at + 4))
}

impl From<&RawNtpPacket> for NtpPacket {
    #[allow(clippy::cast_possible_wrap)]
    fn from(raw: &RawNtpPacket) -> Self {
        let buf = &raw.0;

        NtpPacket {
            li_vn_mode: buf[0],
            stratum: buf[1],
            poll: buf[2] as i8,
            precision: buf[3] as i8,
            root_delay: be_u32(buf, 4),
            root_dispersion: be_u32(buf, 8),
            reference_id: be_u32(buf, 12),
            reference_timestamp: be_timestamp(buf, 16),
            originate_timestamp: be_timestamp(buf, 24),
            receive_timestamp: be_timestamp(buf, 32),
            transmit_timestamp: be_timestamp(buf, 40),
        }
    }
}

impl TryFrom<&[u8]> for NtpPacket {
    type Error = Error;

    fn try_from(buf: &[u8]) -> Result<Self> {
        let raw = <[u8; NTP_PACKET_SIZE]>::try_from(buf)
            .map_err(|_| Error::MalformedPacket { len: buf.len() })?;

        Ok(NtpPacket::from(&RawNtpPacket(raw)))
    }
}

impl From<&NtpPacket> for RawNtpPacket {
    #[allow(clippy::cast_sign_loss)]
    fn from(val: &NtpPacket) -> Self {
        let mut tmp_buf = [0u8; NTP_PACKET_SIZE];

        tmp_buf[0] = val.li_vn_mode;
        tmp_buf[1] = val.stratum;
        tmp_buf[2] = val.poll as u8;
        tmp_buf[3] = val.precision as u8;
        tmp_buf[4..8].copy_from_slice(&val.root_delay.to_be_bytes());
        tmp_buf[8..12].copy_from_slice(&val.root_dispersion.to_be_bytes());
        tmp_buf[12..16].copy_from_slice(&val.reference_id.to_be_bytes());
        tmp_buf[16..24].copy_from_slice(&val.reference_timestamp.to_bits().to_be_bytes());
        tmp_buf[24..32].copy_from_slice(&val.originate_timestamp.to_bits().to_be_bytes());
        tmp_buf[32..40].copy_from_slice(&val.receive_timestamp.to_bits().to_be_bytes());
        tmp_buf[40..48].copy_from_slice(&val.transmit_timestamp.to_bits().to_be_bytes());

        RawNtpPacket(tmp_buf)
    }
}

#[cfg(feature = "log")]
pub(crate) fn debug_ntp_packet(packet: &NtpPacket, destination: NtpTimestamp) {
    const DELIMITER: &str =
        "================================================================";

    debug!("{}", DELIMITER);
    debug!("| Mode:\t\t{:?}", packet.mode());
    debug!("| Version:\t{}", packet.version());
    debug!("| Leap:\t\t{}", packet.leap());
    debug!("| Stratum:\t{}", packet.stratum);
    debug!("| Poll:\t\t{}", packet.poll);
    debug!("| Precision:\t\t{}", packet.precision);
    debug!("| Root delay:\t\t{}", packet.root_delay);
    debug!("| Root dispersion:\t{}", packet.root_dispersion);
    debug!(
        "| Reference ID:\t\t{}",
        core::str::from_utf8(&packet.reference_id.to_be_bytes()).unwrap_or("")
    );
    debug!(
        "| Origin timestamp    (echoed):\t{:>21}",
        packet.originate_timestamp
    );
    debug!(
        "| Receive timestamp   (server):\t{:>21}",
        packet.receive_timestamp
    );
    debug!(
        "| Transmit timestamp  (server):\t{:>21}",
        packet.transmit_timestamp
    );
    debug!("| Receive timestamp   (client):\t{:>21}", destination);
    debug!(
        "| Reference timestamp (server):\t{:>21}",
        packet.reference_timestamp
    );
    debug!("{}", DELIMITER);
}

#[cfg(not(feature = "log"))]
pub(crate) fn debug_ntp_packet(_packet: &NtpPacket, _destination: NtpTimestamp) {}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bytes() -> [u8; NTP_PACKET_SIZE] {
        let mut buf = [0u8; NTP_PACKET_SIZE];

        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = u8::try_from(i).unwrap() * 5 + 1;
        }

        buf
    }

    #[test]
    fn test_client_request_layout() {
        let raw = NtpPacket::client_request().encode();

        assert_eq!(raw.0[0], 0x1b);
        assert!(raw.0[1..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_li_vn_mode_packing() {
        assert_eq!(pack_li_vn_mode(0, 4, NtpMode::Server), 0x24);
        assert_eq!(pack_li_vn_mode(0, 3, NtpMode::Client), 0x1b);
        assert_eq!(pack_li_vn_mode(3, 4, NtpMode::Client), 0xe3);

        let packet = NtpPacket {
            li_vn_mode: 0xe3,
            ..NtpPacket::default()
        };

        assert_eq!(packet.leap(), 3);
        assert_eq!(packet.version(), 4);
        assert_eq!(packet.mode(), NtpMode::Client);
    }

    #[test]
    fn test_decode_reads_big_endian() {
        let mut buf = [0u8; NTP_PACKET_SIZE];
        buf[0] = 0x24;
        buf[1] = 2;
        buf[2] = 16;
        buf[3] = 0xec;
        buf[4..8].copy_from_slice(&[0x00, 0x00, 0x01, 0x02]);
        buf[12..16].copy_from_slice(b"LOCL");
        buf[32..40].copy_from_slice(&[0xe9, 0x00, 0x00, 0x01, 0x80, 0x00, 0x00, 0x00]);

        let packet = NtpPacket::decode(&buf).unwrap();

        assert_eq!(packet.mode(), NtpMode::Server);
        assert_eq!(packet.version(), 4);
        assert_eq!(packet.stratum, 2);
        assert_eq!(packet.poll, 16);
        assert_eq!(packet.precision, -20);
        assert_eq!(packet.root_delay, 0x0102);
        assert_eq!(packet.reference_id, u32::from_be_bytes(*b"LOCL"));
        assert_eq!(
            packet.receive_timestamp,
            NtpTimestamp::from_parts(0xe900_0001, 0x8000_0000)
        );
    }

    #[test]
    fn test_encode_writes_big_endian() {
        let packet = NtpPacket {
            li_vn_mode: 0x24,
            stratum: 2,
            poll: 16,
            precision: -1,
            root_delay: 0x0102_0304,
            root_dispersion: 0x0506_0708,
            reference_id: 0x090a_0b0c,
            reference_timestamp: NtpTimestamp::from_bits(0x1112_1314_1516_1718),
            originate_timestamp: NtpTimestamp::from_bits(0x2122_2324_2526_2728),
            receive_timestamp: NtpTimestamp::from_bits(0x3132_3334_3536_3738),
            transmit_timestamp: NtpTimestamp::from_bits(0x4142_4344_4546_4748),
        };
        let raw = packet.encode();

        assert_eq!(&raw.0[..4], &[0x24, 2, 16, 0xff]);
        assert_eq!(&raw.0[4..8], &[1, 2, 3, 4]);
        assert_eq!(&raw.0[8..12], &[5, 6, 7, 8]);
        assert_eq!(&raw.0[12..16], &[9, 10, 11, 12]);
        assert_eq!(&raw.0[16..24], &[0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18]);
        assert_eq!(&raw.0[24..32], &[0x21, 0x22, 0x23, 0x24, 0x25, 0x26, 0x27, 0x28]);
        assert_eq!(&raw.0[32..40], &[0x31, 0x32, 0x33, 0x34, 0x35, 0x36, 0x37, 0x38]);
        assert_eq!(&raw.0[40..48], &[0x41, 0x42, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48]);
        assert_eq!(NtpPacket::decode(&raw.0).unwrap(), packet);
    }

    #[test]
    fn test_decode_then_encode_is_identity() {
        let buf = sample_bytes();
        let packet = NtpPacket::decode(&buf).unwrap();

        assert_eq!(packet.encode().0, buf);
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        let buf = [0u8; 64];

        for len in [0, 1, 47, 49, 64] {
            assert_eq!(
                NtpPacket::decode(&buf[..len]),
                Err(Error::MalformedPacket { len })
            );
        }
    }
}
