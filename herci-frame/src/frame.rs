//! Transfer frame codec
//!
//! Wire layout, all header fields big-endian:
//!
//! ```plain
//! offset  size  field
//! 0       4     sync pattern FA F3 34 03
//! 4       2     CRC-CCITT-16, seed 0, over bytes[6..]
//! 6       2     sequence: bits 15-14 source, bits 13-0 frame count
//! 8       4     system time: bits 31-1 seconds, bit 0 quality flag
//! 12      2     epoch number (1..=32767, counts host resets)
//! 14      2     record length (total frame bytes, sync through fill)
//! 16      n     payload: concatenated minipackets
//! ```
//!
//! The record length covers the whole frame including the sync pattern
//! and any fill bytes, so a decoded buffer must be exactly that long.

use bytes::Buf;

/// Frame synchronization pattern.
///
/// Every transfer frame starts with these four bytes, which lets the
/// telemetry channel be treated as a plain byte stream without any outer
/// framing layer.
pub const SYNC_PATTERN: [u8; 4] = [0xfa, 0xf3, 0x34, 0x03];

/// Length of the fixed frame header, sync pattern through record length.
pub const HEADER_LENGTH: usize = 16;

/// Maximum length of a high-speed transfer frame in bytes.
pub const MAX_FRAME_LENGTH: usize = 868;

/// Largest valid epoch number.
pub const MAX_EPOCH: u16 = 0x7fff;

/// CRC-CCITT-16 as used on the FLEXI telemetry channels: polynomial
/// 0x1021 processed MSB-first per byte, seed 0x0000, no final xor.
const CRC_16: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_XMODEM);

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("buffer is {buffer_length} bytes, frame header needs {HEADER_LENGTH}")]
    Truncated { buffer_length: usize },

    #[error("sync pattern mismatch: found {found:02x?}")]
    SyncMismatch { found: [u8; 4] },

    #[error("CRC mismatch: stored {stored:#06x}, computed {computed:#06x}")]
    CrcMismatch { stored: u16, computed: u16 },

    #[error("record length field is {record_length}, but buffer is {buffer_length} bytes")]
    LengthMismatch {
        record_length: u16,
        buffer_length: usize,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("payload of {payload_length} bytes doesn't fit the record length field")]
    PayloadTooLong { payload_length: usize },
}

/// One decoded transfer frame.
///
/// The CRC is not stored: it is recomputed on [`encode`][Self::encode],
/// and a [`decode`][Self::decode] only succeeds when the stored and
/// recomputed values agree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub sequence: Sequence,
    pub system_time: SystemTime,
    pub epoch: u16,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Decodes one transfer frame from `buffer`.
    ///
    /// `buffer` must hold exactly one frame: the record length field has
    /// to match the buffer length. Checks run cheapest-first (sync
    /// pattern, then CRC, then record length), so a scanner hunting for
    /// frame boundaries fails fast on garbage.
    pub fn decode(buffer: &[u8]) -> Result<Self, DecodeError> {
        if buffer.len() < HEADER_LENGTH {
            return Err(DecodeError::Truncated {
                buffer_length: buffer.len(),
            });
        }

        if buffer[..4] != SYNC_PATTERN {
            return Err(DecodeError::SyncMismatch {
                found: buffer[..4].try_into().expect("slice of length 4"),
            });
        }

        let stored = u16::from_be_bytes([buffer[4], buffer[5]]);
        let computed = CRC_16.checksum(&buffer[6..]);
        if stored != computed {
            return Err(DecodeError::CrcMismatch { stored, computed });
        }

        let mut header = &buffer[6..HEADER_LENGTH];
        let sequence = Sequence::from_u16(header.get_u16());
        let system_time = SystemTime::from_u32(header.get_u32());
        let epoch = header.get_u16();
        let record_length = header.get_u16();

        if usize::from(record_length) != buffer.len() {
            return Err(DecodeError::LengthMismatch {
                record_length,
                buffer_length: buffer.len(),
            });
        }

        Ok(Self {
            sequence,
            system_time,
            epoch,
            payload: buffer[HEADER_LENGTH..].to_vec(),
        })
    }

    /// Encodes the frame, recomputing the CRC.
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let record_length = HEADER_LENGTH + self.payload.len();
        let record_length = u16::try_from(record_length).map_err(|_| {
            EncodeError::PayloadTooLong {
                payload_length: self.payload.len(),
            }
        })?;

        let mut buffer = Vec::with_capacity(usize::from(record_length));
        buffer.extend_from_slice(&SYNC_PATTERN);
        buffer.extend_from_slice(&[0, 0]);
        buffer.extend_from_slice(&self.sequence.as_u16().to_be_bytes());
        buffer.extend_from_slice(&self.system_time.as_u32().to_be_bytes());
        buffer.extend_from_slice(&self.epoch.to_be_bytes());
        buffer.extend_from_slice(&record_length.to_be_bytes());
        buffer.extend_from_slice(&self.payload);

        let crc = CRC_16.checksum(&buffer[6..]);
        buffer[4..6].copy_from_slice(&crc.to_be_bytes());

        Ok(buffer)
    }

    /// Total length of the encoded frame in bytes.
    pub fn record_length(&self) -> usize {
        HEADER_LENGTH + self.payload.len()
    }

    /// Whether the epoch number is in its valid range.
    pub fn epoch_in_range(&self) -> bool {
        self.epoch >= 1 && self.epoch <= MAX_EPOCH
    }
}

/// Telemetry source that produced a frame.
///
/// Encoded in the top two bits of the sequence field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Source {
    /// Flight software failed to load.
    Panic,
    /// High-rate synchronous channel (unused by HERCI).
    HighRate,
    /// Low-rate science telemetry.
    Science,
    /// Housekeeping telemetry.
    Housekeeping,
}

impl Source {
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => Self::Panic,
            0b01 => Self::HighRate,
            0b10 => Self::Science,
            _ => Self::Housekeeping,
        }
    }

    pub const fn as_bits(self) -> u8 {
        match self {
            Self::Panic => 0b00,
            Self::HighRate => 0b01,
            Self::Science => 0b10,
            Self::Housekeeping => 0b11,
        }
    }
}

/// 16-bit sequence field: source in bits 15-14, monotonically increasing
/// frame count in bits 13-0 (wraps mod 16384).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Sequence(u16);

impl Sequence {
    pub fn new(source: Source, frame_count: u16) -> Self {
        Self((u16::from(source.as_bits()) << 14) | (frame_count & 0x3fff))
    }

    pub const fn from_u16(word: u16) -> Self {
        Self(word)
    }

    pub const fn as_u16(&self) -> u16 {
        self.0
    }

    pub const fn source(&self) -> Source {
        Source::from_bits((self.0 >> 14) as u8)
    }

    pub const fn frame_count(&self) -> u16 {
        self.0 & 0x3fff
    }
}

/// Sub-second tick period of the host's real-time interrupt.
pub const TICK_MILLIS: u32 = 25;

/// Sub-second ticks per second.
pub const TICKS_PER_SECOND: u16 = 40;

/// 32-bit system time field: seconds since an arbitrary epoch in bits
/// 31-1, time-quality flag in bit 0.
///
/// The quality flag is set when the host hasn't received a recent time
/// update message, marking the seconds value as suspect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SystemTime(u32);

impl SystemTime {
    pub fn new(seconds: u32, suspect: bool) -> Self {
        Self(((seconds & 0x7fff_ffff) << 1) | suspect as u32)
    }

    pub const fn from_u32(word: u32) -> Self {
        Self(word)
    }

    pub const fn as_u32(&self) -> u32 {
        self.0
    }

    /// 31-bit seconds since the current epoch began.
    pub const fn seconds(&self) -> u32 {
        self.0 >> 1
    }

    /// Whether time is suspect (no recent time sync from the host).
    pub const fn suspect(&self) -> bool {
        self.0 & 1 != 0
    }

    /// Truncated timetag carried by minipackets generated at this time.
    ///
    /// `rti` is the current sub-second tick, 0..=39 at a 25 ms rate:
    /// `(seconds & 0x3FF) * 40 + rti`.
    pub fn truncated_time(&self, rti: u8) -> u16 {
        (self.seconds() & 0x3ff) as u16 * TICKS_PER_SECOND + u16::from(rti)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_frame() -> Frame {
        Frame {
            sequence: Sequence::new(Source::Science, 1234),
            system_time: SystemTime::new(0x12345678 >> 1, false),
            epoch: 17,
            payload: vec![0x01, 0x02, 0x03, 0x04, 0x00, 0x00],
        }
    }

    #[test]
    fn it_matches_the_ccitt_test_vector() {
        assert_eq!(CRC_16.checksum(b"123456789"), 0x31c3);
    }

    #[test]
    fn it_round_trips_a_frame() {
        let frame = test_frame();
        let bytes = frame.encode().unwrap();
        assert_eq!(bytes.len(), frame.record_length());
        assert_eq!(bytes[..4], SYNC_PATTERN);

        let decoded = Frame::decode(&bytes).unwrap();
        assert_eq!(decoded, frame);
        // re-encoding reproduces the identical bytes, CRC included
        assert_eq!(decoded.encode().unwrap(), bytes);
    }

    #[test]
    fn it_rejects_a_short_buffer() {
        let error = Frame::decode(&[0xfa, 0xf3, 0x34, 0x03, 0, 0]).unwrap_err();
        assert!(matches!(
            error,
            DecodeError::Truncated { buffer_length: 6 }
        ));
    }

    #[test]
    fn it_rejects_a_bad_sync_pattern() {
        let mut bytes = test_frame().encode().unwrap();
        bytes[0] = 0xff;
        assert!(matches!(
            Frame::decode(&bytes).unwrap_err(),
            DecodeError::SyncMismatch { .. }
        ));
    }

    #[test]
    fn it_rejects_a_corrupted_frame() {
        let mut bytes = test_frame().encode().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x40;
        assert!(matches!(
            Frame::decode(&bytes).unwrap_err(),
            DecodeError::CrcMismatch { .. }
        ));
    }

    #[test]
    fn it_rejects_a_record_length_mismatch() {
        let mut bytes = test_frame().encode().unwrap();
        // tamper with the record length, then re-seal the CRC so the
        // length check is what trips
        let wrong = (bytes.len() as u16 + 2).to_be_bytes();
        bytes[14..16].copy_from_slice(&wrong);
        let crc = CRC_16.checksum(&bytes[6..]).to_be_bytes();
        bytes[4..6].copy_from_slice(&crc);
        assert!(matches!(
            Frame::decode(&bytes).unwrap_err(),
            DecodeError::LengthMismatch { .. }
        ));
    }

    #[test]
    fn it_splits_the_sequence_field() {
        let sequence = Sequence::from_u16(0b10_00000000000101);
        assert_eq!(sequence.source(), Source::Science);
        assert_eq!(sequence.frame_count(), 5);

        let sequence = Sequence::new(Source::Housekeeping, 16384 + 7);
        assert_eq!(sequence.source(), Source::Housekeeping);
        assert_eq!(sequence.frame_count(), 7);
    }

    #[test]
    fn it_splits_the_system_time_field() {
        let time = SystemTime::from_u32(0x0000_0205);
        assert_eq!(time.seconds(), 0x102);
        assert!(time.suspect());
        assert_eq!(SystemTime::new(0x102, true), time);
    }

    #[test]
    fn it_derives_the_truncated_time() {
        let time = SystemTime::new(0x3ff, false);
        assert_eq!(time.truncated_time(39), 1023 * 40 + 39);

        // only the low ten bits of the seconds count contribute
        let time = SystemTime::new(0x1400 + 3, false);
        assert_eq!(time.truncated_time(0), 3 * 40);
    }
}
