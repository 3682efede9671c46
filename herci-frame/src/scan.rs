//! Resynchronizing frame scanner
//!
//! Downlink captures are plain byte streams: frames may be preceded by
//! noise, separated by garbage, or corrupted in flight. The scanner
//! hunts for the sync pattern, tries a bounded decode using the
//! candidate frame's own record length field, and on any frame-level
//! error resumes the hunt at the next byte. Corrupt frames are dropped
//! silently but counted, so callers can report discard diagnostics
//! without interrupting the stream.

use crate::frame::{
    DecodeError,
    Frame,
    HEADER_LENGTH,
    SYNC_PATTERN,
};

/// Discard diagnostics accumulated while scanning.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Valid frames yielded.
    pub frames: usize,
    /// Bytes passed over without finding a decodable frame.
    pub skipped_bytes: usize,
    /// Sync candidates rejected by the CRC check.
    pub crc_errors: usize,
    /// Sync candidates whose record length field was unusable.
    pub length_errors: usize,
}

/// Iterator over the valid frames in a byte capture.
#[derive(Clone, Debug)]
pub struct FrameScanner<'a> {
    buffer: &'a [u8],
    offset: usize,
    stats: ScanStats,
}

impl<'a> FrameScanner<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            offset: 0,
            stats: ScanStats::default(),
        }
    }

    pub fn stats(&self) -> &ScanStats {
        &self.stats
    }

    /// Skips the byte at the current offset and keeps hunting.
    fn resume_at_next_byte(&mut self) {
        self.offset += 1;
        self.stats.skipped_bytes += 1;
    }
}

impl Iterator for FrameScanner<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        loop {
            let remaining = &self.buffer[self.offset..];
            if remaining.len() < HEADER_LENGTH {
                self.stats.skipped_bytes += remaining.len();
                self.offset = self.buffer.len();
                return None;
            }

            if remaining[..4] != SYNC_PATTERN {
                self.resume_at_next_byte();
                continue;
            }

            let record_length =
                usize::from(u16::from_be_bytes([remaining[14], remaining[15]]));
            if record_length < HEADER_LENGTH || record_length > remaining.len() {
                tracing::debug!(
                    offset = self.offset,
                    record_length,
                    "sync candidate with unusable record length"
                );
                self.stats.length_errors += 1;
                self.resume_at_next_byte();
                continue;
            }

            match Frame::decode(&remaining[..record_length]) {
                Ok(frame) => {
                    self.offset += record_length;
                    self.stats.frames += 1;
                    return Some(frame);
                }
                Err(error) => {
                    tracing::debug!(offset = self.offset, %error, "discarding frame");
                    match error {
                        DecodeError::CrcMismatch { .. } => self.stats.crc_errors += 1,
                        _ => self.stats.length_errors += 1,
                    }
                    self.resume_at_next_byte();
                }
            }
        }
    }
}
