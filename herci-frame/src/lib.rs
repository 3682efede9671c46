//! FLEXI/HERCI transfer-frame and minipacket codec.
//!
//! The FLEXI processor downlinks telemetry as a stream of fixed-sync
//! transfer frames; each frame carries zero or more self-describing
//! "minipackets" in its payload area. This crate decodes both layers:
//!
//! - [`frame`]: one transfer frame: sync pattern, CRC-CCITT, sequence,
//!   system time, epoch number and record length, all big-endian.
//! - [`minipacket`]: lazy extraction of the variable-length minipackets
//!   concatenated in a frame's payload.
//! - [`scan`]: resynchronizing frame scanner over a raw byte capture.
//!
//! Interpretation of minipacket *payloads* is type-specific and out of
//! scope here; callers dispatch on [`minipacket::Minipacket::packet_type`].

pub mod frame;
pub mod minipacket;
pub mod scan;

pub use crate::{
    frame::{
        DecodeError,
        EncodeError,
        Frame,
        Sequence,
        Source,
        SystemTime,
        HEADER_LENGTH,
        MAX_FRAME_LENGTH,
        SYNC_PATTERN,
    },
    minipacket::{
        minipackets,
        ExtractError,
        Minipacket,
        Minipackets,
        Msf,
        Segmentation,
    },
    scan::{
        FrameScanner,
        ScanStats,
    },
};
