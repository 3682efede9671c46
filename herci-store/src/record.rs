//! Payload records and their line-oriented persistence format.
//!
//! One record is one line in the log:
//!
//! ```plain
//! date,spacecraftId,resetCount,uptime,typeCode,value0,value1,...,valueN
//! ```
//!
//! Comma-delimited, no header row, no trailing delimiter. The first five
//! tokens are fixed; everything after them is the record's decoded field
//! values, whose count and meaning depend on the type code.

use std::{
    fmt,
    str::FromStr,
};

use herci_frame::Frame;

/// Number of fixed leading tokens in a record line.
const FIXED_FIELDS: usize = 5;

/// Field count of a HERCI high-speed record: the full transfer frame,
/// zero-padded to the maximum frame length.
pub const HERCI_HS_FIELD_COUNT: usize = herci_frame::MAX_FRAME_LENGTH;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("record line has {count} tokens, at least {FIXED_FIELDS} required")]
    MalformedLine { count: usize },

    #[error("invalid integer in record token {index}: {value:?}")]
    InvalidNumber { index: usize, value: String },

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

/// Identifier of the host spacecraft a record came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpacecraftId(u16);

impl SpacecraftId {
    pub const fn from_u16(id: u16) -> Self {
        Self(id)
    }

    pub const fn as_u16(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for SpacecraftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid spacecraft id: {value:?}")]
pub struct SpacecraftIdFromStrError {
    pub value: String,
}

impl FromStr for SpacecraftId {
    type Err = SpacecraftIdFromStrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse()
            .map(Self)
            .map_err(|_| SpacecraftIdFromStrError { value: s.to_owned() })
    }
}

/// Type code identifying a record's payload kind and field layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordType(u16);

impl RecordType {
    pub const REAL_TIME: Self = Self(0);
    pub const MAX_VALUES: Self = Self(1);
    pub const MIN_VALUES: Self = Self(2);
    pub const RAD_EXP_DATA: Self = Self(400);
    pub const HERCI_HIGH_SPEED: Self = Self(600);
    pub const HERCI_SCIENCE_HEADER: Self = Self(700);

    pub const fn from_u16(code: u16) -> Self {
        Self(code)
    }

    pub const fn as_u16(&self) -> u16 {
        self.0
    }

    /// Fixed field count for types with a fixed-width layout.
    pub const fn field_count(&self) -> Option<usize> {
        match self.0 {
            600 => Some(HERCI_HS_FIELD_COUNT),
            _ => None,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("encoded frame is {length} bytes, larger than the {HERCI_HS_FIELD_COUNT} value record layout")]
pub struct FrameTooLong {
    pub length: usize,
}

/// One decoded, persistable payload record.
///
/// Immutable once created; the store never rewrites a saved record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PayloadRecord {
    /// Wall-clock stamp taken when the frame was captured. Kept as an
    /// opaque string so the log round-trips exactly.
    pub capture_date: String,
    pub id: SpacecraftId,
    pub resets: u32,
    pub uptime: u64,
    pub record_type: RecordType,
    pub fields: Vec<i32>,
}

impl PayloadRecord {
    /// Builds a HERCI high-speed record from a decoded transfer frame.
    ///
    /// The reset count and uptime come from the frame's own epoch number
    /// and system time; the field values are the re-encoded frame bytes
    /// zero-padded to the fixed layout width.
    pub fn from_frame(
        frame: &Frame,
        id: SpacecraftId,
        capture_date: String,
    ) -> Result<Self, FrameTooLong> {
        let bytes = frame.encode().map_err(|_| {
            FrameTooLong {
                length: frame.record_length(),
            }
        })?;
        if bytes.len() > HERCI_HS_FIELD_COUNT {
            return Err(FrameTooLong {
                length: bytes.len(),
            });
        }

        let mut fields = vec![0; HERCI_HS_FIELD_COUNT];
        for (field, byte) in fields.iter_mut().zip(&bytes) {
            *field = i32::from(*byte);
        }

        Ok(Self {
            capture_date,
            id,
            resets: u32::from(frame.epoch),
            uptime: u64::from(frame.system_time.seconds()),
            record_type: RecordType::HERCI_HIGH_SPEED,
            fields,
        })
    }

    /// Sort key within a store: reset count, then uptime.
    pub(crate) fn sort_key(&self) -> (u32, u64) {
        (self.resets, self.uptime)
    }

    /// Whether this record carries the given store key.
    pub fn matches(&self, id: SpacecraftId, uptime: u64, resets: u32) -> bool {
        self.id == id && self.uptime == uptime && self.resets == resets
    }

    pub(crate) fn csv_fields(&self) -> Vec<String> {
        let mut fields = Vec::with_capacity(FIXED_FIELDS + self.fields.len());
        fields.push(self.capture_date.clone());
        fields.push(self.id.to_string());
        fields.push(self.resets.to_string());
        fields.push(self.uptime.to_string());
        fields.push(self.record_type.to_string());
        fields.extend(self.fields.iter().map(|value| value.to_string()));
        fields
    }

    /// Serializes the record to one log line, without the trailing
    /// newline.
    pub fn to_line(&self) -> String {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        writer
            .write_record(self.csv_fields())
            .expect("write into a Vec cannot fail");
        let bytes = writer.into_inner().expect("flush into a Vec cannot fail");
        let mut line = String::from_utf8(bytes).expect("csv output is utf-8");
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        line
    }

    /// Deserializes a record from an already tokenized log line.
    pub fn from_csv_record(record: &csv::StringRecord) -> Result<Self, ParseError> {
        if record.len() < FIXED_FIELDS {
            return Err(ParseError::MalformedLine {
                count: record.len(),
            });
        }

        let capture_date = record[0].to_owned();
        let id = SpacecraftId::from_u16(parse_token(record, 1)?);
        let resets = parse_token(record, 2)?;
        let uptime = parse_token(record, 3)?;
        let record_type = RecordType::from_u16(parse_token(record, 4)?);
        let fields = (FIXED_FIELDS..record.len())
            .map(|index| parse_token(record, index))
            .collect::<Result<Vec<i32>, _>>()?;

        Ok(Self {
            capture_date,
            id,
            resets,
            uptime,
            record_type,
            fields,
        })
    }

    /// Deserializes a record from one log line.
    pub fn from_line(line: &str) -> Result<Self, ParseError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(line.as_bytes());
        let mut record = csv::StringRecord::new();
        if !reader.read_record(&mut record)? {
            return Err(ParseError::MalformedLine { count: 0 });
        }
        Self::from_csv_record(&record)
    }
}

fn parse_token<T: FromStr>(
    record: &csv::StringRecord,
    index: usize,
) -> Result<T, ParseError> {
    record[index].trim().parse().map_err(|_| {
        ParseError::InvalidNumber {
            index,
            value: record[index].to_owned(),
        }
    })
}
