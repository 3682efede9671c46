//! Payload time-series store for decoded HERCI telemetry.
//!
//! Decoded transfer frames become flat [`PayloadRecord`]s keyed by
//! `(spacecraft id, reset count, uptime)` and persist in an append-only,
//! line-oriented log. The in-memory sequence is kept sorted by
//! `(resets, uptime)` with duplicate keys rejected, which gives the
//! nearest-key and windowed queries the displays poll for.
//!
//! Which spacecraft ids are valid is not this crate's business: callers
//! supply a [`SpacecraftRegistry`] predicate, and a log that mentions an
//! unknown id fails the whole load (see [`StoreError::UnknownSpacecraft`]).

pub mod record;
pub mod registry;
pub mod store;

pub use crate::{
    record::{
        ParseError,
        PayloadRecord,
        RecordType,
        SpacecraftId,
        HERCI_HS_FIELD_COUNT,
    },
    registry::{
        SpacecraftRegistry,
        SpacecraftSet,
    },
    store::{
        PayloadStore,
        StoreError,
    },
};
