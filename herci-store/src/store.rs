//! Ordered, deduplicated, append-only payload store.
//!
//! One store instance owns one log file and the in-memory sequence
//! loaded from it. The sequence is sorted ascending by
//! `(resets, uptime)`; a record whose `(id, resets, uptime)` key is
//! already present is rejected rather than overwritten. All operations
//! are synchronized through a single mutex covering both the sequence
//! and the log, so a writer thread and polling readers always observe a
//! consistent snapshot.

use std::{
    fs::{
        File,
        OpenOptions,
    },
    io::{
        BufReader,
        Write,
    },
    path::{
        Path,
        PathBuf,
    },
    sync::atomic::{
        AtomicBool,
        Ordering,
    },
};

use parking_lot::Mutex;

use crate::{
    record::{
        ParseError,
        PayloadRecord,
        SpacecraftId,
    },
    registry::SpacecraftRegistry,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error("spacecraft id {id} is not configured in the registry")]
    UnknownSpacecraft { id: SpacecraftId },
}

/// Flat-file time-series store for one payload type of one spacecraft.
///
/// A value of this type only exists after a successful
/// [`load`][Self::load]; [`remove`][Self::remove] consumes it, so an
/// initialized store is always usable.
#[derive(Debug)]
pub struct PayloadStore {
    path: PathBuf,
    records: Mutex<Vec<PayloadRecord>>,
    updated: AtomicBool,
}

impl PayloadStore {
    /// Loads a store from its log file, creating the file if it doesn't
    /// exist yet.
    ///
    /// Malformed lines (typically a final line torn by a crash mid
    /// append) are skipped and counted, never fatal: every line is
    /// self-contained, so prior records stay intact. A record naming a
    /// spacecraft the registry doesn't know is a configuration error
    /// that fails the whole load; proceeding would misinterpret every
    /// subsequent record.
    pub fn load<R: SpacecraftRegistry>(
        path: impl Into<PathBuf>,
        registry: &R,
    ) -> Result<Self, StoreError> {
        let path = path.into();
        if !path.exists() {
            File::create(&path)?;
            tracing::debug!(path = %path.display(), "created empty payload log");
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(BufReader::new(File::open(&path)?));

        let mut records: Vec<PayloadRecord> = Vec::new();
        let mut skipped = 0usize;

        for result in reader.records() {
            let raw = match result {
                Ok(raw) => raw,
                Err(error) => {
                    tracing::warn!(%error, "skipping unreadable log line");
                    skipped += 1;
                    continue;
                }
            };
            if raw.len() == 1 && raw[0].is_empty() {
                // blank line
                continue;
            }

            let record = match PayloadRecord::from_csv_record(&raw) {
                Ok(record) => record,
                Err(error @ (ParseError::MalformedLine { .. } | ParseError::InvalidNumber { .. })) => {
                    tracing::warn!(%error, "skipping malformed log line");
                    skipped += 1;
                    continue;
                }
                Err(ParseError::Csv(error)) => return Err(error.into()),
            };

            if !registry.is_known(record.id) {
                return Err(StoreError::UnknownSpacecraft { id: record.id });
            }

            insert_sorted(&mut records, record);
        }

        if skipped > 0 {
            tracing::warn!(
                path = %path.display(),
                skipped,
                "payload log contained unusable lines"
            );
        }

        Ok(Self {
            path,
            records: Mutex::new(records),
            updated: AtomicBool::new(true),
        })
    }

    /// Saves a new record: appends it to the log and inserts it into the
    /// sorted sequence.
    ///
    /// Returns `Ok(false)` without touching the log when a record with
    /// the same `(id, resets, uptime)` key is already present. The line
    /// is flushed and synced before the in-memory insert, so a record
    /// is never visible to readers without being durable.
    pub fn save(&self, record: PayloadRecord) -> Result<bool, StoreError> {
        let mut records = self.records.lock();

        if has_frame(&records, record.id, record.uptime, record.resets) {
            tracing::debug!(
                id = %record.id,
                resets = record.resets,
                uptime = record.uptime,
                "duplicate record, not saved"
            );
            return Ok(false);
        }

        self.append(&record)?;
        insert_sorted(&mut records, record);
        self.updated.store(true, Ordering::Release);
        Ok(true)
    }

    /// Appends one serialized record line to the log file. The handle is
    /// scoped to this call: flushed, synced and closed on every path.
    fn append(&self, record: &PayloadRecord) -> Result<(), StoreError> {
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)?;
        writeln!(file, "{}", record.to_line())?;
        file.flush()?;
        file.sync_data()?;
        Ok(())
    }

    /// Whether a record with this key is already stored.
    pub fn has_frame(&self, id: SpacecraftId, uptime: u64, resets: u32) -> bool {
        has_frame(&self.records.lock(), id, uptime, resets)
    }

    /// Index of the record of `id` closest at or before
    /// `(resets, uptime)`. An exact match wins; with none, the nearest
    /// earlier record; `None` when the spacecraft has no record at or
    /// before the target.
    pub fn nearest_index(
        &self,
        id: SpacecraftId,
        uptime: u64,
        resets: u32,
    ) -> Option<usize> {
        nearest_index(&self.records.lock(), id, uptime, resets)
    }

    /// Returns up to `period` records in ascending order.
    ///
    /// A `(0, 0)` origin selects the most recent `period` records;
    /// otherwise the window runs forward from the nearest record at or
    /// before the origin, falling back to the tail window when the
    /// spacecraft has none there. Bounds are clamped; an empty result is
    /// valid.
    pub fn range(
        &self,
        period: usize,
        id: SpacecraftId,
        from_resets: u32,
        from_uptime: u64,
    ) -> Vec<PayloadRecord> {
        let records = self.records.lock();

        let (start, end) = if from_resets == 0 && from_uptime == 0 {
            (records.len().saturating_sub(period), records.len())
        }
        else {
            let start = nearest_index(&records, id, from_uptime, from_resets)
                .unwrap_or_else(|| records.len().saturating_sub(period));
            (start, start.saturating_add(period))
        };

        let end = end.min(records.len());
        let start = start.min(end);
        records[start..end].to_vec()
    }

    /// The most recently stored record, by key order.
    pub fn latest(&self) -> Option<PayloadRecord> {
        self.records.lock().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Whether new records arrived since the flag was last cleared.
    /// Polling displays check this, fetch what they need, then clear it.
    pub fn updated(&self) -> bool {
        self.updated.load(Ordering::Acquire)
    }

    pub fn set_updated(&self, updated: bool) {
        self.updated.store(updated, Ordering::Release);
    }

    /// Path of the backing log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deletes the backing log file. Consumes the store: a removed store
    /// can't serve further queries.
    pub fn remove(self) -> Result<(), StoreError> {
        std::fs::remove_file(&self.path)?;
        Ok(())
    }
}

fn has_frame(
    records: &[PayloadRecord],
    id: SpacecraftId,
    uptime: u64,
    resets: u32,
) -> bool {
    let key = (resets, uptime);
    let start = records.partition_point(|record| record.sort_key() < key);
    records[start..]
        .iter()
        .take_while(|record| record.sort_key() == key)
        .any(|record| record.id == id)
}

fn nearest_index(
    records: &[PayloadRecord],
    id: SpacecraftId,
    uptime: u64,
    resets: u32,
) -> Option<usize> {
    let key = (resets, uptime);
    let upper = records.partition_point(|record| record.sort_key() <= key);
    records[..upper].iter().rposition(|record| record.id == id)
}

/// Inserts keeping `(resets, uptime)` order; duplicate keys are dropped.
fn insert_sorted(records: &mut Vec<PayloadRecord>, record: PayloadRecord) {
    if has_frame(records, record.id, record.uptime, record.resets) {
        tracing::debug!(
            id = %record.id,
            resets = record.resets,
            uptime = record.uptime,
            "dropping duplicate record"
        );
        return;
    }
    let index = records.partition_point(|existing| existing.sort_key() <= record.sort_key());
    records.insert(index, record);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordType;

    const SAT: SpacecraftId = SpacecraftId::from_u16(6);

    fn accept_all(_: SpacecraftId) -> bool {
        true
    }

    fn test_record(resets: u32, uptime: u64) -> PayloadRecord {
        PayloadRecord {
            capture_date: "20260807120000".to_owned(),
            id: SAT,
            resets,
            uptime,
            record_type: RecordType::HERCI_HIGH_SPEED,
            fields: vec![1, 2, 3],
        }
    }

    fn test_store(dir: &tempfile::TempDir) -> PayloadStore {
        PayloadStore::load(dir.path().join("herci.log"), &accept_all).unwrap()
    }

    #[test]
    fn it_creates_a_missing_log() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir);
        assert!(store.path().exists());
        assert!(store.is_empty());
    }

    #[test]
    fn it_rejects_duplicate_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir);

        assert!(store.save(test_record(1, 100)).unwrap());
        assert!(!store.save(test_record(1, 100)).unwrap());
        assert_eq!(store.len(), 1);

        // the duplicate must not have reached the log either
        let content = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(content.lines().count(), 1);
    }

    #[test]
    fn it_keeps_records_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir);

        for (resets, uptime) in [(2, 50), (1, 300), (1, 100), (2, 10), (1, 200)] {
            store.save(test_record(resets, uptime)).unwrap();
        }

        let keys: Vec<_> = store
            .range(10, SAT, 0, 0)
            .iter()
            .map(|record| (record.resets, record.uptime))
            .collect();
        assert_eq!(keys, [(1, 100), (1, 200), (1, 300), (2, 10), (2, 50)]);
    }

    #[test]
    fn it_finds_the_nearest_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir);
        for uptime in [100, 200, 300] {
            store.save(test_record(1, uptime)).unwrap();
        }

        assert_eq!(store.nearest_index(SAT, 250, 1), Some(1));
        assert_eq!(store.nearest_index(SAT, 200, 1), Some(1));
        assert_eq!(store.nearest_index(SAT, 99, 1), None);
        assert_eq!(store.nearest_index(SAT, 50, 2), Some(2));
        // a spacecraft the store has never seen
        assert_eq!(
            store.nearest_index(SpacecraftId::from_u16(9), 250, 1),
            None
        );
    }

    #[test]
    fn it_clamps_the_tail_window() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir);
        for uptime in [100, 200, 300] {
            store.save(test_record(1, uptime)).unwrap();
        }

        let window = store.range(10, SAT, 0, 0);
        assert_eq!(window.len(), 3);
        assert!(window.windows(2).all(|pair| pair[0].uptime < pair[1].uptime));
    }

    #[test]
    fn it_windows_forward_from_the_origin() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir);
        for uptime in [100, 200, 300, 400] {
            store.save(test_record(1, uptime)).unwrap();
        }

        let window = store.range(2, SAT, 1, 250);
        let uptimes: Vec<_> = window.iter().map(|record| record.uptime).collect();
        assert_eq!(uptimes, [200, 300]);
    }

    #[test]
    fn it_reloads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("herci.log");

        let store = PayloadStore::load(&path, &accept_all).unwrap();
        for uptime in [300, 100, 200] {
            store.save(test_record(1, uptime)).unwrap();
        }
        drop(store);

        let store = PayloadStore::load(&path, &accept_all).unwrap();
        assert_eq!(store.len(), 3);
        let reloaded = store.range(10, SAT, 0, 0);
        assert_eq!(reloaded[0], test_record(1, 100));
        assert!(store.has_frame(SAT, 300, 1));
    }

    #[test]
    fn it_skips_a_torn_final_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("herci.log");

        let store = PayloadStore::load(&path, &accept_all).unwrap();
        store.save(test_record(1, 100)).unwrap();
        drop(store);

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        write!(file, "20260807120001,6,1").unwrap();
        drop(file);

        let store = PayloadStore::load(&path, &accept_all).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.has_frame(SAT, 100, 1));
    }

    #[test]
    fn it_fails_on_an_unknown_spacecraft() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("herci.log");

        let store = PayloadStore::load(&path, &accept_all).unwrap();
        store.save(test_record(1, 100)).unwrap();
        drop(store);

        let registry = |id: SpacecraftId| id != SAT;
        let error = PayloadStore::load(&path, &registry).unwrap_err();
        assert!(matches!(
            error,
            StoreError::UnknownSpacecraft { id } if id == SAT
        ));
    }

    #[test]
    fn it_signals_updates_to_pollers() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir);
        store.set_updated(false);

        store.save(test_record(1, 100)).unwrap();
        assert!(store.updated());
        assert_eq!(store.latest().unwrap().uptime, 100);
        store.set_updated(false);

        // a duplicate is not an update
        store.save(test_record(1, 100)).unwrap();
        assert!(!store.updated());
    }

    #[test]
    fn it_removes_the_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir);
        store.save(test_record(1, 100)).unwrap();

        let path = store.path().to_owned();
        store.remove().unwrap();
        assert!(!path.exists());
    }
}
