//! Append-only message journal partitioned by calendar day
//!
//! Each UTC date owns one partition stored under `glovelink-log-YYYY-MM-DD`
//! as a JSON array of [`LogEntry`]. Partitions are loaded lazily on first use
//! and kept in memory afterwards; every append rewrites the whole partition
//! through the store.
//!
//! Appends are serialized by one async lock that stays held across the store
//! write, so the store always sees a partition in append order.

pub mod store;

use std::collections::HashMap;

use chrono::{Local, NaiveDate};
use tokio::sync::Mutex;

use glovelink_core::prelude::*;
use glovelink_core::LogEntry;

pub use store::{FileStore, JournalStore, MemoryStore};

/// Store key prefix; the partition date follows as `YYYY-MM-DD`
pub const KEY_PREFIX: &str = "glovelink-log-";

/// Store key for the partition of `date`
pub fn partition_key(date: NaiveDate) -> String {
    format!("{}{}", KEY_PREFIX, date.format("%Y-%m-%d"))
}

/// Which day of the journal to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogView {
    /// The caller's local calendar day at call time
    Today,
    Date(NaiveDate),
}

impl LogView {
    pub fn date(&self) -> NaiveDate {
        match self {
            LogView::Today => Local::now().date_naive(),
            LogView::Date(date) => *date,
        }
    }
}

/// One day of the journal.
///
/// Until the stored copy has been read, `entries` only holds what was
/// appended in this process; those are merged behind the stored entries on
/// the first successful read.
#[derive(Debug, Default)]
struct Partition {
    entries: Vec<LogEntry>,
    loaded: bool,
}

impl Partition {
    fn merge_stored(&mut self, mut stored: Vec<LogEntry>) {
        stored.append(&mut self.entries);
        self.entries = stored;
        self.loaded = true;
    }
}

pub struct LogJournal<S> {
    store: S,
    partitions: Mutex<HashMap<NaiveDate, Partition>>,
}

impl<S: JournalStore> LogJournal<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            partitions: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Append `entry` to the partition of its UTC date and persist it.
    ///
    /// The in-memory append always happens. A store failure is returned as
    /// [`Error::PersistenceFailed`] and the entry stays in memory; the next
    /// successful append writes it out with the rest of the partition.
    ///
    /// If the stored partition cannot be read, nothing is written: the entry
    /// is held in memory until the day can be read and merged.
    pub async fn append(&self, entry: LogEntry) -> Result<()> {
        let date = entry.partition_date();
        let mut partitions = self.partitions.lock().await;
        let partition = partitions.entry(date).or_default();
        partition.entries.push(entry);

        if !partition.loaded {
            let stored = self.fetch(date).await?;
            partition.merge_stored(stored);
        }

        let json = serde_json::to_string(&partition.entries)
            .map_err(|e| Error::persistence(format!("serialize {}: {}", date, e)))?;

        self.store
            .set(&partition_key(date), json)
            .await
            .map_err(as_persistence)
    }

    /// Every entry of `date` in append order; empty if nothing was recorded.
    ///
    /// If the stored partition cannot be read, only the entries appended in
    /// this process are returned and the read is retried next time.
    pub async fn load_for_date(&self, date: NaiveDate) -> Vec<LogEntry> {
        let mut partitions = self.partitions.lock().await;
        if let Some(partition) = partitions.get(&date).filter(|p| p.loaded) {
            return partition.entries.clone();
        }

        match self.fetch(date).await {
            Ok(stored) => {
                let partition = partitions.entry(date).or_default();
                partition.merge_stored(stored);
                partition.entries.clone()
            }
            Err(e) => {
                warn!("{}", e);
                partitions
                    .get(&date)
                    .map(|p| p.entries.clone())
                    .unwrap_or_default()
            }
        }
    }

    /// Entries of the local calendar day at call time
    pub async fn load_for_today(&self) -> Vec<LogEntry> {
        self.load_for_date(Local::now().date_naive()).await
    }

    pub async fn load(&self, view: LogView) -> Vec<LogEntry> {
        self.load_for_date(view.date()).await
    }

    /// Read a partition from the store.
    ///
    /// Corrupt data is logged and treated as an empty partition; the next
    /// append to that day replaces it. A failed read is an error so the day
    /// is never overwritten blind.
    async fn fetch(&self, date: NaiveDate) -> Result<Vec<LogEntry>> {
        let key = partition_key(date);
        let json = self
            .store
            .get(&key)
            .await
            .map_err(|e| Error::persistence(format!("read {}: {}", key, e)))?;

        let Some(json) = json else {
            return Ok(Vec::new());
        };
        match serde_json::from_str::<Vec<LogEntry>>(&json) {
            Ok(entries) => {
                debug!("Loaded {} entries from {}", entries.len(), key);
                Ok(entries)
            }
            Err(e) => {
                warn!("Corrupt journal partition {}: {}", key, e);
                Ok(Vec::new())
            }
        }
    }
}

fn as_persistence(e: Error) -> Error {
    match e {
        Error::PersistenceFailed { .. } => e,
        other => Error::persistence(other.to_string()),
    }
}

impl<S> std::fmt::Debug for LogJournal<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogJournal").finish_non_exhaustive()
    }
}
