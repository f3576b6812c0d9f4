//! CSV-backed lead store: drip selection and the sent-state transition.
//!
//! The whole file is rewritten on every commit: rows are serialized to a
//! sibling `.tmp` file, flushed to disk, then renamed over the original.
//! A failed write leaves the original file untouched and the in-memory
//! record rolled back.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::StoreError;

use super::lead::{COLUMNS, LeadRecord};

/// Position of a record in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LeadHandle(usize);

impl LeadHandle {
    /// Zero-based data row index (the header is not counted).
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Result of a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Flag set and store persisted.
    Committed,
    /// Already sent; nothing changed.
    AlreadySent,
}

/// The serialized store, as handed to remote sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSnapshot {
    pub file_name: String,
    pub content: Vec<u8>,
}

/// File-backed store owning every lead for the duration of a run.
#[derive(Debug)]
pub struct LeadStore {
    path: PathBuf,
    records: Vec<LeadRecord>,
}

impl LeadStore {
    /// Load and validate the store at `path`.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let bytes = fs::read(&path).await?;
        let records = decode(&bytes)?;
        info!(path = %path.display(), records = records.len(), "Lead store loaded");
        Ok(Self { path, records })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &[LeadRecord] {
        &self.records
    }

    pub fn get(&self, handle: LeadHandle) -> Option<&LeadRecord> {
        self.records.get(handle.0)
    }

    /// First eligible record in stored order.
    pub fn select_next(&self) -> Option<LeadHandle> {
        for (idx, record) in self.records.iter().enumerate() {
            if record.is_sent() {
                continue;
            }
            if !record.has_address() {
                warn!(row = idx, company = %record.company, "Skipping unsent lead without a contact address");
                continue;
            }
            return Some(LeadHandle(idx));
        }
        None
    }

    /// Number of unsent, addressable records.
    pub fn remaining(&self) -> usize {
        self.records.iter().filter(|r| r.is_eligible()).count()
    }

    /// Records whose sent time falls on `date` (UTC).
    pub fn sent_on(&self, date: NaiveDate) -> usize {
        self.records.iter().filter(|r| r.sent_on(date)).count()
    }

    /// Mark a record sent at `at` and persist the whole store.
    ///
    /// The only mutation path for the sent flag. A record that is already
    /// sent is left as-is, keeping its first timestamp.
    pub async fn commit(
        &mut self,
        handle: LeadHandle,
        at: DateTime<Utc>,
    ) -> Result<CommitOutcome, StoreError> {
        let record = self
            .records
            .get_mut(handle.0)
            .ok_or(StoreError::UnknownRecord { index: handle.0 })?;

        if record.is_sent() {
            debug!(row = handle.0, "Commit skipped: record already sent");
            return Ok(CommitOutcome::AlreadySent);
        }

        let previous = record.clone();
        record.mark_sent(at);

        if let Err(e) = self.persist().await {
            self.records[handle.0] = previous;
            return Err(e);
        }

        info!(row = handle.0, path = %self.path.display(), "Lead marked as sent");
        Ok(CommitOutcome::Committed)
    }

    /// Serialized store content for remote publication.
    pub fn snapshot(&self) -> Result<StoreSnapshot, StoreError> {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "leads.csv".to_string());
        Ok(StoreSnapshot {
            file_name,
            content: encode(&self.records)?,
        })
    }

    async fn persist(&self) -> Result<(), StoreError> {
        let failure = |reason: String| StoreError::PersistFailure {
            path: self.path.clone(),
            reason,
        };

        let bytes = encode(&self.records).map_err(|e| failure(e.to_string()))?;
        let tmp = sibling_path(&self.path, ".tmp");

        let written = async {
            let mut file = fs::File::create(&tmp).await?;
            file.write_all(&bytes).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&tmp, &self.path).await
        }
        .await;

        if let Err(e) = written {
            if let Err(cleanup) = fs::remove_file(&tmp).await {
                debug!(path = %tmp.display(), error = %cleanup, "Temp file not removed");
            }
            return Err(failure(e.to_string()));
        }

        // Make the rename itself durable. The new content is already in
        // place, so a failure here is reported but does not undo the commit.
        let dir = parent_dir(&self.path);
        let synced = async { fs::File::open(dir).await?.sync_all().await }.await;
        if let Err(e) = synced {
            warn!(dir = %dir.display(), error = %e, "Store directory not synced");
        }
        Ok(())
    }
}

/// Directory holding `path`; `.` for a bare file name.
fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

/// `<path><suffix>`, next to the original file.
pub(crate) fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn decode(bytes: &[u8]) -> Result<Vec<LeadRecord>, StoreError> {
    // Short rows are padded with defaults; long rows are rejected below.
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(bytes);

    let headers = reader.headers()?.clone();
    if headers.iter().ne(COLUMNS) {
        return Err(StoreError::Schema {
            expected: COLUMNS.join(", "),
            found: headers.iter().collect::<Vec<_>>().join(", "),
        });
    }

    let mut records = Vec::new();
    for (idx, row) in reader.records().enumerate() {
        let row = row?;
        if row.len() > COLUMNS.len() {
            return Err(StoreError::Malformed {
                row: idx,
                reason: format!(
                    "{} fields, expected at most {}",
                    row.len(),
                    COLUMNS.len()
                ),
            });
        }
        let record: LeadRecord = row.deserialize(Some(&headers))?;
        record
            .check_invariant()
            .map_err(|reason| StoreError::Malformed { row: idx, reason })?;
        records.push(record);
    }
    Ok(records)
}

fn encode(records: &[LeadRecord]) -> Result<Vec<u8>, StoreError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(COLUMNS)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer
        .into_inner()
        .map_err(|e| StoreError::Io(e.into_error()))
}
