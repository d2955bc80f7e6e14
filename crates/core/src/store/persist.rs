//! Reading and writing the JSON document.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::checksum::{database_checksum, file_checksum};
use super::error::StoreError;
use super::migrate::{detect, Detected, SchemaVersion};
use super::types::{now_rfc3339, Database};

/// How reads are retried on transient failures (shared-storage locking).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRetryPolicy {
    /// Total attempts, including the first one.
    pub attempts: u32,
    /// Sleep after attempt `n` is `n * backoff`.
    pub backoff: Duration,
}

impl Default for ReadRetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            backoff: Duration::from_millis(500),
        }
    }
}

impl ReadRetryPolicy {
    /// Delay to sleep after the given (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff * attempt
    }
}

/// JSON file persistence with atomic writes and self-upgrading reads.
#[derive(Debug, Clone, Default)]
pub struct JsonStore {
    retry: ReadRetryPolicy,
}

impl JsonStore {
    pub fn new(retry: ReadRetryPolicy) -> Self {
        Self { retry }
    }

    pub fn retry_policy(&self) -> ReadRetryPolicy {
        self.retry
    }

    /// Load the database at `path`, upgrading older schemas.
    ///
    /// A missing file is an empty database, not an error.
    pub fn load(&self, path: &Path) -> Result<Database, StoreError> {
        Ok(self.load_detected(path)?.database)
    }

    /// Like [`load`](Self::load), but also reports which schema was found.
    pub fn load_detected(&self, path: &Path) -> Result<Detected, StoreError> {
        if !path.exists() {
            debug!(path = %path.display(), "No database file, starting empty");
            return Ok(Detected {
                database: Database::new(),
                schema: SchemaVersion::Current,
                generated_uuids: 0,
            });
        }

        let data = self.read_with_retry(path)?;
        detect(&data).map_err(|e| StoreError::format(path, e))
    }

    fn read_with_retry(&self, path: &Path) -> Result<Vec<u8>, StoreError> {
        let attempts = self.retry.attempts.max(1);
        let mut attempt = 1;
        loop {
            match fs::read(path) {
                Ok(data) => return Ok(data),
                Err(e) if attempt < attempts => {
                    let delay = self.retry.delay_after(attempt);
                    warn!(
                        path = %path.display(),
                        attempt,
                        error = %e,
                        "Read failed, retrying in {:?}",
                        delay
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(StoreError::io(path, e)),
            }
        }
    }

    /// Write `db` to `path` atomically.
    ///
    /// Refreshes `last_modified` and the checksum, writes a sibling temp file
    /// and renames it over the destination. On failure the destination is
    /// untouched and the temp file is removed.
    pub fn save(&self, path: &Path, db: &mut Database) -> Result<(), StoreError> {
        let data = Self::encode(db)?;
        self.write_atomic(path, &data)?;
        debug!(
            path = %path.display(),
            entries = db.len(),
            checksum = %db.metadata.checksum,
            "Database written"
        );
        Ok(())
    }

    /// Stamp `last_modified`, recompute the checksum and serialize.
    pub fn encode(db: &mut Database) -> Result<Vec<u8>, StoreError> {
        db.metadata.last_modified = now_rfc3339();
        db.metadata.checksum = database_checksum(db);
        Ok(serde_json::to_vec_pretty(db)?)
    }

    /// Replace the file at `path` with `data` via a sibling temp file.
    pub fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<(), StoreError> {
        let temp_path = temp_path_for(path);

        if let Err(e) = fs::write(&temp_path, data) {
            let _ = fs::remove_file(&temp_path);
            return Err(StoreError::io(&temp_path, e));
        }

        if let Err(e) = fs::rename(&temp_path, path) {
            let _ = fs::remove_file(&temp_path);
            return Err(StoreError::io(path, e));
        }

        Ok(())
    }

    /// Rewrite the file at `path` in the current format.
    ///
    /// Missing files are left alone.
    pub fn migrate(&self, path: &Path) -> Result<(), StoreError> {
        if !path.exists() {
            info!(path = %path.display(), "Nothing to migrate");
            return Ok(());
        }

        let old_checksum = file_checksum(path).map_err(|e| StoreError::io(path, e))?;
        let Detected {
            mut database,
            schema,
            generated_uuids,
        } = self.load_detected(path)?;

        info!(
            path = %path.display(),
            schema = schema.as_str(),
            added = database.added.len(),
            retry = database.retry.len(),
            last_sequence = database.metadata.last_sequence,
            generated_uuids,
            file_checksum = %old_checksum,
            "Migrating database file"
        );

        self.save(path, &mut database)?;

        let new_checksum = file_checksum(path).map_err(|e| StoreError::io(path, e))?;
        info!(
            path = %path.display(),
            data_checksum = %database.metadata.checksum,
            file_checksum = %new_checksum,
            last_sequence = database.metadata.last_sequence,
            "Migrated successfully"
        );
        Ok(())
    }
}

/// Sibling temp path: `<file>.tmp` in the same directory.
fn temp_path_for(path: &Path) -> PathBuf {
    let mut name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
