//! Local-first synchronization between the primary copy and an optional
//! replica on shared storage.
//!
//! Every write re-reconciles against what is on disk right before writing,
//! so concurrent writers converge without a lock: the atomic rename makes
//! each write all-or-nothing, and the merge makes the last writer carry
//! everyone else's entries forward.

use std::path::Path;

use tracing::{info, warn};

use super::checksum::file_checksum;
use super::error::StoreError;
use super::merge::merge;
use super::persist::JsonStore;
use super::types::{new_uuid, Database, Section};
use crate::config::StoreConfig;

/// How a reconciled database was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileKind {
    /// Both files were byte-identical; the local copy was loaded as is.
    Identical,
    /// No usable remote copy; the local copy was loaded as is.
    LocalOnly,
    /// Local and remote were merged.
    Merged,
    /// Local was unreadable; the remote copy stands in for it.
    RemoteFallback,
}

/// Result of [`SyncOrchestrator::reconcile`].
#[derive(Debug, Clone)]
pub struct Reconciled {
    pub database: Database,
    pub kind: ReconcileKind,
}

/// Sequences load, compare, merge and write for one store configuration.
#[derive(Debug, Clone)]
pub struct SyncOrchestrator {
    config: StoreConfig,
    store: JsonStore,
}

impl SyncOrchestrator {
    pub fn new(config: StoreConfig) -> Self {
        let store = JsonStore::new(config.retry_policy());
        Self { config, store }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn store(&self) -> &JsonStore {
        &self.store
    }

    fn local_path(&self) -> &Path {
        &self.config.local_path
    }

    fn remote_path(&self) -> Option<&Path> {
        self.config.remote_path.as_deref()
    }

    /// Reconcile the local and remote copies without writing anything.
    pub fn reconcile(&self) -> Result<Reconciled, StoreError> {
        let local_path = self.local_path();
        let Some(remote_path) = self.remote_path() else {
            return Ok(Reconciled {
                database: self.store.load(local_path)?,
                kind: ReconcileKind::LocalOnly,
            });
        };

        let local_sum = file_checksum(local_path).ok();
        let remote_sum = file_checksum(remote_path).ok();
        if let (Some(local_sum), Some(remote_sum)) = (&local_sum, &remote_sum) {
            if local_sum == remote_sum {
                info!(checksum = &local_sum[..8], "Files are identical, using local");
                return Ok(Reconciled {
                    database: self.store.load(local_path)?,
                    kind: ReconcileKind::Identical,
                });
            }
        }

        let local = match self.store.load(local_path) {
            Ok(db) => Some(db),
            Err(e) => {
                warn!(path = %local_path.display(), error = %e, "Failed to load local database");
                None
            }
        };
        let remote = match self.store.load(remote_path) {
            Ok(db) => Some(db),
            Err(e) => {
                warn!(
                    path = %remote_path.display(),
                    error = %e,
                    "Remote database not accessible, using local only"
                );
                None
            }
        };

        match (local, remote) {
            (Some(local), Some(remote)) => {
                info!(
                    local = short(&local_sum),
                    remote = short(&remote_sum),
                    local_seq = local.metadata.last_sequence,
                    remote_seq = remote.metadata.last_sequence,
                    "Files differ, merging"
                );
                let merged = merge(&local, &remote);
                info!(
                    added = merged.added.len(),
                    retry = merged.retry.len(),
                    last_sequence = merged.metadata.last_sequence,
                    "Merged"
                );
                Ok(Reconciled {
                    database: merged,
                    kind: ReconcileKind::Merged,
                })
            }
            (Some(local), None) => Ok(Reconciled {
                database: local,
                kind: ReconcileKind::LocalOnly,
            }),
            (None, Some(remote)) if !remote.is_empty() => {
                warn!(
                    entries = remote.len(),
                    "Local database unreadable, starting from the remote copy"
                );
                Ok(Reconciled {
                    database: merge(&Database::new(), &remote),
                    kind: ReconcileKind::RemoteFallback,
                })
            }
            (None, _) => Err(StoreError::LocalUnreadable {
                path: local_path.to_path_buf(),
                reason: "remote copy is unavailable or empty".to_string(),
            }),
        }
    }

    /// Reconciled view of the database, for read-only callers.
    pub fn load_merged(&self) -> Result<Database, StoreError> {
        Ok(self.reconcile()?.database)
    }

    /// Reconcile, overlay `updates`, and write the result to both copies.
    ///
    /// Returns the database as written.
    pub fn apply(&self, updates: &Database) -> Result<Database, StoreError> {
        let mut db = self.reconcile()?.database;

        if db.is_empty() {
            if let Some(remote_path) = self.remote_path() {
                match self.store.load(remote_path) {
                    Ok(remote) if !remote.is_empty() => {
                        warn!(
                            entries = remote.len(),
                            "Reconciled database is empty but remote has data, using remote"
                        );
                        db = remote;
                    }
                    _ => {}
                }
            }
        }

        overlay(&mut db, updates);
        self.replicate(&mut db)?;
        Ok(db)
    }

    /// Write `db` locally, then best-effort to the remote copy.
    ///
    /// Both copies receive identical bytes, so the next reconcile can
    /// short-circuit on the file checksum.
    pub fn replicate(&self, db: &mut Database) -> Result<(), StoreError> {
        let data = JsonStore::encode(db)?;

        self.store.write_atomic(self.local_path(), &data)?;
        info!(path = %self.local_path().display(), entries = db.len(), "Saved to local");

        if let Some(remote_path) = self.remote_path() {
            match self.store.write_atomic(remote_path, &data) {
                Ok(()) => info!(path = %remote_path.display(), "Synced to remote"),
                Err(e) => warn!(
                    path = %remote_path.display(),
                    error = %e,
                    "Could not sync to remote, changes saved locally and will sync on next write"
                ),
            }
        }
        Ok(())
    }
}

/// Apply caller updates on top of a reconciled database.
///
/// Retry updates go in first so that a hash present in both update sections
/// ends up in `added`.
fn overlay(db: &mut Database, updates: &Database) {
    let mut next_id = db.next_sequence();
    let sections = [
        (Section::Retry, &updates.retry),
        (Section::Added, &updates.added),
    ];
    for (section, entries) in sections {
        for (hash, entry) in entries {
            let mut entry = entry.clone();
            entry.hash = hash.clone();
            if entry.uuid.is_empty() {
                entry.uuid = new_uuid();
            }
            if entry.id == 0 {
                entry.id = next_id;
                next_id += 1;
            }
            db.insert(section, entry);
        }
    }
    db.metadata.last_sequence = db
        .metadata
        .last_sequence
        .max(next_id - 1)
        .max(db.max_id());
}

fn short(sum: &Option<String>) -> &str {
    match sum {
        Some(s) if s.len() >= 8 => &s[..8],
        _ => "empty",
    }
}
