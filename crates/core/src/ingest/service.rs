use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::types::{
    BackfillSummary, IngestError, IngestOutcome, RemoteTorrent, RetrySummary, SubmitError,
    Submitter,
};
use crate::config::IngestConfig;
use crate::magnet::{uri_for_hash, MagnetLink};
use crate::store::{now_rfc3339, Database, Entry, Section, StoreError, SyncOrchestrator};

/// Submits magnet links and keeps the store in step with the daemon.
pub struct IngestService {
    sync: SyncOrchestrator,
    submitter: Arc<dyn Submitter>,
    config: IngestConfig,
}

impl IngestService {
    pub fn new(sync: SyncOrchestrator, submitter: Arc<dyn Submitter>, config: IngestConfig) -> Self {
        Self {
            sync,
            submitter,
            config,
        }
    }

    pub fn sync(&self) -> &SyncOrchestrator {
        &self.sync
    }

    /// Run a store operation on the blocking pool.
    async fn with_store<F, T>(&self, f: F) -> Result<T, IngestError>
    where
        F: FnOnce(&SyncOrchestrator) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let sync = self.sync.clone();
        let result = tokio::task::spawn_blocking(move || f(&sync))
            .await
            .map_err(|e| IngestError::Task(e.to_string()))?;
        Ok(result?)
    }

    /// Write `updates` through the orchestrator. Failures are logged only.
    async fn record(&self, updates: Database) {
        if let Err(e) = self.with_store(move |sync| sync.apply(&updates)).await {
            warn!(error = %e, "Failed to save database");
        }
    }

    /// Submit a single magnet link and record the outcome.
    ///
    /// Links already known (added or queued) are left alone. Store write
    /// failures are logged and do not fail the ingestion.
    pub async fn ingest(&self, uri: &str) -> Result<IngestOutcome, IngestError> {
        let link = MagnetLink::parse(uri)?;
        info!(hash = %link.hash, name = %link.name, "Processing magnet link");

        let db = match self.with_store(|sync| sync.load_merged()).await {
            Ok(db) => db,
            Err(e) => {
                warn!(error = %e, "Could not load database, continuing with an empty one");
                Database::new()
            }
        };

        if db.added.contains_key(&link.hash) {
            info!(name = %link.name, retry_queue = db.retry.len(), "Already added");
            return Ok(IngestOutcome::AlreadyAdded);
        }
        if let Some(queued) = db.retry.get(&link.hash) {
            info!(
                name = %link.name,
                retry_count = queued.retry_count,
                last_attempt = queued.last_attempt.as_deref().unwrap_or("never"),
                "Already in retry queue, process the queue to retry it"
            );
            return Ok(IngestOutcome::AlreadyQueued {
                retry_count: queued.retry_count,
                last_attempt: queued.last_attempt.clone(),
            });
        }

        let now = now_rfc3339();
        let mut entry = Entry {
            added_date: Some(now.clone()),
            last_attempt: Some(now),
            retry_count: 1,
            ..Entry::new(&link.hash, &link.name, &link.uri)
        };

        let (section, outcome) = match self.submitter.submit(&link.uri, &self.config.label).await {
            Ok(receipt) => {
                info!(submitter = self.submitter.name(), name = %link.name, "Submitted");
                entry.torrent_id = receipt.torrent_id;
                (Section::Added, IngestOutcome::Submitted)
            }
            Err(e) if e.is_duplicate() => {
                info!(name = %link.name, "Duplicate, already in the daemon");
                (Section::Added, IngestOutcome::Duplicate)
            }
            Err(e) => {
                warn!(name = %link.name, error = %e, "Submission failed, added to retry queue");
                (Section::Retry, IngestOutcome::Queued { reason: e.to_string() })
            }
        };

        let mut updates = Database::new();
        updates.insert(section, entry);
        self.record(updates).await;

        Ok(outcome)
    }

    /// Resubmit every queued link once, in hash order.
    ///
    /// Each attempt is recorded as soon as it completes, so an interrupted
    /// pass keeps the progress made so far.
    pub async fn process_retry_queue(&self) -> Result<RetrySummary, IngestError> {
        let db = self.with_store(|sync| sync.load_merged()).await?;
        let mut summary = RetrySummary::default();

        if db.retry.is_empty() {
            info!("Retry queue is empty");
            return Ok(summary);
        }

        let total = db.retry.len();
        info!(count = total, "Processing retry queue");

        for (index, (hash, mut entry)) in db.retry.into_iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.config.retry_delay()).await;
            }

            info!(
                progress = %format!("{}/{}", index + 1, total),
                title = %entry.title,
                attempt = entry.retry_count + 1,
                "Retrying"
            );

            if entry.uri.is_empty() {
                entry.uri = uri_for_hash(&hash);
            }
            let result = self.submitter.submit(&entry.uri, &self.config.label).await;
            entry.last_attempt = Some(now_rfc3339());
            entry.retry_count += 1;
            entry.hash = hash;

            let section = match result {
                Ok(receipt) => {
                    info!(title = %entry.title, "Retry succeeded");
                    if receipt.torrent_id.is_some() {
                        entry.torrent_id = receipt.torrent_id;
                    }
                    summary.succeeded += 1;
                    Section::Added
                }
                Err(e) if e.is_duplicate() => {
                    info!(title = %entry.title, "Duplicate, already in the daemon");
                    summary.duplicates += 1;
                    Section::Added
                }
                Err(e) => {
                    warn!(title = %entry.title, error = %e, "Still failing");
                    summary.failed += 1;
                    Section::Retry
                }
            };

            let mut updates = Database::new();
            updates.insert(section, entry);
            self.record(updates).await;
        }

        info!(
            succeeded = summary.succeeded,
            duplicates = summary.duplicates,
            failed = summary.failed,
            "Retry queue processed"
        );
        Ok(summary)
    }

    /// Record every torrent the daemon holds under the configured label.
    pub async fn backfill(&self) -> Result<BackfillSummary, IngestError> {
        let torrents = self.list_remote().await?;

        let summary = self
            .with_store(move |sync| {
                let mut db = sync.load_merged()?;
                info!(
                    added = db.added.len(),
                    retry = db.retry.len(),
                    last_sequence = db.metadata.last_sequence,
                    "Loaded existing database"
                );
                let summary = backfill_into(&mut db, &torrents);
                sync.replicate(&mut db)?;
                Ok(summary)
            })
            .await?;

        info!(
            added = summary.added,
            moved = summary.moved,
            skipped = summary.skipped,
            "Backfill complete"
        );
        if summary.duplicate_ids > 0 {
            warn!(count = summary.duplicate_ids, "Duplicate ids found after backfill");
        }
        Ok(summary)
    }

    /// Find `added` entries the daemon no longer has, and delete them
    /// unless `dry_run` is set.
    pub async fn prune_orphans(&self, dry_run: bool) -> Result<Vec<Entry>, IngestError> {
        let torrents = self.list_remote().await?;
        let in_daemon: BTreeSet<String> = torrents
            .into_iter()
            .map(|t| t.hash.to_lowercase())
            .collect();

        let orphans = self
            .with_store(move |sync| {
                let mut db = sync.load_merged()?;
                let orphans: Vec<Entry> = db
                    .added
                    .values()
                    .filter(|entry| !in_daemon.contains(&entry.hash))
                    .cloned()
                    .collect();

                info!(
                    in_daemon = in_daemon.len(),
                    in_database = db.len(),
                    orphaned = orphans.len(),
                    "Compared database with daemon"
                );

                if dry_run || orphans.is_empty() {
                    return Ok(orphans);
                }
                for orphan in &orphans {
                    db.remove(&orphan.hash);
                }
                sync.replicate(&mut db)?;
                info!(removed = orphans.len(), remaining = db.len(), "Removed orphaned entries");
                Ok(orphans)
            })
            .await?;

        Ok(orphans)
    }

    async fn list_remote(&self) -> Result<Vec<RemoteTorrent>, SubmitError> {
        let torrents = self.submitter.list_by_label(&self.config.label).await?;
        info!(
            submitter = self.submitter.name(),
            label = %self.config.label,
            count = torrents.len(),
            "Fetched torrents"
        );
        Ok(torrents)
    }
}

/// Fold the daemon's torrent list into `db`.
fn backfill_into(db: &mut Database, torrents: &[RemoteTorrent]) -> BackfillSummary {
    let mut summary = BackfillSummary::default();
    let mut next_id = db.next_sequence();

    let mut sorted: Vec<&RemoteTorrent> = torrents.iter().collect();
    sorted.sort_by(|a, b| a.hash.cmp(&b.hash));

    for torrent in sorted {
        let hash = torrent.hash.to_lowercase();
        match db.section_of(&hash) {
            Some(Section::Added) => summary.skipped += 1,
            Some(Section::Retry) => {
                if let Some(entry) = db.remove(&hash) {
                    debug!(title = %entry.title, "Moved from retry to added");
                    db.insert(Section::Added, entry);
                    summary.moved += 1;
                }
            }
            None => {
                let entry = Entry {
                    id: next_id,
                    added_date: Some(now_rfc3339()),
                    save_path: torrent.save_path.clone(),
                    torrent_name: Some(torrent.name.clone()),
                    ..Entry::new(hash.clone(), torrent.name.clone(), uri_for_hash(&hash))
                };
                db.insert(Section::Added, entry);
                next_id += 1;
                summary.added += 1;
            }
        }
    }

    db.metadata.last_sequence = db.metadata.last_sequence.max(next_id - 1);

    let duplicates = db.duplicate_ids();
    for (id, hashes) in &duplicates {
        warn!(id, hashes = ?hashes, "Id is used by more than one entry");
    }
    summary.duplicate_ids = duplicates.len();
    summary
}
