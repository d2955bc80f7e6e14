//! Types for magnet link ingestion.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::magnet::MagnetError;
use crate::store::StoreError;

/// Errors reported by a torrent daemon when submitting or listing.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The daemon already has this torrent in its session.
    #[error("Torrent already in session: {0}")]
    Duplicate(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rejected by daemon: {0}")]
    Rejected(String),

    #[error("Request timeout")]
    Timeout,
}

impl SubmitError {
    /// A duplicate means the torrent is in the daemon, which is what we wanted.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, SubmitError::Duplicate(_))
    }
}

/// Acknowledgement of a successful submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmitReceipt {
    /// Daemon-side torrent id, when the daemon reports one.
    pub torrent_id: Option<String>,
}

/// A torrent as listed by the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTorrent {
    /// Info hash (lowercase hex).
    pub hash: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_path: Option<String>,
}

/// Something that can hand magnet links to a torrent daemon.
#[async_trait]
pub trait Submitter: Send + Sync {
    /// Name of this submitter, for logging.
    fn name(&self) -> &str;

    /// Submit a magnet link, tagging it with `label` (empty for none).
    async fn submit(&self, uri: &str, label: &str) -> Result<SubmitReceipt, SubmitError>;

    /// List every torrent carrying `label`.
    async fn list_by_label(&self, label: &str) -> Result<Vec<RemoteTorrent>, SubmitError>;
}

/// What [`IngestService::ingest`](super::IngestService::ingest) did with a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Already recorded as added; nothing was submitted.
    AlreadyAdded,
    /// Already waiting in the retry queue; nothing was submitted.
    AlreadyQueued {
        retry_count: u32,
        last_attempt: Option<String>,
    },
    /// Submitted and recorded as added.
    Submitted,
    /// The daemon already had it; recorded as added.
    Duplicate,
    /// Submission failed; recorded in the retry queue.
    Queued { reason: String },
}

/// Totals from one pass over the retry queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetrySummary {
    pub succeeded: usize,
    pub duplicates: usize,
    pub failed: usize,
}

impl RetrySummary {
    pub fn attempted(&self) -> usize {
        self.succeeded + self.duplicates + self.failed
    }
}

/// Totals from a backfill.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillSummary {
    /// New entries created for torrents we had never seen.
    pub added: usize,
    /// Entries moved from the retry queue to `added`.
    pub moved: usize,
    /// Torrents already recorded as added.
    pub skipped: usize,
    /// Ids shared by more than one hash after the backfill.
    pub duplicate_ids: usize,
}

/// Errors that can occur during ingestion.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Invalid magnet link: {0}")]
    InvalidLink(#[from] MagnetError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Submitter error: {0}")]
    Submit(#[from] SubmitError),

    #[error("Store task failed: {0}")]
    Task(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_detection() {
        assert!(SubmitError::Duplicate("abc".into()).is_duplicate());
        assert!(!SubmitError::Timeout.is_duplicate());
        assert!(!SubmitError::Rejected("bad".into()).is_duplicate());
    }

    #[test]
    fn test_retry_summary_attempted() {
        let summary = RetrySummary {
            succeeded: 2,
            duplicates: 1,
            failed: 3,
        };
        assert_eq!(summary.attempted(), 6);
    }
}
