//! Mock submitter for testing.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::ingest::{RemoteTorrent, SubmitError, SubmitReceipt, Submitter};
use crate::magnet::{extract_hash, extract_name};

/// A recorded submit call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedSubmission {
    pub uri: String,
    pub label: String,
    /// Whether the mock accepted it (duplicates count as not accepted).
    pub accepted: bool,
    pub timestamp: chrono::DateTime<Utc>,
}

/// Mock implementation of the Submitter trait.
///
/// Behaves like a daemon session: a submitted hash is remembered under its
/// label, and submitting it again fails with [`SubmitError::Duplicate`].
///
/// # Example
///
/// ```rust,ignore
/// let submitter = MockSubmitter::new();
/// submitter.add_remote("books", fixtures::remote_torrent(&hash, "Book")).await;
/// submitter.reject_hash(&other).await;
///
/// let err = submitter.submit(&uri, "books").await.unwrap_err();
/// assert!(err.is_duplicate());
/// ```
#[derive(Debug)]
pub struct MockSubmitter {
    submissions: Arc<RwLock<Vec<RecordedSubmission>>>,
    /// Torrents in the mock session, keyed by hash, with their label.
    session: Arc<RwLock<BTreeMap<String, (String, RemoteTorrent)>>>,
    /// Hashes whose submission always fails.
    rejected: Arc<RwLock<BTreeSet<String>>>,
    /// If set, the next call fails with this error.
    next_error: Arc<RwLock<Option<SubmitError>>>,
    /// While set, every call fails with a connection error.
    unavailable: Arc<RwLock<bool>>,
    default_save_path: String,
}

impl Default for MockSubmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSubmitter {
    pub fn new() -> Self {
        Self {
            submissions: Arc::new(RwLock::new(Vec::new())),
            session: Arc::new(RwLock::new(BTreeMap::new())),
            rejected: Arc::new(RwLock::new(BTreeSet::new())),
            next_error: Arc::new(RwLock::new(None)),
            unavailable: Arc::new(RwLock::new(false)),
            default_save_path: "/mock/downloads".to_string(),
        }
    }

    /// All recorded submit calls, in order.
    pub async fn submissions(&self) -> Vec<RecordedSubmission> {
        self.submissions.read().await.clone()
    }

    /// Put a torrent into the mock session under `label`.
    pub async fn add_remote(&self, label: &str, torrent: RemoteTorrent) {
        self.session
            .write()
            .await
            .insert(torrent.hash.to_lowercase(), (label.to_string(), torrent));
    }

    /// Drop a torrent from the mock session.
    pub async fn remove_remote(&self, hash: &str) {
        self.session.write().await.remove(&hash.to_lowercase());
    }

    pub async fn has_torrent(&self, hash: &str) -> bool {
        self.session.read().await.contains_key(&hash.to_lowercase())
    }

    /// Make every submission of `hash` fail with [`SubmitError::Rejected`].
    pub async fn reject_hash(&self, hash: &str) {
        self.rejected.write().await.insert(hash.to_lowercase());
    }

    /// Configure the next call to fail with the given error.
    pub async fn set_next_error(&self, error: SubmitError) {
        *self.next_error.write().await = Some(error);
    }

    pub async fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write().await = unavailable;
    }

    async fn check_available(&self) -> Result<(), SubmitError> {
        if *self.unavailable.read().await {
            return Err(SubmitError::ConnectionFailed(
                "mock daemon unavailable".to_string(),
            ));
        }
        match self.next_error.write().await.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn record(&self, uri: &str, label: &str, accepted: bool) {
        self.submissions.write().await.push(RecordedSubmission {
            uri: uri.to_string(),
            label: label.to_string(),
            accepted,
            timestamp: Utc::now(),
        });
    }
}

#[async_trait]
impl Submitter for MockSubmitter {
    fn name(&self) -> &str {
        "mock"
    }

    async fn submit(&self, uri: &str, label: &str) -> Result<SubmitReceipt, SubmitError> {
        if let Err(err) = self.check_available().await {
            self.record(uri, label, false).await;
            return Err(err);
        }

        let Some(hash) = extract_hash(uri) else {
            self.record(uri, label, false).await;
            return Err(SubmitError::Rejected(format!("no info hash in {}", uri)));
        };

        if self.rejected.read().await.contains(&hash) {
            self.record(uri, label, false).await;
            return Err(SubmitError::Rejected(hash));
        }

        let mut session = self.session.write().await;
        if session.contains_key(&hash) {
            drop(session);
            self.record(uri, label, false).await;
            return Err(SubmitError::Duplicate(hash));
        }

        let torrent = RemoteTorrent {
            hash: hash.clone(),
            name: extract_name(uri),
            save_path: Some(self.default_save_path.clone()),
        };
        session.insert(hash.clone(), (label.to_string(), torrent));
        drop(session);

        self.record(uri, label, true).await;
        Ok(SubmitReceipt {
            torrent_id: Some(format!("mock-{}", &hash[..8])),
        })
    }

    async fn list_by_label(&self, label: &str) -> Result<Vec<RemoteTorrent>, SubmitError> {
        self.check_available().await?;

        Ok(self
            .session
            .read()
            .await
            .values()
            .filter(|(l, _)| l == label)
            .map(|(_, t)| t.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    #[tokio::test]
    async fn test_submit_then_duplicate() {
        let submitter = MockSubmitter::new();
        let hash = fixtures::hash(1);
        let uri = fixtures::magnet_uri(&hash, "Book");

        let receipt = submitter.submit(&uri, "books").await.unwrap();
        assert!(receipt.torrent_id.is_some());
        assert!(submitter.has_torrent(&hash).await);

        let err = submitter.submit(&uri, "books").await.unwrap_err();
        assert!(err.is_duplicate());

        let recorded = submitter.submissions().await;
        assert_eq!(recorded.len(), 2);
        assert!(recorded[0].accepted);
        assert!(!recorded[1].accepted);
    }

    #[tokio::test]
    async fn test_next_error_applies_once() {
        let submitter = MockSubmitter::new();
        submitter.set_next_error(SubmitError::Timeout).await;
        let uri = fixtures::magnet_uri(&fixtures::hash(2), "Book");

        assert!(matches!(
            submitter.submit(&uri, "").await,
            Err(SubmitError::Timeout)
        ));
        assert!(submitter.submit(&uri, "").await.is_ok());
    }

    #[tokio::test]
    async fn test_list_filters_by_label() {
        let submitter = MockSubmitter::new();
        submitter
            .add_remote("books", fixtures::remote_torrent(&fixtures::hash(1), "One"))
            .await;
        submitter
            .add_remote("films", fixtures::remote_torrent(&fixtures::hash(2), "Two"))
            .await;

        let listed = submitter.list_by_label("books").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "One");
    }
}
