//! Testing utilities and mock implementations.
//!
//! [`MockSubmitter`] stands in for a torrent daemon so ingestion can be
//! exercised end to end against a temporary store.
//!
//! # Example
//!
//! ```rust,ignore
//! use magnetdb_core::testing::{fixtures, MockSubmitter};
//!
//! let submitter = Arc::new(MockSubmitter::new());
//! submitter.set_unavailable(true).await;
//!
//! let service = IngestService::new(sync, submitter.clone(), config);
//! service.ingest(&fixtures::magnet_uri(&fixtures::hash(1), "Book")).await?;
//! ```

mod mock_submitter;

pub use mock_submitter::{MockSubmitter, RecordedSubmission};

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::ingest::RemoteTorrent;
    use crate::magnet::uri_for_hash;
    use crate::store::{Database, Entry, Section};

    /// A deterministic 40 character hex info hash.
    pub fn hash(n: u8) -> String {
        format!("{:02x}", n).repeat(20)
    }

    /// Magnet URI with a display name (`name` is used as is, so encode it).
    pub fn magnet_uri(hash: &str, name: &str) -> String {
        format!("{}&dn={}", uri_for_hash(hash), name)
    }

    /// An entry with a fixed id and a synthesized URI.
    pub fn entry(hash: &str, id: u64, title: &str) -> Entry {
        Entry {
            id,
            added_date: Some("2024-01-01T00:00:00Z".to_string()),
            ..Entry::new(hash, title, uri_for_hash(hash))
        }
    }

    /// A database holding the given entries, with `last_sequence` at the highest id.
    pub fn database(added: &[Entry], retry: &[Entry]) -> Database {
        let mut db = Database::new();
        for entry in added {
            db.insert(Section::Added, entry.clone());
        }
        for entry in retry {
            db.insert(Section::Retry, entry.clone());
        }
        db.metadata.last_sequence = db.max_id();
        db
    }

    pub fn remote_torrent(hash: &str, name: &str) -> RemoteTorrent {
        RemoteTorrent {
            hash: hash.to_string(),
            name: name.to_string(),
            save_path: None,
        }
    }
}
