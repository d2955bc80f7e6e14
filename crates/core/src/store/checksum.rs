//! Content digests used for integrity metadata and cheap equality tests.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use sha1::{Digest, Sha1};

use super::types::{Database, Entry};

/// The checksummed part of a database. Metadata is left out so the
/// checksum never depends on itself.
#[derive(Serialize)]
struct ChecksumView<'a> {
    added: &'a BTreeMap<String, Entry>,
    retry: &'a BTreeMap<String, Entry>,
}

/// SHA-1 hex digest of the database's `added` and `retry` contents.
pub fn database_checksum(db: &Database) -> String {
    let view = ChecksumView {
        added: &db.added,
        retry: &db.retry,
    };
    let bytes = serde_json::to_vec(&view)
        .expect("string-keyed maps of plain structs always serialize");
    bytes_checksum(&bytes)
}

/// SHA-1 hex digest of the raw bytes of a file.
pub fn file_checksum(path: &Path) -> std::io::Result<String> {
    let data = std::fs::read(path)?;
    Ok(bytes_checksum(&data))
}

pub(crate) fn bytes_checksum(data: &[u8]) -> String {
    format!("{:x}", Sha1::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::types::Section;
    use tempfile::TempDir;

    fn sample() -> Database {
        let mut db = Database::new();
        let mut entry = Entry::new("aaa", "First", "magnet:?xt=urn:btih:aaa");
        entry.id = 1;
        db.insert(Section::Added, entry);
        let mut entry = Entry::new("bbb", "Second", "magnet:?xt=urn:btih:bbb");
        entry.id = 2;
        db.insert(Section::Retry, entry);
        db
    }

    #[test]
    fn test_checksum_is_stable() {
        let db = sample();
        let first = database_checksum(&db);
        assert_eq!(first.len(), 40);
        assert_eq!(first, database_checksum(&db));
        assert_eq!(first, database_checksum(&db.clone()));
    }

    #[test]
    fn test_checksum_covers_serialized_sections() {
        let empty = database_checksum(&Database::new());
        assert_eq!(empty, bytes_checksum(br#"{"added":{},"retry":{}}"#));
        assert_ne!(empty, bytes_checksum(b""));
    }

    #[test]
    fn test_checksum_ignores_metadata() {
        let mut db = sample();
        let before = database_checksum(&db);
        db.metadata.last_sequence = 99;
        db.metadata.last_modified = "2024-01-01T00:00:00Z".to_string();
        db.metadata.checksum = "stale".to_string();
        assert_eq!(before, database_checksum(&db));
    }

    #[test]
    fn test_checksum_changes_with_any_field() {
        let base = sample();
        let before = database_checksum(&base);

        let mut db = base.clone();
        db.added.get_mut("aaa").unwrap().title = "Changed".to_string();
        assert_ne!(before, database_checksum(&db));

        let mut db = base.clone();
        db.retry.get_mut("bbb").unwrap().retry_count = 3;
        assert_ne!(before, database_checksum(&db));

        let mut db = base.clone();
        let entry = db.remove("bbb").unwrap();
        db.insert(Section::Added, entry);
        assert_ne!(before, database_checksum(&db));
    }

    #[test]
    fn test_file_checksum() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a.json");
        let b = temp.path().join("b.json");
        std::fs::write(&a, b"{\"added\":{}}").unwrap();
        std::fs::write(&b, b"{\"added\":{}}").unwrap();

        let sum_a = file_checksum(&a).unwrap();
        assert_eq!(sum_a, file_checksum(&b).unwrap());

        std::fs::write(&b, b"{\"added\": {}}").unwrap();
        assert_ne!(sum_a, file_checksum(&b).unwrap());

        assert!(file_checksum(&temp.path().join("missing.json")).is_err());
    }
}
