//! Core store data types.

use std::collections::{BTreeMap, HashMap};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Largest id or sequence counter a document may carry.
///
/// Ids are signed 64-bit integers on disk, and staying at or below this
/// bound leaves room for the counter to advance without overflowing.
pub const MAX_SEQUENCE: u64 = i64::MAX as u64;

/// Current time as an RFC 3339 timestamp with second precision.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Generate a fresh random (v4) UUID string.
pub fn new_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Which section of the database an entry lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    /// Confirmed submitted (or confirmed duplicate).
    Added,
    /// Submission failed, queued for a later attempt.
    Retry,
}

impl Section {
    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Added => "added",
            Section::Retry => "retry",
        }
    }
}

/// One tracked magnet link, keyed by its info hash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Durable identity, generated once.
    #[serde(default)]
    pub uuid: String,
    /// Sequence number, used only for ordering and merge tie-breaks.
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub title: String,
    /// Info hash (lowercase hex). Always equal to the map key.
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub torrent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_to_deluge: Option<String>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub torrent_name: Option<String>,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

impl Entry {
    /// Create a new, unsaved entry with a fresh UUID and no sequence id.
    pub fn new(hash: impl Into<String>, title: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            uuid: new_uuid(),
            title: title.into(),
            hash: hash.into(),
            uri: uri.into(),
            ..Default::default()
        }
    }
}

/// Sync bookkeeping stored alongside the entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Highest id ever assigned. Never decreases.
    #[serde(default)]
    pub last_sequence: u64,
    /// Timestamp of the most recent write.
    #[serde(default)]
    pub last_modified: String,
    /// Digest of `added` + `retry` at the last write.
    #[serde(default)]
    pub checksum: String,
}

/// The whole on-disk document.
///
/// Maps are ordered so that serialization is canonical.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Database {
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: Metadata,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub added: BTreeMap<String, Entry>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub retry: BTreeMap<String, Entry>,
}

/// Older writers emitted `null` for empty sections.
pub(crate) fn null_as_empty<'de, D, T>(deserializer: D) -> Result<BTreeMap<String, T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    null_as_default(deserializer)
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Database {
    /// An empty current-schema database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of entries across both sections.
    pub fn len(&self) -> usize {
        self.added.len() + self.retry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.retry.is_empty()
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.section_of(hash).is_some()
    }

    /// The section holding `hash`, if any. `added` is checked first.
    pub fn section_of(&self, hash: &str) -> Option<Section> {
        if self.added.contains_key(hash) {
            Some(Section::Added)
        } else if self.retry.contains_key(hash) {
            Some(Section::Retry)
        } else {
            None
        }
    }

    pub fn get(&self, hash: &str) -> Option<&Entry> {
        self.added.get(hash).or_else(|| self.retry.get(hash))
    }

    pub fn section(&self, section: Section) -> &BTreeMap<String, Entry> {
        match section {
            Section::Added => &self.added,
            Section::Retry => &self.retry,
        }
    }

    fn section_mut(&mut self, section: Section) -> &mut BTreeMap<String, Entry> {
        match section {
            Section::Added => &mut self.added,
            Section::Retry => &mut self.retry,
        }
    }

    /// Insert an entry under its hash, removing it from the other section.
    ///
    /// Returns the entry previously stored for that hash in either section.
    pub fn insert(&mut self, section: Section, entry: Entry) -> Option<Entry> {
        let hash = entry.hash.clone();
        let previous = self.remove(&hash);
        self.section_mut(section).insert(hash, entry);
        previous
    }

    /// Remove `hash` from whichever section holds it.
    pub fn remove(&mut self, hash: &str) -> Option<Entry> {
        let from_added = self.added.remove(hash);
        let from_retry = self.retry.remove(hash);
        from_added.or(from_retry)
    }

    /// Iterate every entry together with its section, `added` first.
    pub fn entries(&self) -> impl Iterator<Item = (Section, &Entry)> {
        self.added
            .values()
            .map(|e| (Section::Added, e))
            .chain(self.retry.values().map(|e| (Section::Retry, e)))
    }

    /// Highest id present in either section (0 when empty).
    pub fn max_id(&self) -> u64 {
        self.entries().map(|(_, e)| e.id).max().unwrap_or(0)
    }

    /// Next id to hand out: above both the stored counter and every id present.
    pub fn next_sequence(&self) -> u64 {
        self.metadata.last_sequence.max(self.max_id()) + 1
    }

    /// Give every entry lacking a UUID a fresh one. Returns how many were generated.
    pub fn ensure_uuids(&mut self) -> usize {
        let mut generated = 0;
        for entry in self.added.values_mut().chain(self.retry.values_mut()) {
            if entry.uuid.is_empty() {
                entry.uuid = new_uuid();
                generated += 1;
            }
        }
        generated
    }

    /// Ids shared by more than one hash, with the hashes sharing them.
    pub fn duplicate_ids(&self) -> BTreeMap<u64, Vec<String>> {
        let mut by_id: HashMap<u64, Vec<String>> = HashMap::new();
        for (_, entry) in self.entries() {
            if entry.id != 0 {
                by_id.entry(entry.id).or_default().push(entry.hash.clone());
            }
        }
        by_id
            .into_iter()
            .filter(|(_, hashes)| hashes.len() > 1)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(hash: &str, id: u64) -> Entry {
        Entry {
            id,
            ..Entry::new(hash, "title", format!("magnet:?xt=urn:btih:{}", hash))
        }
    }

    #[test]
    fn test_insert_moves_between_sections() {
        let mut db = Database::new();
        db.insert(Section::Retry, entry("aaa", 1));
        assert_eq!(db.section_of("aaa"), Some(Section::Retry));

        let previous = db.insert(Section::Added, entry("aaa", 1));
        assert!(previous.is_some());
        assert_eq!(db.section_of("aaa"), Some(Section::Added));
        assert!(db.retry.is_empty());
        assert_eq!(db.len(), 1);
    }

    #[test]
    fn test_next_sequence_respects_counter_and_ids() {
        let mut db = Database::new();
        assert_eq!(db.next_sequence(), 1);

        db.insert(Section::Added, entry("aaa", 7));
        assert_eq!(db.next_sequence(), 8);

        db.metadata.last_sequence = 20;
        assert_eq!(db.next_sequence(), 21);
    }

    #[test]
    fn test_ensure_uuids_only_fills_missing() {
        let mut db = Database::new();
        let mut bare = entry("aaa", 1);
        bare.uuid.clear();
        db.insert(Section::Added, bare);
        db.insert(Section::Retry, entry("bbb", 2));
        let kept = db.retry["bbb"].uuid.clone();

        assert_eq!(db.ensure_uuids(), 1);
        assert!(!db.added["aaa"].uuid.is_empty());
        assert_eq!(db.retry["bbb"].uuid, kept);
        assert_eq!(db.ensure_uuids(), 0);
    }

    #[test]
    fn test_duplicate_ids() {
        let mut db = Database::new();
        db.insert(Section::Added, entry("aaa", 1));
        db.insert(Section::Retry, entry("bbb", 1));
        db.insert(Section::Added, entry("ccc", 2));

        let dups = db.duplicate_ids();
        assert_eq!(dups.len(), 1);
        assert_eq!(dups[&1].len(), 2);
    }

    #[test]
    fn test_null_sections_deserialize_as_empty() {
        let json = r#"{"metadata": {"last_sequence": 3}, "added": null, "retry": null}"#;
        let db: Database = serde_json::from_str(json).unwrap();
        assert!(db.is_empty());
        assert_eq!(db.metadata.last_sequence, 3);
    }

    #[test]
    fn test_missing_or_null_parts_deserialize_as_default() {
        let db: Database = serde_json::from_str(r#"{"metadata": null, "added": {}}"#).unwrap();
        assert_eq!(db.metadata, Metadata::default());
        assert!(db.retry.is_empty());

        let db: Database = serde_json::from_str(r#"{"metadata": {"last_sequence": 2}}"#).unwrap();
        assert!(db.is_empty());
        assert_eq!(db.metadata.last_sequence, 2);
    }

    #[test]
    fn test_entry_omits_absent_fields() {
        let json = serde_json::to_value(entry("aaa", 1)).unwrap();
        assert!(json.get("status").is_none());
        assert!(json.get("retry_count").is_none());
        assert_eq!(json["id"], 1);
    }
}
