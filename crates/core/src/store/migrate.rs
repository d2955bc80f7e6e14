//! Schema detection and migration.
//!
//! Every load goes through [`detect`], which recognizes the current document
//! shape and the two historical ones, and upgrades whatever it finds into a
//! current-schema [`Database`]:
//!
//! 1. **Current**: `{"metadata": {..}, "added": {..}, "retry": {..}}`. Any
//!    object with a top-level `metadata` key is read this way, so a null
//!    `metadata` or a missing section never demotes it to a legacy shape.
//! 2. **Legacy flat map**: a bare `{"<hash>": {..}}` written by the first
//!    generation of the tool. It had no retry queue, so every entry lands
//!    in `added`. Its `state`, `progress` and `backfilled` fields have no
//!    counterpart and are dropped.
//! 3. **Legacy added/retry**: `{"added": {..}, "retry": {..}}` without
//!    metadata or sequence ids.
//!
//! Schemas are tried in that order against the same buffer. A document
//! that only parses to zero entries is accepted as empty when it is small,
//! and rejected when it is larger than [`EMPTY_DOCUMENT_THRESHOLD`]: a big
//! file with nothing in it is a truncated or corrupted file, not "no data
//! yet".

use std::collections::BTreeMap;

use serde::de::IgnoredAny;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use super::checksum::database_checksum;
use super::error::FormatError;
use super::types::{new_uuid, null_as_empty, Database, Entry, Section, MAX_SEQUENCE};

/// Documents above this size must contain at least one entry.
pub const EMPTY_DOCUMENT_THRESHOLD: usize = 1024;

/// Keys of the wrapper document; a flat map never uses them as hashes.
const WRAPPER_KEYS: [&str; 3] = ["metadata", "added", "retry"];

/// Which on-disk schema a document was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVersion {
    Current,
    LegacyFlat,
    LegacyAddedRetry,
}

impl SchemaVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaVersion::Current => "current",
            SchemaVersion::LegacyFlat => "legacy-flat",
            SchemaVersion::LegacyAddedRetry => "legacy-added-retry",
        }
    }

    pub fn is_legacy(&self) -> bool {
        !matches!(self, SchemaVersion::Current)
    }
}

/// A database recovered from raw bytes.
#[derive(Debug, Clone)]
pub struct Detected {
    pub database: Database,
    pub schema: SchemaVersion,
    /// UUIDs generated while upgrading.
    pub generated_uuids: usize,
}

#[derive(Debug, Deserialize)]
struct LegacyFlatEntry {
    #[serde(default)]
    hash: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    torrent_name: Option<String>,
    #[serde(default)]
    save_path: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    torrent_id: Option<String>,
    #[serde(default)]
    added_to_deluge: Option<String>,
    #[serde(default)]
    first_seen: Option<String>,
    #[serde(default)]
    last_attempt: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LegacyEntry {
    #[serde(default)]
    uuid: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    hash: Option<String>,
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    added_date: Option<String>,
    #[serde(default)]
    last_attempt: Option<String>,
    #[serde(default)]
    retry_count: u32,
    #[serde(default)]
    save_path: Option<String>,
    #[serde(default)]
    torrent_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LegacyDocument {
    #[serde(default, deserialize_with = "null_as_empty")]
    added: BTreeMap<String, LegacyEntry>,
    #[serde(default, deserialize_with = "null_as_empty")]
    retry: BTreeMap<String, LegacyEntry>,
}

/// Recognize `data` and upgrade it into a current-schema database.
pub fn detect(data: &[u8]) -> Result<Detected, FormatError> {
    // First schema that parsed but held no entries.
    let mut parsed_empty: Option<(Database, SchemaVersion)> = None;
    let has_metadata = has_metadata_key(data);

    if has_metadata {
        match serde_json::from_slice::<Database>(data) {
            Ok(db) => {
                check_sequences(&db)?;
                if !db.is_empty() {
                    return Ok(upgrade_current(db));
                }
                parsed_empty = Some((db, SchemaVersion::Current));
            }
            Err(e) => debug!(error = %e, "Not a current-format document"),
        }
    }

    match serde_json::from_slice::<BTreeMap<String, LegacyFlatEntry>>(data) {
        Ok(map) if map.keys().any(|k| WRAPPER_KEYS.contains(&k.as_str())) => {
            debug!("Wrapper document, not a flat map");
        }
        Ok(map) if !map.is_empty() => return Ok(from_flat_map(map)),
        Ok(_) => {
            parsed_empty.get_or_insert_with(|| (Database::new(), SchemaVersion::LegacyFlat));
        }
        Err(e) => debug!(error = %e, "Not a legacy flat map"),
    }

    if has_metadata {
        debug!("Has metadata, not a legacy added/retry document");
    } else {
        match serde_json::from_slice::<LegacyDocument>(data) {
            Ok(doc) if !doc.added.is_empty() || !doc.retry.is_empty() => {
                return Ok(from_legacy_document(doc))
            }
            Ok(_) => {
                parsed_empty
                    .get_or_insert_with(|| (Database::new(), SchemaVersion::LegacyAddedRetry));
            }
            Err(e) => debug!(error = %e, "Not a legacy added/retry document"),
        }
    }

    match parsed_empty {
        Some(_) if data.len() > EMPTY_DOCUMENT_THRESHOLD => {
            error!(
                size = data.len(),
                preview = %preview(data),
                "Document parsed to zero entries under every schema"
            );
            Err(FormatError::EmptyDocument { size: data.len() })
        }
        Some((database, schema)) => {
            debug!(schema = schema.as_str(), "Empty document");
            Ok(Detected {
                database,
                schema,
                generated_uuids: 0,
            })
        }
        None => {
            error!(size = data.len(), preview = %preview(data), "All schema parsers failed");
            Err(FormatError::Unrecognized { size: data.len() })
        }
    }
}

/// Only current documents carry a top-level `metadata` key, even when its
/// value is `null`.
fn has_metadata_key(data: &[u8]) -> bool {
    serde_json::from_slice::<BTreeMap<String, IgnoredAny>>(data)
        .map(|keys| keys.contains_key("metadata"))
        .unwrap_or(false)
}

fn check_sequences(db: &Database) -> Result<(), FormatError> {
    let highest = db.metadata.last_sequence.max(db.max_id());
    if highest > MAX_SEQUENCE {
        error!(value = highest, "Sequence number out of range");
        return Err(FormatError::SequenceOutOfRange { value: highest });
    }
    Ok(())
}

fn preview(data: &[u8]) -> String {
    String::from_utf8_lossy(&data[..data.len().min(200)]).into_owned()
}

/// Bring a current-format document up to the current invariants:
/// hashes match their keys, every entry has a UUID and an id, and the
/// sequence counter covers every id.
fn upgrade_current(mut db: Database) -> Detected {
    for (key, entry) in db.added.iter_mut().chain(db.retry.iter_mut()) {
        if entry.hash != *key {
            if !entry.hash.is_empty() {
                warn!(key = %key, hash = %entry.hash, "Entry hash differs from its key");
            }
            entry.hash = key.clone();
        }
    }

    let generated_uuids = db.ensure_uuids();
    if generated_uuids > 0 {
        info!(count = generated_uuids, "Generated UUIDs for existing entries");
    }

    let mut next = db.next_sequence();
    for entry in db.added.values_mut().chain(db.retry.values_mut()) {
        if entry.id == 0 {
            entry.id = next;
            next += 1;
        }
    }
    db.metadata.last_sequence = next - 1;

    Detected {
        database: db,
        schema: SchemaVersion::Current,
        generated_uuids,
    }
}

fn from_flat_map(map: BTreeMap<String, LegacyFlatEntry>) -> Detected {
    let mut db = Database::new();
    let mut next_id = 1;

    for (key, v0) in map {
        let hash = v0.hash.filter(|h| !h.is_empty()).unwrap_or_else(|| key.clone());
        let uri = v0
            .uri
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| format!("magnet:?xt=urn:btih:{}", hash));

        let entry = Entry {
            uuid: new_uuid(),
            id: next_id,
            title: v0.title.unwrap_or_default(),
            hash: key.clone(),
            uri,
            added_date: v0.first_seen.clone(),
            first_seen: v0.first_seen,
            last_attempt: v0.last_attempt,
            status: v0.status,
            torrent_id: v0.torrent_id,
            added_to_deluge: v0.added_to_deluge,
            retry_count: 0,
            save_path: v0.save_path,
            torrent_name: v0.torrent_name,
        };
        db.added.insert(key, entry);
        next_id += 1;
    }

    let generated = db.len();
    finish_legacy(db, next_id - 1, generated, SchemaVersion::LegacyFlat)
}

fn from_legacy_document(doc: LegacyDocument) -> Detected {
    let mut db = Database::new();
    let mut next_id = 1;
    let mut generated_uuids = 0;

    let sections = [(Section::Added, doc.added), (Section::Retry, doc.retry)];
    for (section, entries) in sections {
        for (key, v1) in entries {
            // A hash listed in both sections stays in `added`.
            if db.contains(&key) {
                continue;
            }
            let uuid = match v1.uuid.filter(|u| !u.is_empty()) {
                Some(uuid) => uuid,
                None => {
                    generated_uuids += 1;
                    new_uuid()
                }
            };
            let entry = Entry {
                uuid,
                id: next_id,
                title: v1.title.unwrap_or_default(),
                hash: key.clone(),
                uri: v1.uri.unwrap_or_default(),
                added_date: v1.added_date,
                last_attempt: v1.last_attempt,
                retry_count: v1.retry_count,
                save_path: v1.save_path,
                torrent_name: v1.torrent_name,
                ..Default::default()
            };
            if v1.hash.as_deref().is_some_and(|h| !h.is_empty() && h != key) {
                warn!(key = %key, "Legacy entry hash differs from its key");
            }
            db.insert(section, entry);
            next_id += 1;
        }
    }

    finish_legacy(db, next_id - 1, generated_uuids, SchemaVersion::LegacyAddedRetry)
}

fn finish_legacy(
    mut db: Database,
    generated_ids: u64,
    generated_uuids: usize,
    schema: SchemaVersion,
) -> Detected {
    db.metadata.last_sequence = generated_ids;
    db.metadata.checksum = database_checksum(&db);
    info!(
        schema = schema.as_str(),
        entries = db.len(),
        "Loaded legacy format, will be rewritten in the current format on next save"
    );
    Detected {
        database: db,
        schema,
        generated_uuids,
    }
}
