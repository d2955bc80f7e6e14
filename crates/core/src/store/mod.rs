//! Durable magnet link store.
//!
//! A single JSON document holds every tracked entry, split into an `added`
//! section and a `retry` queue. The document can be replicated to a second
//! location (shared storage) without a server: every write reconciles both
//! copies first and then writes the merged result to each.
//!
//! # Example
//!
//! ```ignore
//! use magnetdb_core::store::{Database, Entry, Section, SyncOrchestrator};
//! use magnetdb_core::StoreConfig;
//!
//! let sync = SyncOrchestrator::new(
//!     StoreConfig::new("/home/me/magnets.json").with_remote("/mnt/nas/magnets.json"),
//! );
//!
//! let mut updates = Database::new();
//! updates.insert(Section::Added, Entry::new(hash, title, uri));
//! let written = sync.apply(&updates)?;
//! println!("{} entries", written.len());
//! ```

mod checksum;
mod error;
mod merge;
mod migrate;
mod persist;
mod sync;
mod types;

pub use checksum::{database_checksum, file_checksum};
pub use error::{FormatError, StoreError};
pub use merge::merge;
pub use migrate::{detect, Detected, SchemaVersion, EMPTY_DOCUMENT_THRESHOLD};
pub use persist::{JsonStore, ReadRetryPolicy};
pub use sync::{ReconcileKind, Reconciled, SyncOrchestrator};
pub use types::{new_uuid, now_rfc3339, Database, Entry, Metadata, Section, MAX_SEQUENCE};
