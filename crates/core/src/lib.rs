pub mod config;
pub mod ingest;
pub mod magnet;
pub mod store;
pub mod testing;

pub use config::{
    default_config_path, load_config, load_config_from_str, load_config_or_default,
    validate_config, Config, ConfigError, IngestConfig, StoreConfig,
};
pub use ingest::{
    BackfillSummary, IngestError, IngestOutcome, IngestService, RemoteTorrent, RetrySummary,
    SubmitError, SubmitReceipt, Submitter,
};
pub use magnet::{MagnetError, MagnetLink};
pub use store::{
    database_checksum, file_checksum, merge, Database, Entry, FormatError, JsonStore,
    ReconcileKind, SchemaVersion, Section, StoreError, SyncOrchestrator,
};
