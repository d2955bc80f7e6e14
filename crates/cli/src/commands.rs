use std::path::Path;

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{info, warn};

use magnetdb_core::store::now_rfc3339;
use magnetdb_core::{
    database_checksum, file_checksum, Config, Database, Entry, JsonStore, MagnetLink,
    ReconcileKind, Section, SyncOrchestrator,
};

pub fn record(config: &Config, uri: &str, retry: bool) -> Result<()> {
    let link = MagnetLink::parse(uri).context("Refusing to record magnet link")?;
    let sync = SyncOrchestrator::new(config.store.clone());

    let current = sync.load_merged().context("Failed to load database")?;
    if let Some(section) = current.section_of(&link.hash) {
        println!("already recorded in {}: {}", section.as_str(), link);
        return Ok(());
    }

    let now = now_rfc3339();
    let section = if retry { Section::Retry } else { Section::Added };
    let entry = Entry {
        added_date: Some(now.clone()),
        last_attempt: Some(now),
        retry_count: 1,
        ..Entry::new(&link.hash, &link.name, &link.uri)
    };

    let mut updates = Database::new();
    updates.insert(section, entry);
    let written = sync.apply(&updates).context("Failed to save database")?;

    let id = written.get(&link.hash).map(|e| e.id).unwrap_or_default();
    println!("recorded in {} (id {}): {}", section.as_str(), id, link);
    Ok(())
}

pub fn migrate(config: &Config) -> Result<()> {
    let store = JsonStore::new(config.store.retry_policy());
    let local = &config.store.local_path;

    store
        .migrate(local)
        .with_context(|| format!("Failed to migrate {:?}", local))?;
    println!("migrated {}", local.display());

    if let Some(remote) = &config.store.remote_path {
        match store.migrate(remote) {
            Ok(()) => println!("migrated {}", remote.display()),
            Err(e) => warn!(path = %remote.display(), error = %e, "Could not migrate remote copy"),
        }
    }
    Ok(())
}

pub fn reconcile(config: &Config) -> Result<()> {
    let sync = SyncOrchestrator::new(config.store.clone());
    let reconciled = sync.reconcile().context("Failed to reconcile")?;

    if reconciled.kind == ReconcileKind::Identical {
        println!("already in sync ({} entries)", reconciled.database.len());
        return Ok(());
    }

    let mut db = reconciled.database;
    sync.replicate(&mut db).context("Failed to write database")?;
    info!(kind = ?reconciled.kind, entries = db.len(), "Reconciled");
    println!(
        "reconciled ({:?}): {} added, {} retry, last sequence {}",
        reconciled.kind,
        db.added.len(),
        db.retry.len(),
        db.metadata.last_sequence
    );
    Ok(())
}

pub fn status(config: &Config, as_json: bool) -> Result<()> {
    let sync = SyncOrchestrator::new(config.store.clone());
    let reconciled = sync.reconcile().context("Failed to load database")?;
    let db = &reconciled.database;

    let computed = database_checksum(db);
    let duplicates = db.duplicate_ids();

    if as_json {
        let report = json!({
            "local_path": config.store.local_path,
            "remote_path": config.store.remote_path,
            "label": config.ingest.label,
            "reconcile": format!("{:?}", reconciled.kind),
            "added": db.added.len(),
            "retry": db.retry.len(),
            "last_sequence": db.metadata.last_sequence,
            "last_modified": db.metadata.last_modified,
            "stored_checksum": db.metadata.checksum,
            "computed_checksum": computed,
            "duplicate_ids": duplicates,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("local:  {}", config.store.local_path.display());
    match &config.store.remote_path {
        Some(remote) => println!("remote: {}", remote.display()),
        None => println!("remote: (none)"),
    }
    if !config.ingest.label.is_empty() {
        println!("label:  {}", config.ingest.label);
    }
    println!("state:  {:?}", reconciled.kind);
    println!("added:  {}", db.added.len());
    println!("retry:  {}", db.retry.len());
    println!("last sequence: {}", db.metadata.last_sequence);
    if db.metadata.checksum == computed {
        println!("checksum: {} (ok)", computed);
    } else {
        println!(
            "checksum: {} (stored {})",
            computed,
            if db.metadata.checksum.is_empty() {
                "none"
            } else {
                db.metadata.checksum.as_str()
            }
        );
    }
    for (id, hashes) in &duplicates {
        println!("duplicate id {}: {}", id, hashes.join(", "));
    }
    Ok(())
}

pub fn checksum(path: &Path) -> Result<()> {
    let sum = file_checksum(path).with_context(|| format!("Failed to read {:?}", path))?;
    println!("{}  {}", sum, path.display());
    Ok(())
}
