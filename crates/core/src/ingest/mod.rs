//! Ingestion of magnet links into a torrent daemon, with bookkeeping in
//! the replicated store.
//!
//! The daemon itself sits behind the [`Submitter`] trait. Every outcome is
//! recorded: links the daemon accepted (or already had) go to `added`,
//! everything else waits in the retry queue.

mod service;
mod types;

pub use service::IngestService;
pub use types::{
    BackfillSummary, IngestError, IngestOutcome, RemoteTorrent, RetrySummary, SubmitError,
    SubmitReceipt, Submitter,
};
