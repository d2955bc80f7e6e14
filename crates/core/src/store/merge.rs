//! Deterministic reconciliation of two database snapshots.
//!
//! For every hash present in either snapshot, up to four candidates are
//! considered, always in this order:
//!
//! 1. local `added`
//! 2. local `retry`
//! 3. remote `added`
//! 4. remote `retry`
//!
//! An `added` candidate outranks any `retry` candidate. Within a tier the
//! higher `id` wins. When tier and `id` are equal, the candidate earlier in
//! the list wins, regardless of content. That last rule is arbitrary but
//! fixed: two copies that edited the same entry without bumping its id
//! resolve in favour of the local copy.

use std::collections::BTreeSet;

use tracing::debug;

use super::checksum::database_checksum;
use super::types::{now_rfc3339, Database, Entry, Section};

#[derive(Debug, Clone, Copy)]
struct Candidate<'a> {
    section: Section,
    entry: &'a Entry,
}

impl Candidate<'_> {
    fn outranks(&self, other: &Candidate<'_>) -> bool {
        match (self.section, other.section) {
            (Section::Added, Section::Retry) => true,
            (Section::Retry, Section::Added) => false,
            _ => self.entry.id > other.entry.id,
        }
    }
}

/// Candidates for `hash` in fixed priority order.
fn candidates<'a>(
    hash: &str,
    local: &'a Database,
    remote: &'a Database,
) -> [Option<Candidate<'a>>; 4] {
    let pick = |db: &'a Database, section: Section| {
        db.section(section)
            .get(hash)
            .map(|entry| Candidate { section, entry })
    };
    [
        pick(local, Section::Added),
        pick(local, Section::Retry),
        pick(remote, Section::Added),
        pick(remote, Section::Retry),
    ]
}

/// Pick the winning candidate; earlier candidates win ties.
fn select<'a>(candidates: [Option<Candidate<'a>>; 4]) -> Option<Candidate<'a>> {
    candidates
        .into_iter()
        .flatten()
        .fold(None, |winner, candidate| match winner {
            Some(current) if !candidate.outranks(&current) => Some(current),
            _ => Some(candidate),
        })
}

/// Merge two snapshots into one. Every hash from either input survives.
pub fn merge(local: &Database, remote: &Database) -> Database {
    let hashes: BTreeSet<&String> = local
        .added
        .keys()
        .chain(local.retry.keys())
        .chain(remote.added.keys())
        .chain(remote.retry.keys())
        .collect();

    let mut winners: Vec<(Section, Entry)> = Vec::with_capacity(hashes.len());
    for hash in hashes {
        if let Some(winner) = select(candidates(hash, local, remote)) {
            winners.push((winner.section, winner.entry.clone()));
        }
    }

    // Fresh ids go above every id either side has ever handed out, and
    // above every id that survives, so they never collide.
    let mut next_id = local.next_sequence().max(remote.next_sequence());
    for (_, entry) in &winners {
        if entry.id >= next_id {
            next_id = entry.id + 1;
        }
    }

    let mut merged = Database::new();
    let mut assigned = 0usize;
    for (section, mut entry) in winners {
        if entry.id == 0 {
            entry.id = next_id;
            next_id += 1;
            assigned += 1;
        }
        merged.insert(section, entry);
    }

    merged.metadata.last_sequence = next_id - 1;
    merged.metadata.last_modified = now_rfc3339();
    merged.metadata.checksum = database_checksum(&merged);

    debug!(
        local = local.len(),
        remote = remote.len(),
        merged = merged.len(),
        assigned_ids = assigned,
        last_sequence = merged.metadata.last_sequence,
        "Merged databases"
    );

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const B: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
    const C: &str = "cccccccccccccccccccccccccccccccccccccccc";

    fn entry(hash: &str, id: u64, title: &str) -> Entry {
        Entry {
            id,
            ..Entry::new(hash, title, format!("magnet:?xt=urn:btih:{}", hash))
        }
    }

    fn db(added: &[Entry], retry: &[Entry]) -> Database {
        let mut db = Database::new();
        for e in added {
            db.insert(Section::Added, e.clone());
        }
        for e in retry {
            db.insert(Section::Retry, e.clone());
        }
        db.metadata.last_sequence = db.max_id();
        db
    }

    fn hashes(db: &Database) -> Vec<(Section, String)> {
        db.entries().map(|(s, e)| (s, e.hash.clone())).collect()
    }

    #[test]
    fn test_merge_scenario_equal_ids_first_candidate_wins() {
        let local = db(&[entry(A, 1, "Local title")], &[]);
        let remote = db(&[entry(A, 1, "Remote title"), entry(C, 3, "C")], &[]);

        let merged = merge(&local, &remote);
        assert_eq!(merged.added.len(), 2);
        assert_eq!(merged.added[A].title, "Local title");
        assert_eq!(merged.added[C].id, 3);
        assert_eq!(merged.metadata.last_sequence, 3);

        // Swapping the arguments swaps the tie-break.
        let swapped = merge(&remote, &local);
        assert_eq!(swapped.added[A].title, "Remote title");
    }

    #[test]
    fn test_merge_is_lossless() {
        let local = db(&[entry(A, 1, "A")], &[entry(B, 2, "B")]);
        let remote = db(&[entry(C, 1, "C")], &[]);

        let merged = merge(&local, &remote);
        for hash in [A, B, C] {
            assert!(merged.contains(hash), "missing {}", hash);
        }
        assert_eq!(merged.section_of(B), Some(Section::Retry));
    }

    #[test]
    fn test_added_outranks_retry_even_with_lower_id() {
        let local = db(&[], &[entry(A, 9, "retry copy")]);
        let remote = db(&[entry(A, 2, "added copy")], &[]);

        let merged = merge(&local, &remote);
        assert_eq!(merged.section_of(A), Some(Section::Added));
        assert_eq!(merged.added[A].title, "added copy");
        assert!(merged.retry.is_empty());
    }

    #[test]
    fn test_higher_id_wins_within_tier() {
        let local = db(&[], &[entry(A, 2, "older")]);
        let remote = db(&[], &[entry(A, 5, "newer")]);

        let merged = merge(&local, &remote);
        assert_eq!(merged.retry[A].title, "newer");
    }

    #[test]
    fn test_missing_ids_get_fresh_non_colliding_ids() {
        let local = db(&[entry(A, 0, "A")], &[entry(B, 0, "B")]);
        let remote = db(&[entry(C, 4, "C")], &[]);

        let merged = merge(&local, &remote);
        assert_eq!(merged.added[C].id, 4);
        assert_eq!(merged.added[A].id, 5);
        assert_eq!(merged.retry[B].id, 6);
        assert_eq!(merged.metadata.last_sequence, 6);
        assert!(merged.duplicate_ids().is_empty());
    }

    #[test]
    fn test_last_sequence_never_decreases() {
        let mut local = db(&[entry(A, 1, "A")], &[]);
        local.metadata.last_sequence = 40;
        let remote = db(&[entry(B, 2, "B")], &[]);

        let merged = merge(&local, &remote);
        assert_eq!(merged.metadata.last_sequence, 40);
    }

    #[test]
    fn test_merge_is_union_idempotent() {
        let a = db(&[entry(A, 1, "A"), entry(B, 0, "B-local")], &[entry(C, 2, "C")]);
        let b = db(&[entry(C, 1, "C-added")], &[entry(B, 3, "B-remote")]);

        let once = merge(&a, &b);
        let twice = merge(&once, &b);
        assert_eq!(hashes(&once), hashes(&twice));
        for (_, e) in once.entries() {
            assert_eq!(twice.get(&e.hash), Some(e));
        }

        let with_a = merge(&once, &a);
        assert_eq!(hashes(&once), hashes(&with_a));
    }

    #[test]
    fn test_merge_with_empty_keeps_everything() {
        let a = db(&[entry(A, 1, "A")], &[entry(B, 2, "B")]);
        let merged = merge(&a, &Database::new());
        assert_eq!(hashes(&merged), hashes(&a));
        assert_eq!(merged.metadata.checksum, database_checksum(&merged));
    }
}
