//! Reconciliation of two copies of the same request.
//!
//! The merge is an idempotent union of status-history entries:
//!
//! - entries are identified by the exact tuple `(status, timestamp, updated_by)`
//! - the union is sorted by `timestamp`, ties by `updated_by`, then by status rank
//! - the merged `status` is the status of the last entry
//! - immutable fields come from whichever copy has them; on conflict the local
//!   copy wins and the conflict is reported as a [`MergeAnomaly`]
//!
//! Because the result depends only on the set of entries, merging A then B
//! gives the same record as merging B then A, and merging the same copy twice
//! changes nothing the second time.

use std::cmp::Ordering;
use std::collections::HashSet;

use resq_types::{DisasterRequest, RequestId, StatusEntry};

/// An immutable field whose local and remote values disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldConflict {
    /// `sender_id` differs.
    SenderId,
    /// Creation `timestamp` differs.
    Timestamp,
    /// `kind` differs.
    Kind,
    /// `description` differs.
    Description,
    /// `location` differs.
    Location,
}

/// Immutable-field mismatch between two copies of one request.
///
/// Never fatal: the local values are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeAnomaly {
    /// The request whose copies disagree.
    pub id: RequestId,
    /// Which fields disagreed.
    pub fields: Vec<FieldConflict>,
}

/// Result of merging a remote copy into the local one.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    /// The canonical record to store.
    pub merged: DisasterRequest,
    /// Number of distinct history entries the remote copy contributed.
    pub added: usize,
    /// Immutable-field conflicts, if any.
    pub anomaly: Option<MergeAnomaly>,
}

impl MergeOutcome {
    /// True if the remote copy brought history this device did not have.
    ///
    /// Only such merges are re-broadcast.
    pub fn has_new_entries(&self) -> bool {
        self.added > 0
    }
}

/// Total order on history entries.
fn history_order(a: &StatusEntry, b: &StatusEntry) -> Ordering {
    a.timestamp
        .cmp(&b.timestamp)
        .then_with(|| a.updated_by.cmp(&b.updated_by))
        .then_with(|| a.status.rank().cmp(&b.status.rank()))
}

/// Sort and deduplicate history entries.
fn normalize_history(entries: impl IntoIterator<Item = StatusEntry>) -> Vec<StatusEntry> {
    let mut history: Vec<StatusEntry> = entries.into_iter().collect();
    history.sort_by(history_order);
    // The order covers every field of the tuple, so duplicates are adjacent.
    history.dedup();
    history
}

/// Bring a single record into canonical form.
///
/// Deduplicates and sorts the history and sets `status` from its last entry.
/// A no-op for well-formed records.
pub fn canonicalize(mut record: DisasterRequest) -> DisasterRequest {
    record.status_history = normalize_history(record.status_history);
    if let Some(last) = record.status_history.last() {
        record.status = last.status;
    }
    record
}

/// Timestamp for a new local entry so that it sorts after every entry
/// already in `history`.
///
/// Returns `now` unless the device clock is at or behind the newest entry,
/// in which case the entry is placed one millisecond after it.
pub fn next_entry_timestamp(history: &[StatusEntry], now: i64) -> i64 {
    match history.iter().map(|e| e.timestamp).max() {
        Some(newest) if now <= newest => newest.saturating_add(1),
        _ => now,
    }
}

fn prefer_local<T: Clone + PartialEq>(
    local: &T,
    remote: &T,
    is_empty: impl Fn(&T) -> bool,
    field: FieldConflict,
    conflicts: &mut Vec<FieldConflict>,
) -> T {
    if is_empty(local) {
        return remote.clone();
    }
    if !is_empty(remote) && local != remote {
        conflicts.push(field);
    }
    local.clone()
}

/// Merge a remote copy of a request into the local copy.
///
/// Both records are expected to share an id; the local id is kept.
pub fn merge(local: &DisasterRequest, remote: &DisasterRequest) -> MergeOutcome {
    let known: HashSet<&StatusEntry> = local.status_history.iter().collect();
    let added = remote
        .status_history
        .iter()
        .filter(|entry| !known.contains(entry))
        .collect::<HashSet<_>>()
        .len();

    let status_history = normalize_history(
        local
            .status_history
            .iter()
            .chain(remote.status_history.iter())
            .cloned(),
    );
    let status = status_history
        .last()
        .map_or(local.status, |entry| entry.status);

    let mut conflicts = Vec::new();
    let sender_id = prefer_local(
        &local.sender_id,
        &remote.sender_id,
        |id| id.is_empty(),
        FieldConflict::SenderId,
        &mut conflicts,
    );
    let timestamp = prefer_local(
        &local.timestamp,
        &remote.timestamp,
        |ts| *ts <= 0,
        FieldConflict::Timestamp,
        &mut conflicts,
    );
    let kind = prefer_local(
        &local.kind,
        &remote.kind,
        |s| s.is_empty(),
        FieldConflict::Kind,
        &mut conflicts,
    );
    let description = prefer_local(
        &local.description,
        &remote.description,
        |s| s.is_empty(),
        FieldConflict::Description,
        &mut conflicts,
    );
    let location = prefer_local(
        &local.location,
        &remote.location,
        |loc| loc.is_none(),
        FieldConflict::Location,
        &mut conflicts,
    );

    let anomaly = (!conflicts.is_empty()).then(|| MergeAnomaly {
        id: local.id.clone(),
        fields: conflicts,
    });

    MergeOutcome {
        merged: DisasterRequest {
            id: local.id.clone(),
            timestamp,
            sender_id,
            kind,
            description,
            status,
            status_history,
            location,
        },
        added,
        anomaly,
    }
}
