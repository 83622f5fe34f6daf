//! # resq-core
//!
//! Pure logic for ResQLink (no I/O, instant tests).
//!
//! This crate implements the request lifecycle and the reconciliation merge
//! without any network or disk I/O, enabling fast unit tests.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. The node crate owns storage, transports and tasks,
//! and calls into these functions while holding the relevant per-request lock.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod draft;
pub mod lifecycle;
pub mod peers;
pub mod reconcile;
pub mod summary;

pub use draft::{
    DraftError, RequestDraft, KNOWN_KINDS, MAX_DESCRIPTION_CHARS, MIN_DESCRIPTION_CHARS,
};
pub use lifecycle::{allowed_next, can_transition, is_terminal, role_actions};
pub use peers::PeerTable;
pub use reconcile::{
    canonicalize, merge, next_entry_timestamp, FieldConflict, MergeAnomaly, MergeOutcome,
};
pub use summary::StatusSummary;
