// ===============================
// src/error.rs
// ===============================
use thiserror::Error;

use crate::domain::Money;

/// Rejected before any write; never has side effects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,
    #[error("amount must be greater than zero (got {0})")]
    NonPositiveAmount(Money),
    #[error("amount {0} exceeds the limit of {max}", max = crate::domain::MAX_AMOUNT)]
    AmountTooLarge(Money),
    #[error("invalid date `{0}` (expected YYYY-MM-DD)")]
    InvalidDate(String),
    #[error("aggregate total overflows")]
    TotalOverflow,
    #[error("month name must not be empty")]
    EmptyMonthName,
    #[error("invalid period `{0}` (expected YYYY-MM)")]
    InvalidPeriod(String),
    #[error("unknown category `{0}`")]
    UnknownCategory(String),
    #[error("unknown loan type `{0}` (expected given|taken)")]
    UnknownLoanKind(String),
}

/// Failures talking to a record store or the aggregate query service.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("bad url: {0}")]
    Url(#[from] url::ParseError),
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("decode: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("{resource} `{id}` not found")]
    NotFound { resource: &'static str, id: String },
    #[error("operator is not authenticated")]
    Unauthorized,
    #[error("rejected: {0}")]
    Invalid(#[from] ValidationError),
    #[error("unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of an authoritative refresh that did not land in the state.
#[derive(Debug, Error)]
pub enum RefreshError {
    /// The aggregate could not be recomputed; the optimistic value stands and
    /// the snapshot is marked stale.
    #[error("refresh #{seq} failed: {source}")]
    Failure {
        seq: u64,
        #[source]
        source: StoreError,
    },
    /// A newer response was already applied.
    #[error("refresh #{seq} arrived after #{applied}; discarded")]
    OrderingConflict { seq: u64, applied: u64 },
    #[error("session closed; refresh #{seq} discarded")]
    SessionClosed { seq: u64 },
}

impl RefreshError {
    pub fn seq(&self) -> u64 {
        match self {
            RefreshError::Failure { seq, .. }
            | RefreshError::OrderingConflict { seq, .. }
            | RefreshError::SessionClosed { seq } => *seq,
        }
    }

    /// True when the snapshot was left stale by this outcome.
    pub fn leaves_stale(&self) -> bool {
        matches!(self, RefreshError::Failure { .. })
    }
}

/// Errors surfaced to the action that initiated a controller operation.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{resource} write failed: {source}")]
    StoreWrite {
        resource: &'static str,
        #[source]
        source: StoreError,
    },
    #[error("{resource} read failed: {source}")]
    StoreRead {
        resource: &'static str,
        #[source]
        source: StoreError,
    },
    #[error("{resource} record `{id}` not found")]
    NotFound { resource: &'static str, id: String },
    #[error(transparent)]
    Refresh(#[from] RefreshError),
}
