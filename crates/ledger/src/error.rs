//! Ledger error types.
//!
//! Every failure carries a stable machine-readable code so the transport
//! layer can map it without string-matching messages. Conflict and
//! stale-state are distinct: a live holder is never silently overwritten,
//! and a dead one is never silently taken over.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::reservation::{MAX_TTL_MINUTES, MIN_TTL_MINUTES};

/// Errors surfaced by reservation-ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ttl must be between {MIN_TTL_MINUTES} and {MAX_TTL_MINUTES} minutes, got {minutes}")]
    InvalidTtl { minutes: i64 },

    #[error("agent id must not be empty")]
    InvalidAgent,

    #[error("scope must not be empty")]
    InvalidScope,

    #[error("scope {scope} is actively reserved by {holder} until {expires_at}")]
    Conflict {
        scope: String,
        holder: String,
        expires_at: DateTime<Utc>,
    },

    #[error(
        "scope {scope} has a stale reservation held by {holder} (expired {expired_at}); \
         pass takeover_stale to claim it"
    )]
    StaleReservation {
        scope: String,
        holder: String,
        expired_at: DateTime<Utc>,
    },

    #[error("no active reservation for scope {scope}")]
    NotFound { scope: String },

    #[error("reservation for scope {scope} is held by {holder}, not the releasing agent")]
    NotOwner { scope: String, holder: String },

    #[error("ledger is locked by another process: {path}")]
    Busy { path: PathBuf },

    #[error("ledger io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("ledger file {path} is corrupt: {message}")]
    Corrupt { path: PathBuf, message: String },

    #[error("internal ledger error: {0}")]
    Internal(String),
}

impl LedgerError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InvalidTtl { .. } => "invalid_ttl",
            LedgerError::InvalidAgent => "invalid_agent",
            LedgerError::InvalidScope => "invalid_scope",
            LedgerError::Conflict { .. } => "scope_conflict",
            LedgerError::StaleReservation { .. } => "stale_reservation",
            LedgerError::NotFound { .. } => "not_found",
            LedgerError::NotOwner { .. } => "not_owner",
            LedgerError::Busy { .. } => "ledger_busy",
            LedgerError::Io { .. } => "io_error",
            LedgerError::Corrupt { .. } => "corrupt_ledger",
            LedgerError::Internal(_) => "internal",
        }
    }
}
