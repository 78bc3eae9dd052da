//! Scope-reservation ledger.
//!
//! Agents claim exclusive editing rights over a file-path scope for a
//! bounded time. The ledger is the one component with genuine
//! cross-process shared mutable state: a small JSON file of live claims,
//! mutated read-modify-write under an exclusive advisory file lock and
//! persisted via temp-file-then-rename, with every state transition
//! appended to an append-only history log for audit.
//!
//! Expiry is logical — checked lazily on any ledger access, never by a
//! background timer. An expired-but-unswept claim is already dead for
//! conflict purposes; taking over its scope requires an explicit opt-in.

pub mod error;
pub mod reservation;
pub mod scope;
pub mod store;

pub use error::LedgerError;
pub use reservation::{
    AgentReservation, ReservationState, MAX_TTL_MINUTES, MIN_TTL_MINUTES,
};
pub use scope::{classify_overlap, normalize_scope, ScopeOverlap};
pub use store::{ReservationLedger, StatusFilter, StatusReport};
