//! Domain core for the beads-live coordination substrate.
//!
//! Pure types and functions shared by the watch pipeline and the
//! reservation ledger: canonical project identity, the issue snapshot
//! model, the semantic activity vocabulary, the snapshot differ, and the
//! liveness / session-state classifiers. Everything here is free of I/O —
//! the collaborator traits in [`sources`] are the only boundary to the
//! outside world, and they are implemented elsewhere.

pub mod activity;
pub mod differ;
pub mod error;
pub mod identity;
pub mod issue;
pub mod liveness;
pub mod sources;

pub use activity::{ActivityEvent, ActivityKind, ActivityPayload};
pub use differ::diff_snapshots;
pub use error::CoreError;
pub use identity::ProjectIdentity;
pub use issue::{Issue, IssueSnapshot, IssueStatus};
pub use liveness::{
    agent_liveness, derive_liveness, derive_session_state, Liveness, OwnerExplicitState,
    SessionInputs, SessionState, DEFAULT_STALE_MINUTES,
};
pub use sources::{AgentDirectory, AgentRecord, IssueReader, MailboxMessage, MailboxReader};
