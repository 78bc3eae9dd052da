//! Liveness and session-state classification.
//!
//! Pure derivation, nothing stored: agents report "last seen" timestamps
//! and explicit states through the collaborator traits, tasks carry
//! tracker status, and the functions here fold that evidence into the
//! status labels the UI renders. The session-state priority order is a
//! hard contract — see [`derive_session_state`].

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::issue::{Issue, IssueStatus};
use crate::sources::AgentRecord;

/// Default minutes of silence before an agent counts as stale.
pub const DEFAULT_STALE_MINUTES: i64 = 15;

/// Minutes of silence after which an agent counts as idle.
const IDLE_MINUTES: i64 = 60;

/// Coarse "is this agent still working" classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Liveness {
    Active,
    Stale,
    Evicted,
    Idle,
}

/// State an agent has explicitly declared for itself, as opposed to what
/// elapsed time implies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerExplicitState {
    Working,
    Reviewing,
    Stuck,
    Dead,
}

/// Per-task status label combining tracker status, owner liveness, and
/// pending acknowledgements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    Reviewing,
    Deciding,
    NeedsInput,
    Completed,
    Stale,
    Evicted,
    Idle,
    Stuck,
    Dead,
}

/// Classify an agent by elapsed time since last contact.
///
/// Bands are inclusive on their lower edge: exactly `stale_minutes`
/// elapsed is already `Stale`, exactly `2 × stale_minutes` is `Evicted`,
/// exactly 60 minutes is `Idle`. A `last_seen_at` in the future counts as
/// `Active`.
pub fn derive_liveness(
    last_seen_at: DateTime<Utc>,
    now: DateTime<Utc>,
    stale_minutes: i64,
) -> Liveness {
    let elapsed = now - last_seen_at;
    if elapsed < Duration::minutes(stale_minutes) {
        Liveness::Active
    } else if elapsed < Duration::minutes(stale_minutes * 2) {
        Liveness::Stale
    } else if elapsed < Duration::minutes(IDLE_MINUTES) {
        Liveness::Evicted
    } else {
        Liveness::Idle
    }
}

/// Liveness of an agent as the directory reports it, or `None` when the
/// agent has never been seen.
pub fn agent_liveness(
    record: &AgentRecord,
    now: DateTime<Utc>,
    stale_minutes: i64,
) -> Option<Liveness> {
    record
        .last_seen_at
        .map(|seen| derive_liveness(seen, now, stale_minutes))
}

/// Inputs to [`derive_session_state`]. Gathered by the caller from the
/// tracker, the agent directory, and the mailbox.
#[derive(Debug, Clone)]
pub struct SessionInputs<'a> {
    pub task: &'a Issue,
    /// Timestamp of the task's own most recent activity event, if any.
    pub last_activity_at: Option<DateTime<Utc>>,
    /// A required-acknowledgement message for this task is still unread.
    pub pending_required_ack: bool,
    pub owner_liveness: Option<Liveness>,
    pub owner_explicit_state: Option<OwnerExplicitState>,
}

/// Fold task status, owner state, and staleness into one label.
///
/// Priority order, highest first — this ordering is a contract:
///
/// 1. closed task → `Completed`, regardless of any other input
/// 2. explicit owner `Stuck` / `Dead` → same (liveness never overrides)
/// 3. blocked status or a pending required ack → `NeedsInput`
/// 4. explicit owner `Reviewing` → `Reviewing`
/// 5. owner liveness `Evicted` / `Stale` / `Idle` → same
/// 6. task's own last activity older than the stale threshold → `Stale`
/// 7. in-progress status → `Active`
/// 8. otherwise → `Deciding`
pub fn derive_session_state(
    inputs: &SessionInputs<'_>,
    now: DateTime<Utc>,
    stale_minutes: i64,
) -> SessionState {
    if inputs.task.status.is_closed() {
        return SessionState::Completed;
    }

    match inputs.owner_explicit_state {
        Some(OwnerExplicitState::Stuck) => return SessionState::Stuck,
        Some(OwnerExplicitState::Dead) => return SessionState::Dead,
        _ => {}
    }

    if inputs.task.status == IssueStatus::Blocked || inputs.pending_required_ack {
        return SessionState::NeedsInput;
    }

    if inputs.owner_explicit_state == Some(OwnerExplicitState::Reviewing) {
        return SessionState::Reviewing;
    }

    match inputs.owner_liveness {
        Some(Liveness::Evicted) => return SessionState::Evicted,
        Some(Liveness::Stale) => return SessionState::Stale,
        Some(Liveness::Idle) => return SessionState::Idle,
        _ => {}
    }

    if let Some(last_activity) = inputs.last_activity_at {
        if now - last_activity >= Duration::minutes(stale_minutes) {
            return SessionState::Stale;
        }
    }

    if inputs.task.status == IssueStatus::InProgress {
        return SessionState::Active;
    }

    SessionState::Deciding
}
