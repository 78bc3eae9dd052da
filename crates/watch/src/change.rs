//! Raw change signals.
//!
//! A [`ChangeEvent`] says "something under this project's tracker files
//! moved" — no semantics, just enough for a client to decide whether to
//! refresh. Ephemeral: these exist only on the change bus, never on disk.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use beads_live_core::ProjectIdentity;

/// What class of touch the flush resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Tracker data changed; clients should refresh.
    ContentChanged,
    /// A watched file was renamed or removed.
    RenamedOrRemoved,
    /// A touch that must not trigger a data refresh (heartbeat pulse,
    /// tracker db housekeeping).
    Telemetry,
}

/// One debounced change signal for a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    /// Monotonic per-bus counter, assigned at emission.
    #[serde(default)]
    pub id: u64,
    pub project: ProjectIdentity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed_path: Option<PathBuf>,
    pub kind: ChangeKind,
    pub at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(project: ProjectIdentity, changed_path: Option<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            id: 0,
            project,
            changed_path,
            kind,
            at: Utc::now(),
        }
    }
}
