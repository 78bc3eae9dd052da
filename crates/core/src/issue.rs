//! Issue records and point-in-time snapshots of the tracker.
//!
//! An [`IssueSnapshot`] is "the tracker as of last successful read" for one
//! project: an ordered set of issue records replaced wholesale on every
//! re-read, never partially mutated. Field names follow the tracker's
//! on-disk JSONL form.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tracker status of an issue.
///
/// The tracker tombstones rather than deletes: an issue that disappears
/// from a listing has transitioned to `Closed`, not vanished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    Open,
    InProgress,
    Blocked,
    Deferred,
    Closed,
}

impl IssueStatus {
    /// Whether this status is a tombstone state.
    pub fn is_closed(self) -> bool {
        matches!(self, IssueStatus::Closed)
    }
}

/// One issue record as read from the tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub title: String,
    pub status: IssueStatus,
    /// 0 (highest) through 4 (lowest), tracker convention.
    #[serde(default)]
    pub priority: u8,
    #[serde(default)]
    pub issue_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    /// Issue ids this issue depends on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    /// Estimated effort in minutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimate_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    /// Number of comments the tracker reports for this issue.
    #[serde(default)]
    pub comment_count: u32,
    /// Tracker fields the core does not model. Changes to these keys still
    /// surface as generic `field_changed` activity.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Issue {
    /// Minimal issue for construction in collaborators and tests.
    pub fn new(id: impl Into<String>, title: impl Into<String>, status: IssueStatus) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            status,
            priority: 2,
            issue_type: "task".to_string(),
            assignee: None,
            description: String::new(),
            labels: Vec::new(),
            dependencies: Vec::new(),
            due_date: None,
            estimate_minutes: None,
            created_at: None,
            updated_at: None,
            closed_at: None,
            comment_count: 0,
            metadata: serde_json::Map::new(),
        }
    }
}

/// An ordered set of issues representing one project's tracker as of the
/// last successful read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssueSnapshot {
    pub issues: Vec<Issue>,
}

impl IssueSnapshot {
    pub fn new(issues: Vec<Issue>) -> Self {
        Self { issues }
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    /// Id-indexed view for diffing. Duplicate ids keep the last record,
    /// matching how the tracker resolves its own listings.
    pub fn by_id(&self) -> HashMap<&str, &Issue> {
        self.issues
            .iter()
            .map(|issue| (issue.id.as_str(), issue))
            .collect()
    }
}
