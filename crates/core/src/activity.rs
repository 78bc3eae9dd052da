//! Semantic activity events.
//!
//! The typed vocabulary of "what just changed in the tracker", produced by
//! the snapshot differ (for tracker mutations) or constructed directly by
//! the registry layer (heartbeat-class events). Wire form is camelCase —
//! these are UI-facing payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::ProjectIdentity;

/// The fixed transition vocabulary.
///
/// Field changes with no dedicated kind fall back to [`ActivityKind::FieldChanged`]
/// rather than being dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Created,
    Closed,
    Reopened,
    StatusChanged,
    PriorityChanged,
    AssigneeChanged,
    TypeChanged,
    TitleChanged,
    DescriptionChanged,
    LabelsChanged,
    DependencyAdded,
    DependencyRemoved,
    CommentAdded,
    DueDateChanged,
    EstimateChanged,
    FieldChanged,
}

/// Optional detail attached to an activity event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ActivityPayload {
    /// Payload for a `{field, from, to}` transition.
    pub fn transition(
        field: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self {
            field: Some(field.into()),
            from: Some(from.into()),
            to: Some(to.into()),
            message: None,
        }
    }
}

/// One semantic activity event.
///
/// `id` is assigned by the activity bus at emission time; producers leave
/// it zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    #[serde(default)]
    pub id: u64,
    pub kind: ActivityKind,
    pub issue_id: String,
    pub issue_title: String,
    pub project: ProjectIdentity,
    pub project_name: String,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    #[serde(default)]
    pub payload: ActivityPayload,
}
