//! Snapshot differ.
//!
//! Pure function from two point-in-time issue snapshots to the ordered
//! list of semantic activity events that explains the transition. Neither
//! input is mutated, and the output is deterministic: diffing the same
//! pair twice yields identical output (fields are compared in a fixed
//! order, set differences are sorted).

use chrono::{DateTime, Utc};

use crate::activity::{ActivityEvent, ActivityKind, ActivityPayload};
use crate::identity::ProjectIdentity;
use crate::issue::{Issue, IssueSnapshot, IssueStatus};

/// Actor recorded when the tracker gives no attribution for a change.
const UNATTRIBUTED: &str = "unknown";

/// Compute the activity events that explain `previous → current`.
///
/// - An issue present only in `current` (or any issue when `previous` is
///   `None`) yields a single `created` event.
/// - An issue absent from `current` yields nothing: the tracker tombstones
///   rather than deletes, so disappearance alone is not a signal.
/// - A status transition into `closed` yields `closed`; a transition out
///   of `closed` yields `reopened`; any other status change yields
///   `status_changed`.
/// - Every other tracked field that differs yields exactly one typed event
///   carrying `{field, from, to}`; metadata keys with no dedicated kind
///   fall back to `field_changed`.
/// - Dependency lists are diffed by set difference, one event per edge.
pub fn diff_snapshots(
    previous: Option<&IssueSnapshot>,
    current: &IssueSnapshot,
    project: &ProjectIdentity,
    project_name: &str,
    now: DateTime<Utc>,
) -> Vec<ActivityEvent> {
    let mut events = Vec::new();

    let previous_by_id = previous.map(IssueSnapshot::by_id);

    for issue in &current.issues {
        let old = previous_by_id
            .as_ref()
            .and_then(|map| map.get(issue.id.as_str()).copied());

        match old {
            None => events.push(make_event(
                ActivityKind::Created,
                issue,
                ActivityPayload::default(),
                project,
                project_name,
                now,
            )),
            Some(old) => diff_issue(old, issue, project, project_name, now, &mut events),
        }
    }

    events
}

/// Diff one issue against its previous record, in fixed field order.
fn diff_issue(
    old: &Issue,
    new: &Issue,
    project: &ProjectIdentity,
    project_name: &str,
    now: DateTime<Utc>,
    events: &mut Vec<ActivityEvent>,
) {
    let mut push = |kind: ActivityKind, payload: ActivityPayload| {
        events.push(make_event(kind, new, payload, project, project_name, now));
    };

    // Status first: close/reopen are their own kinds, not status_changed.
    if old.status != new.status {
        let kind = if new.status.is_closed() {
            ActivityKind::Closed
        } else if old.status.is_closed() {
            ActivityKind::Reopened
        } else {
            ActivityKind::StatusChanged
        };
        push(
            kind,
            ActivityPayload::transition("status", status_str(old.status), status_str(new.status)),
        );
    }

    if old.priority != new.priority {
        push(
            ActivityKind::PriorityChanged,
            ActivityPayload::transition(
                "priority",
                old.priority.to_string(),
                new.priority.to_string(),
            ),
        );
    }

    if old.assignee != new.assignee {
        push(
            ActivityKind::AssigneeChanged,
            ActivityPayload::transition("assignee", opt_str(&old.assignee), opt_str(&new.assignee)),
        );
    }

    if old.issue_type != new.issue_type {
        push(
            ActivityKind::TypeChanged,
            ActivityPayload::transition("issue_type", &old.issue_type, &new.issue_type),
        );
    }

    if old.title != new.title {
        push(
            ActivityKind::TitleChanged,
            ActivityPayload::transition("title", &old.title, &new.title),
        );
    }

    if old.description != new.description {
        push(
            ActivityKind::DescriptionChanged,
            ActivityPayload::transition("description", &old.description, &new.description),
        );
    }

    // Labels compare as sets: the tracker reorders freely.
    if sorted(&old.labels) != sorted(&new.labels) {
        push(
            ActivityKind::LabelsChanged,
            ActivityPayload::transition("labels", old.labels.join(","), new.labels.join(",")),
        );
    }

    if old.due_date != new.due_date {
        push(
            ActivityKind::DueDateChanged,
            ActivityPayload::transition(
                "due_date",
                old.due_date.map(|d| d.to_rfc3339()).unwrap_or_default(),
                new.due_date.map(|d| d.to_rfc3339()).unwrap_or_default(),
            ),
        );
    }

    if old.estimate_minutes != new.estimate_minutes {
        push(
            ActivityKind::EstimateChanged,
            ActivityPayload::transition(
                "estimate",
                old.estimate_minutes.map(|m| m.to_string()).unwrap_or_default(),
                new.estimate_minutes.map(|m| m.to_string()).unwrap_or_default(),
            ),
        );
    }

    // One comment_added per count increment; the newest message (when the
    // tracker surfaces it) rides on the last event.
    if new.comment_count > old.comment_count {
        let added = new.comment_count - old.comment_count;
        let last_comment = new
            .metadata
            .get("last_comment")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        for i in 0..added {
            let message = if i + 1 == added { last_comment.clone() } else { None };
            push(
                ActivityKind::CommentAdded,
                ActivityPayload {
                    field: None,
                    from: None,
                    to: None,
                    message,
                },
            );
        }
    }

    // Unmapped tracker fields: union of metadata keys, sorted, generic kind.
    let mut keys: Vec<&String> = old.metadata.keys().chain(new.metadata.keys()).collect();
    keys.sort();
    keys.dedup();
    for key in keys {
        if key == "last_comment" {
            continue; // consumed by comment detection above
        }
        let before = old.metadata.get(key.as_str());
        let after = new.metadata.get(key.as_str());
        if before != after {
            push(
                ActivityKind::FieldChanged,
                ActivityPayload::transition(
                    key.clone(),
                    before.map(value_str).unwrap_or_default(),
                    after.map(value_str).unwrap_or_default(),
                ),
            );
        }
    }

    // Dependency edges by set difference, one event per edge, sorted.
    for dep in edge_difference(&new.dependencies, &old.dependencies) {
        push(
            ActivityKind::DependencyAdded,
            ActivityPayload {
                field: Some("dependencies".into()),
                from: None,
                to: Some(dep),
                message: None,
            },
        );
    }
    for dep in edge_difference(&old.dependencies, &new.dependencies) {
        push(
            ActivityKind::DependencyRemoved,
            ActivityPayload {
                field: Some("dependencies".into()),
                from: Some(dep),
                to: None,
                message: None,
            },
        );
    }
}

fn make_event(
    kind: ActivityKind,
    issue: &Issue,
    payload: ActivityPayload,
    project: &ProjectIdentity,
    project_name: &str,
    now: DateTime<Utc>,
) -> ActivityEvent {
    ActivityEvent {
        id: 0, // assigned by the activity bus at emission
        kind,
        issue_id: issue.id.clone(),
        issue_title: issue.title.clone(),
        project: project.clone(),
        project_name: project_name.to_string(),
        timestamp: now,
        actor: issue
            .assignee
            .clone()
            .unwrap_or_else(|| UNATTRIBUTED.to_string()),
        payload,
    }
}

fn status_str(status: IssueStatus) -> &'static str {
    match status {
        IssueStatus::Open => "open",
        IssueStatus::InProgress => "in_progress",
        IssueStatus::Blocked => "blocked",
        IssueStatus::Deferred => "deferred",
        IssueStatus::Closed => "closed",
    }
}

fn opt_str(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn value_str(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn sorted(items: &[String]) -> Vec<&str> {
    let mut out: Vec<&str> = items.iter().map(String::as_str).collect();
    out.sort_unstable();
    out
}

/// Entries of `a` not present in `b`, sorted.
fn edge_difference(a: &[String], b: &[String]) -> Vec<String> {
    let mut out: Vec<String> = a
        .iter()
        .filter(|entry| !b.contains(entry))
        .cloned()
        .collect();
    out.sort_unstable();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn now() -> DateTime<Utc> {
        "2026-08-01T12:00:00Z".parse().unwrap()
    }

    fn project() -> ProjectIdentity {
        ProjectIdentity::from_root("/work/acme")
    }

    fn diff(previous: Option<&IssueSnapshot>, current: &IssueSnapshot) -> Vec<ActivityEvent> {
        diff_snapshots(previous, current, &project(), "acme", now())
    }

    fn snapshot(issues: Vec<Issue>) -> IssueSnapshot {
        IssueSnapshot::new(issues)
    }

    #[test]
    fn test_identical_snapshots_yield_nothing() {
        let s = snapshot(vec![Issue::new("bd-1", "A", IssueStatus::Open)]);
        assert!(diff(Some(&s), &s).is_empty());
    }

    #[test]
    fn test_no_previous_yields_created_per_issue() {
        let s = snapshot(vec![
            Issue::new("bd-1", "A", IssueStatus::Open),
            Issue::new("bd-2", "B", IssueStatus::InProgress),
        ]);
        let events = diff(None, &s);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.kind == ActivityKind::Created));
        assert_eq!(events[0].issue_id, "bd-1");
        assert_eq!(events[1].issue_id, "bd-2");
    }

    #[test]
    fn test_new_issue_yields_single_created() {
        let prev = snapshot(vec![Issue::new("bd-1", "A", IssueStatus::Open)]);
        let curr = snapshot(vec![
            Issue::new("bd-1", "A", IssueStatus::Open),
            Issue::new("bd-2", "B", IssueStatus::Open),
        ]);
        let events = diff(Some(&prev), &curr);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ActivityKind::Created);
        assert_eq!(events[0].issue_id, "bd-2");
    }

    #[test]
    fn test_disappeared_issue_yields_nothing() {
        let prev = snapshot(vec![
            Issue::new("bd-1", "A", IssueStatus::Open),
            Issue::new("bd-2", "B", IssueStatus::Open),
        ]);
        let curr = snapshot(vec![Issue::new("bd-1", "A", IssueStatus::Open)]);
        assert!(diff(Some(&prev), &curr).is_empty());
    }

    #[test]
    fn test_close_transition() {
        let prev = snapshot(vec![Issue::new("bd-1", "A", IssueStatus::InProgress)]);
        let curr = snapshot(vec![Issue::new("bd-1", "A", IssueStatus::Closed)]);
        let events = diff(Some(&prev), &curr);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ActivityKind::Closed);
        assert_eq!(events[0].payload.from.as_deref(), Some("in_progress"));
        assert_eq!(events[0].payload.to.as_deref(), Some("closed"));
    }

    #[test]
    fn test_reopen_transition() {
        let prev = snapshot(vec![Issue::new("bd-1", "A", IssueStatus::Closed)]);
        let curr = snapshot(vec![Issue::new("bd-1", "A", IssueStatus::Open)]);
        let events = diff(Some(&prev), &curr);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ActivityKind::Reopened);
    }

    #[test]
    fn test_plain_status_change() {
        let prev = snapshot(vec![Issue::new("bd-1", "A", IssueStatus::Open)]);
        let curr = snapshot(vec![Issue::new("bd-1", "A", IssueStatus::Blocked)]);
        let events = diff(Some(&prev), &curr);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ActivityKind::StatusChanged);
    }

    #[test]
    fn test_single_field_change_carries_from_to() {
        let mut old = Issue::new("bd-1", "A", IssueStatus::Open);
        old.priority = 2;
        let mut new = old.clone();
        new.priority = 0;
        let events = diff(Some(&snapshot(vec![old])), &snapshot(vec![new]));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ActivityKind::PriorityChanged);
        assert_eq!(events[0].payload.field.as_deref(), Some("priority"));
        assert_eq!(events[0].payload.from.as_deref(), Some("2"));
        assert_eq!(events[0].payload.to.as_deref(), Some("0"));
    }

    #[test]
    fn test_assignee_change() {
        let old = Issue::new("bd-1", "A", IssueStatus::Open);
        let mut new = old.clone();
        new.assignee = Some("agent-b".into());
        let events = diff(Some(&snapshot(vec![old])), &snapshot(vec![new]));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ActivityKind::AssigneeChanged);
        assert_eq!(events[0].payload.from.as_deref(), Some(""));
        assert_eq!(events[0].payload.to.as_deref(), Some("agent-b"));
    }

    #[test]
    fn test_label_reorder_is_not_a_change() {
        let mut old = Issue::new("bd-1", "A", IssueStatus::Open);
        old.labels = vec!["ui".into(), "backend".into()];
        let mut new = old.clone();
        new.labels = vec!["backend".into(), "ui".into()];
        assert!(diff(Some(&snapshot(vec![old])), &snapshot(vec![new])).is_empty());
    }

    #[test]
    fn test_unmapped_metadata_change_falls_back_to_field_changed() {
        let mut old = Issue::new("bd-1", "A", IssueStatus::Open);
        old.metadata
            .insert("design_doc".into(), serde_json::json!("v1"));
        let mut new = old.clone();
        new.metadata
            .insert("design_doc".into(), serde_json::json!("v2"));
        let events = diff(Some(&snapshot(vec![old])), &snapshot(vec![new]));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ActivityKind::FieldChanged);
        assert_eq!(events[0].payload.field.as_deref(), Some("design_doc"));
        assert_eq!(events[0].payload.from.as_deref(), Some("v1"));
        assert_eq!(events[0].payload.to.as_deref(), Some("v2"));
    }

    #[test]
    fn test_dependency_set_difference() {
        let mut old = Issue::new("bd-1", "A", IssueStatus::Open);
        old.dependencies = vec!["bd-2".into(), "bd-3".into()];
        let mut new = old.clone();
        new.dependencies = vec!["bd-3".into(), "bd-4".into(), "bd-5".into()];
        let events = diff(Some(&snapshot(vec![old])), &snapshot(vec![new]));
        let added: Vec<_> = events
            .iter()
            .filter(|e| e.kind == ActivityKind::DependencyAdded)
            .map(|e| e.payload.to.clone().unwrap())
            .collect();
        let removed: Vec<_> = events
            .iter()
            .filter(|e| e.kind == ActivityKind::DependencyRemoved)
            .map(|e| e.payload.from.clone().unwrap())
            .collect();
        assert_eq!(added, vec!["bd-4", "bd-5"]);
        assert_eq!(removed, vec!["bd-2"]);
    }

    #[test]
    fn test_comment_count_increment_yields_comment_added() {
        let old = Issue::new("bd-1", "A", IssueStatus::Open);
        let mut new = old.clone();
        new.comment_count = 2;
        new.metadata
            .insert("last_comment".into(), serde_json::json!("looks good"));
        let events = diff(Some(&snapshot(vec![old])), &snapshot(vec![new]));
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.kind == ActivityKind::CommentAdded));
        assert_eq!(events[0].payload.message, None);
        assert_eq!(events[1].payload.message.as_deref(), Some("looks good"));
    }

    #[test]
    fn test_multi_field_update_is_stable_across_invocations() {
        let mut old = Issue::new("bd-1", "A", IssueStatus::Open);
        old.priority = 3;
        old.labels = vec!["ui".into()];
        let mut new = old.clone();
        new.status = IssueStatus::InProgress;
        new.priority = 1;
        new.title = "A improved".into();
        new.labels = vec!["ui".into(), "urgent".into()];
        new.dependencies = vec!["bd-9".into()];

        let prev = snapshot(vec![old]);
        let curr = snapshot(vec![new]);
        let first = diff(Some(&prev), &curr);
        let second = diff(Some(&prev), &curr);
        assert_eq!(first, second, "same diff pair must yield identical output");

        let kinds: Vec<_> = first.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ActivityKind::StatusChanged,
                ActivityKind::PriorityChanged,
                ActivityKind::TitleChanged,
                ActivityKind::LabelsChanged,
                ActivityKind::DependencyAdded,
            ]
        );
    }

    #[test]
    fn test_inputs_are_not_mutated() {
        let prev = snapshot(vec![Issue::new("bd-1", "A", IssueStatus::Open)]);
        let curr = snapshot(vec![Issue::new("bd-1", "A", IssueStatus::Closed)]);
        let prev_clone = prev.clone();
        let curr_clone = curr.clone();
        let _ = diff(Some(&prev), &curr);
        assert_eq!(prev, prev_clone);
        assert_eq!(curr, curr_clone);
    }
}
