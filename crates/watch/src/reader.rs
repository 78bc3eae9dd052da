//! Default issue-snapshot reader.
//!
//! Reads the tracker's JSONL snapshot (`.beads/issues.jsonl`, one issue
//! per line) into an [`IssueSnapshot`]. This is the production
//! implementation of the [`IssueReader`] collaborator trait; tests and
//! embedders swap in their own.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use beads_live_core::{CoreError, Issue, IssueReader, IssueSnapshot};

/// Tracker data directory under a project root.
pub const TRACKER_DIR: &str = ".beads";
/// The issue snapshot file inside the tracker directory.
pub const SNAPSHOT_FILE: &str = "issues.jsonl";

/// JSONL-backed [`IssueReader`].
#[derive(Debug, Clone, Default)]
pub struct JsonlIssueReader;

impl JsonlIssueReader {
    pub fn new() -> Self {
        Self
    }

    /// The snapshot path for a project root.
    pub fn snapshot_path(root: &Path) -> PathBuf {
        root.join(TRACKER_DIR).join(SNAPSHOT_FILE)
    }
}

#[async_trait]
impl IssueReader for JsonlIssueReader {
    async fn read_issues(&self, root: &Path) -> Result<IssueSnapshot, CoreError> {
        let path = Self::snapshot_path(root);
        let raw = {
            let path = path.clone();
            tokio::task::spawn_blocking(move || {
                std::fs::read_to_string(&path).map_err(|e| CoreError::from_io(path, e))
            })
            .await
            .map_err(|e| CoreError::InvalidSnapshot(format!("snapshot read panicked: {e}")))??
        };

        let mut issues = Vec::new();
        for (index, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let issue: Issue =
                serde_json::from_str(line).map_err(|e| CoreError::MalformedJson {
                    path: path.clone(),
                    line: index + 1,
                    message: e.to_string(),
                })?;
            issues.push(issue);
        }
        Ok(IssueSnapshot::new(issues))
    }
}
