//! Collaborator traits.
//!
//! The substrate consumes three external systems as black boxes: the
//! tracker's on-disk snapshot, the agent directory, and the cross-project
//! mailbox. Each is abstracted behind a trait so the watch pipeline and
//! classifiers can be driven by fakes in tests and must tolerate the real
//! implementations failing or being slow.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::issue::IssueSnapshot;
use crate::liveness::OwnerExplicitState;

/// Reads the current issue snapshot for a project root.
#[async_trait]
pub trait IssueReader: Send + Sync {
    async fn read_issues(&self, root: &Path) -> Result<IssueSnapshot, CoreError>;
}

/// One agent as the directory reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explicit_state: Option<OwnerExplicitState>,
}

/// Resolves agent ids to liveness evidence.
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    async fn show_agent(&self, agent_id: &str) -> Result<Option<AgentRecord>, CoreError>;
    async fn list_agents(&self) -> Result<Vec<AgentRecord>, CoreError>;
}

/// A message in the cross-project mailbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailboxMessage {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bead_id: Option<String>,
    pub agent_id: String,
    pub subject: String,
    pub requires_ack: bool,
    pub sent_at: DateTime<Utc>,
}

/// Resolves unacknowledged required messages for a bead or agent.
#[async_trait]
pub trait MailboxReader: Send + Sync {
    async fn unacked_required(
        &self,
        bead_id: Option<&str>,
        agent_id: Option<&str>,
    ) -> Result<Vec<MailboxMessage>, CoreError>;
}
