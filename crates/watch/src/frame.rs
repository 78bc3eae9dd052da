//! Streaming transport frames.
//!
//! Events leave the process as newline-delimited text frames:
//!
//! ```text
//! id: 42
//! event: activity
//! data: {"kind":"created",...}
//! <blank line>
//! ```
//!
//! The explicit numeric id lets a reconnecting client resume from the
//! last frame it saw. Two constant comment-style frames (no `id:` or
//! `event:` line) keep long-lived connections alive and let clients
//! detect a fresh connection.

use beads_live_core::ActivityEvent;

use crate::change::{ChangeEvent, ChangeKind};

/// Sent once when a stream opens, before any real frame.
pub const CONNECTED_FRAME: &str = ": connected\n\n";

/// Sent on an interval to keep the connection alive.
pub const HEARTBEAT_FRAME: &str = ": heartbeat\n\n";

/// Transport event-type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Tracker content changed; the client should refresh its data.
    Issues,
    /// A touch that must not trigger a data refresh.
    Telemetry,
    /// A semantic activity event.
    Activity,
}

impl FrameKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FrameKind::Issues => "issues",
            FrameKind::Telemetry => "telemetry",
            FrameKind::Activity => "activity",
        }
    }
}

/// One push-transport frame: explicit id, event-type name, JSON payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub id: u64,
    pub kind: FrameKind,
    pub data: String,
}

impl Frame {
    /// Frame a raw change signal. Content and rename/remove changes both
    /// tell the client to refresh; telemetry touches are framed under
    /// their own event name so clients can ignore them.
    pub fn from_change(event: &ChangeEvent) -> Self {
        let kind = match event.kind {
            ChangeKind::ContentChanged | ChangeKind::RenamedOrRemoved => FrameKind::Issues,
            ChangeKind::Telemetry => FrameKind::Telemetry,
        };
        Self {
            id: event.id,
            kind,
            data: serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string()),
        }
    }

    /// Frame a semantic activity event.
    pub fn from_activity(event: &ActivityEvent) -> Self {
        Self {
            id: event.id,
            kind: FrameKind::Activity,
            data: serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string()),
        }
    }

    /// Render the newline-delimited wire form.
    pub fn to_wire(&self) -> String {
        format!(
            "id: {}\nevent: {}\ndata: {}\n\n",
            self.id,
            self.kind.as_str(),
            self.data
        )
    }
}
