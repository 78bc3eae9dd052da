//! Runtime configuration.
//!
//! Defaults cover the normal deployment; every knob can be overridden
//! with a `BEADS_LIVE_*` environment variable.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Debounce window for the coalescer.
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;
/// Heartbeat interval for push streams.
pub const DEFAULT_HEARTBEAT_SECS: u64 = 15;
/// Retry budget for transient snapshot reads.
pub const DEFAULT_READ_RETRY_ATTEMPTS: u32 = 3;
/// Delay between snapshot-read retries.
pub const DEFAULT_READ_RETRY_DELAY_MS: u64 = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub debounce_ms: u64,
    pub heartbeat_secs: u64,
    /// Minutes of silence before an agent counts as stale.
    pub stale_minutes: i64,
    /// Directory for process state: the reservation ledger and the
    /// activity history mirror.
    pub state_dir: PathBuf,
    /// Global cross-project message directory, if the deployment has one.
    pub messages_dir: Option<PathBuf>,
    pub read_retry_attempts: u32,
    pub read_retry_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            heartbeat_secs: DEFAULT_HEARTBEAT_SECS,
            stale_minutes: beads_live_core::DEFAULT_STALE_MINUTES,
            state_dir: home.join(".beads-live"),
            messages_dir: None,
            read_retry_attempts: DEFAULT_READ_RETRY_ATTEMPTS,
            read_retry_delay_ms: DEFAULT_READ_RETRY_DELAY_MS,
        }
    }
}

impl Config {
    /// Defaults overlaid with `BEADS_LIVE_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Injectable variant of [`from_env`](Self::from_env).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(v) = parse(&lookup, "BEADS_LIVE_DEBOUNCE_MS") {
            config.debounce_ms = v;
        }
        if let Some(v) = parse(&lookup, "BEADS_LIVE_HEARTBEAT_SECS") {
            config.heartbeat_secs = v;
        }
        if let Some(v) = parse(&lookup, "BEADS_LIVE_STALE_MINUTES") {
            config.stale_minutes = v;
        }
        if let Some(v) = lookup("BEADS_LIVE_STATE_DIR") {
            config.state_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("BEADS_LIVE_MESSAGES_DIR") {
            config.messages_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = parse(&lookup, "BEADS_LIVE_READ_RETRY_ATTEMPTS") {
            config.read_retry_attempts = v;
        }
        if let Some(v) = parse(&lookup, "BEADS_LIVE_READ_RETRY_DELAY_MS") {
            config.read_retry_delay_ms = v;
        }
        config
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    pub fn read_retry_delay(&self) -> Duration {
        Duration::from_millis(self.read_retry_delay_ms)
    }

    /// Where the reservation ledger lives.
    pub fn ledger_dir(&self) -> PathBuf {
        self.state_dir.join("reservations")
    }

    /// Where the activity history mirror lives.
    pub fn activity_history_path(&self) -> PathBuf {
        self.state_dir.join("activity.json")
    }
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Option<T> {
    lookup(name).and_then(|raw| raw.trim().parse().ok())
}
