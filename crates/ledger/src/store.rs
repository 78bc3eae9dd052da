//! File-locked reservation store.
//!
//! Layout under the ledger directory:
//!
//! ```text
//! reservations/
//! ├── active.json     ← the live claim set, rewritten atomically
//! ├── history.jsonl   ← append-only audit log, one transition per line
//! └── LOCK            ← advisory exclusive lock for read-modify-write
//! ```
//!
//! Every operation acquires the lock, loads `active.json`, sweeps expired
//! claims, applies its mutation, and persists via temp-file-then-rename so
//! a crash mid-write cannot corrupt the active set. The lock is held for
//! the whole cycle; contention retries a few times with a short fixed
//! delay before surfacing as [`LedgerError::Busy`].

use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use beads_live_core::{MailboxMessage, MailboxReader};

use crate::error::LedgerError;
use crate::reservation::{
    AgentReservation, ReservationState, MAX_TTL_MINUTES, MIN_TTL_MINUTES,
};
use crate::scope::{classify_overlap, normalize_scope, ScopeOverlap};

const ACTIVE_FILE: &str = "active.json";
const HISTORY_FILE: &str = "history.jsonl";
const LOCK_FILE: &str = "LOCK";

const LOCK_ATTEMPTS: u32 = 8;
const LOCK_RETRY_DELAY_MS: u64 = 25;

/// On-disk shape of `active.json`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ActiveFile {
    reservations: Vec<AgentReservation>,
}

/// What happened, for the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum HistoryEvent {
    Created,
    Released,
    Expired,
}

/// One line of `history.jsonl`.
#[derive(Debug, Serialize, Deserialize)]
struct HistoryEntry {
    at: DateTime<Utc>,
    event: HistoryEvent,
    reservation: AgentReservation,
}

/// Exclusive advisory lock on the ledger directory.
/// Released when dropped.
struct LedgerLock {
    _file: File,
}

impl LedgerLock {
    /// Acquire with bounded retries; contention past the retry budget
    /// surfaces as `Busy` rather than blocking indefinitely.
    fn acquire(path: &Path) -> Result<Self, LedgerError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| LedgerError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        for attempt in 0..LOCK_ATTEMPTS {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(Self { _file: file }),
                Err(_) if attempt + 1 < LOCK_ATTEMPTS => {
                    std::thread::sleep(std::time::Duration::from_millis(LOCK_RETRY_DELAY_MS));
                }
                Err(_) => break,
            }
        }
        Err(LedgerError::Busy {
            path: path.to_path_buf(),
        })
    }
}

/// Filter for [`ReservationLedger::status`].
#[derive(Debug, Clone, Default)]
pub struct StatusFilter {
    pub issue_id: Option<String>,
    pub agent_id: Option<String>,
}

/// Result of a status query: the surviving active set plus any
/// required-acknowledgement messages still unread for the filter.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusReport {
    pub reservations: Vec<AgentReservation>,
    pub pending_messages: Vec<MailboxMessage>,
}

/// The singleton scope-reservation store.
#[derive(Debug, Clone)]
pub struct ReservationLedger {
    dir: PathBuf,
}

impl ReservationLedger {
    /// Open (creating the directory if needed) the ledger at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| LedgerError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    /// Claim exclusive rights over `scope` for `ttl_minutes`.
    pub fn reserve(
        &self,
        agent_id: &str,
        scope: &str,
        issue_id: &str,
        ttl_minutes: i64,
        takeover_stale: bool,
    ) -> Result<AgentReservation, LedgerError> {
        self.reserve_at(agent_id, scope, issue_id, ttl_minutes, takeover_stale, Utc::now())
    }

    /// Clock-injected variant of [`reserve`](Self::reserve).
    pub fn reserve_at(
        &self,
        agent_id: &str,
        scope: &str,
        issue_id: &str,
        ttl_minutes: i64,
        takeover_stale: bool,
        now: DateTime<Utc>,
    ) -> Result<AgentReservation, LedgerError> {
        if !(MIN_TTL_MINUTES..=MAX_TTL_MINUTES).contains(&ttl_minutes) {
            return Err(LedgerError::InvalidTtl {
                minutes: ttl_minutes,
            });
        }
        if agent_id.trim().is_empty() {
            return Err(LedgerError::InvalidAgent);
        }
        let scope = normalize_scope(scope);
        if scope.is_empty() {
            return Err(LedgerError::InvalidScope);
        }

        let _lock = LedgerLock::acquire(&self.dir.join(LOCK_FILE))?;
        let mut file = self.load_active()?;
        let mut history = Vec::new();
        sweep(&mut file, now, &mut history);

        if let Some(pos) = file.reservations.iter().position(|r| r.scope == scope) {
            let existing = &file.reservations[pos];
            match existing.state {
                ReservationState::Active => {
                    let err = LedgerError::Conflict {
                        scope: scope.clone(),
                        holder: existing.agent_id.clone(),
                        expires_at: existing.expires_at,
                    };
                    // The sweep still happened; persist it so each swept
                    // entry reaches history exactly once.
                    self.persist(&file, &history)?;
                    return Err(err);
                }
                ReservationState::Expired if !takeover_stale => {
                    let err = LedgerError::StaleReservation {
                        scope: scope.clone(),
                        holder: existing.agent_id.clone(),
                        expired_at: existing.expires_at,
                    };
                    self.persist(&file, &history)?;
                    return Err(err);
                }
                _ => {
                    // Takeover: the expired claim was already recorded in
                    // history when it was swept; retiring it is removal.
                    file.reservations.remove(pos);
                }
            }
        }

        let reservation = AgentReservation {
            reservation_id: Uuid::new_v4().to_string(),
            scope,
            agent_id: agent_id.to_string(),
            issue_id: issue_id.to_string(),
            state: ReservationState::Active,
            created_at: now,
            expires_at: now + Duration::minutes(ttl_minutes),
            released_at: None,
        };
        file.reservations.push(reservation.clone());
        history.push(HistoryEntry {
            at: now,
            event: HistoryEvent::Created,
            reservation: reservation.clone(),
        });
        self.persist(&file, &history)?;
        Ok(reservation)
    }

    /// Release the reservation on `scope`. Owner-only: any other agent's
    /// attempt fails without touching the claim.
    pub fn release(&self, agent_id: &str, scope: &str) -> Result<AgentReservation, LedgerError> {
        self.release_at(agent_id, scope, Utc::now())
    }

    /// Clock-injected variant of [`release`](Self::release).
    pub fn release_at(
        &self,
        agent_id: &str,
        scope: &str,
        now: DateTime<Utc>,
    ) -> Result<AgentReservation, LedgerError> {
        if agent_id.trim().is_empty() {
            return Err(LedgerError::InvalidAgent);
        }
        let scope = normalize_scope(scope);
        if scope.is_empty() {
            return Err(LedgerError::InvalidScope);
        }

        let _lock = LedgerLock::acquire(&self.dir.join(LOCK_FILE))?;
        let mut file = self.load_active()?;
        let mut history = Vec::new();
        sweep(&mut file, now, &mut history);

        let Some(pos) = file.reservations.iter().position(|r| r.scope == scope) else {
            self.persist(&file, &history)?;
            return Err(LedgerError::NotFound { scope });
        };

        if file.reservations[pos].state == ReservationState::Expired {
            // Releasing a lease that already ran out: the sweep above
            // recorded the expiry; report it as gone.
            self.persist(&file, &history)?;
            return Err(LedgerError::NotFound { scope });
        }

        if file.reservations[pos].agent_id != agent_id {
            let holder = file.reservations[pos].agent_id.clone();
            self.persist(&file, &history)?;
            return Err(LedgerError::NotOwner { scope, holder });
        }

        let mut released = file.reservations.remove(pos);
        released.state = ReservationState::Released;
        released.released_at = Some(now);
        history.push(HistoryEntry {
            at: now,
            event: HistoryEvent::Released,
            reservation: released.clone(),
        });
        self.persist(&file, &history)?;
        Ok(released)
    }

    /// Sweep and return the surviving active set for `filter`.
    pub fn status(&self, filter: &StatusFilter) -> Result<Vec<AgentReservation>, LedgerError> {
        self.status_at(filter, Utc::now())
    }

    /// Clock-injected variant of [`status`](Self::status).
    pub fn status_at(
        &self,
        filter: &StatusFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<AgentReservation>, LedgerError> {
        let _lock = LedgerLock::acquire(&self.dir.join(LOCK_FILE))?;
        let mut file = self.load_active()?;
        let mut history = Vec::new();
        sweep(&mut file, now, &mut history);
        self.persist(&file, &history)?;

        Ok(file
            .reservations
            .into_iter()
            .filter(|r| r.state == ReservationState::Active)
            .filter(|r| {
                filter
                    .issue_id
                    .as_deref()
                    .map_or(true, |issue| r.issue_id == issue)
            })
            .filter(|r| {
                filter
                    .agent_id
                    .as_deref()
                    .map_or(true, |agent| r.agent_id == agent)
            })
            .collect())
    }

    /// [`status`](Self::status) plus the unacknowledged required messages
    /// for the filter, resolved through the mailbox collaborator. A
    /// failing mailbox degrades to an empty message list rather than
    /// failing the whole query.
    pub async fn status_with_messages(
        &self,
        filter: &StatusFilter,
        mailbox: &dyn MailboxReader,
    ) -> Result<StatusReport, LedgerError> {
        let reservations = self.status(filter)?;
        let pending_messages = match mailbox
            .unacked_required(filter.issue_id.as_deref(), filter.agent_id.as_deref())
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                warn!(error = %e, "mailbox lookup failed during status; omitting messages");
                Vec::new()
            }
        };
        Ok(StatusReport {
            reservations,
            pending_messages,
        })
    }

    /// Active reservations whose scope overlaps `scope` (exact or
    /// partial), with the classification. Used to surface collisions
    /// between differently-worded scopes.
    pub fn overlapping(
        &self,
        scope: &str,
    ) -> Result<Vec<(AgentReservation, ScopeOverlap)>, LedgerError> {
        let active = self.status(&StatusFilter::default())?;
        Ok(active
            .into_iter()
            .filter_map(|r| match classify_overlap(&r.scope, scope) {
                ScopeOverlap::Disjoint => None,
                overlap => Some((r, overlap)),
            })
            .collect())
    }

    fn active_path(&self) -> PathBuf {
        self.dir.join(ACTIVE_FILE)
    }

    fn history_path(&self) -> PathBuf {
        self.dir.join(HISTORY_FILE)
    }

    fn load_active(&self) -> Result<ActiveFile, LedgerError> {
        let path = self.active_path();
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ActiveFile::default())
            }
            Err(source) => return Err(LedgerError::Io { path, source }),
        };
        serde_json::from_str(&raw).map_err(|e| LedgerError::Corrupt {
            path,
            message: e.to_string(),
        })
    }

    /// Write `active.json` atomically and append the collected history
    /// lines. Must be called with the lock held.
    fn persist(&self, file: &ActiveFile, history: &[HistoryEntry]) -> Result<(), LedgerError> {
        let path = self.active_path();
        let json =
            serde_json::to_vec_pretty(file).map_err(|e| LedgerError::Internal(e.to_string()))?;

        let mut tmp =
            tempfile::NamedTempFile::new_in(&self.dir).map_err(|source| LedgerError::Io {
                path: self.dir.clone(),
                source,
            })?;
        tmp.write_all(&json).map_err(|source| LedgerError::Io {
            path: path.clone(),
            source,
        })?;
        tmp.persist(&path).map_err(|e| LedgerError::Io {
            path,
            source: e.error,
        })?;

        if !history.is_empty() {
            let path = self.history_path();
            let mut out = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|source| LedgerError::Io {
                    path: path.clone(),
                    source,
                })?;
            for entry in history {
                let line = serde_json::to_string(entry)
                    .map_err(|e| LedgerError::Internal(e.to_string()))?;
                writeln!(out, "{line}").map_err(|source| LedgerError::Io {
                    path: path.clone(),
                    source,
                })?;
            }
        }
        Ok(())
    }
}

/// Mark active claims past their deadline as expired, recording each in
/// history. Already-expired claims are left alone so they reach history
/// exactly once.
fn sweep(file: &mut ActiveFile, now: DateTime<Utc>, history: &mut Vec<HistoryEntry>) {
    for reservation in &mut file.reservations {
        if reservation.state == ReservationState::Active && reservation.is_expired(now) {
            reservation.state = ReservationState::Expired;
            history.push(HistoryEntry {
                at: now,
                event: HistoryEvent::Expired,
                reservation: reservation.clone(),
            });
        }
    }
}
