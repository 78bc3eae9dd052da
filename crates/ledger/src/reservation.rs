//! Reservation records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Shortest lease an agent may request, in minutes.
pub const MIN_TTL_MINUTES: i64 = 5;
/// Longest lease an agent may request, in minutes (one day).
pub const MAX_TTL_MINUTES: i64 = 1440;

/// Lifecycle state of a reservation.
///
/// `Active` claims live in the active-set file. `Expired` claims stay in
/// the file (so a later reserve can detect staleness and demand explicit
/// takeover) until a takeover retires them. `Released` claims leave the
/// file immediately; the state survives only in the history log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationState {
    Active,
    Released,
    Expired,
}

/// One time-bounded exclusive claim on a scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentReservation {
    pub reservation_id: String,
    /// Normalized path or path-prefix pattern the claim covers.
    pub scope: String,
    pub agent_id: String,
    pub issue_id: String,
    pub state: ReservationState,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub released_at: Option<DateTime<Utc>>,
}

impl AgentReservation {
    /// Whether the lease is past its deadline at `now`.
    ///
    /// The boundary is inclusive: a claim is dead the instant
    /// `now >= expires_at`, before any sweep has run.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn make(expires_at: DateTime<Utc>) -> AgentReservation {
        AgentReservation {
            reservation_id: "r-1".into(),
            scope: "src/lib".into(),
            agent_id: "agent-a".into(),
            issue_id: "bd-1".into(),
            state: ReservationState::Active,
            created_at: expires_at - Duration::minutes(30),
            expires_at,
            released_at: None,
        }
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let at: DateTime<Utc> = "2026-08-01T12:00:00Z".parse().unwrap();
        let r = make(at);
        assert!(!r.is_expired(at - Duration::seconds(1)));
        assert!(r.is_expired(at));
        assert!(r.is_expired(at + Duration::seconds(1)));
    }

    #[test]
    fn test_state_wire_form() {
        assert_eq!(
            serde_json::to_string(&ReservationState::Active).unwrap(),
            "\"active\""
        );
        let back: ReservationState = serde_json::from_str("\"expired\"").unwrap();
        assert_eq!(back, ReservationState::Expired);
    }

    #[test]
    fn test_released_at_omitted_when_none() {
        let at: DateTime<Utc> = "2026-08-01T12:00:00Z".parse().unwrap();
        let json = serde_json::to_string(&make(at)).unwrap();
        assert!(!json.contains("released_at"));
    }
}
