use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// Audit record for every mailbox message examined. Keyed by
/// (connection_id, message_id) — the idempotency key that guarantees
/// at-most-one transaction per email.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CandidateEmailRow {
    pub id: Uuid,
    pub connection_id: Uuid,
    pub message_id: String,
    pub subject: String,
    pub sender: String,
    pub received_at: DateTime<Utc>,
    pub body: String,
    pub status: String,
    pub parsed_data: Option<Value>,
    pub transaction_id: Option<Uuid>,
    pub error_message: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl CandidateEmailRow {
    pub fn status(&self) -> Option<CandidateStatus> {
        CandidateStatus::parse(&self.status)
    }
}

#[derive(Debug, Clone)]
pub struct NewCandidate {
    pub connection_id: Uuid,
    pub message_id: String,
    pub subject: String,
    pub sender: String,
    pub received_at: DateTime<Utc>,
    pub body: String,
}

/// Candidate lifecycle: `Processing` → exactly one terminal state.
/// Terminal rows are immutable; reprocessing is never attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    Processing,
    Success,
    Failed,
    Duplicate,
    /// Payment-confirmation emails excluded before any model call.
    /// A deliberate non-error outcome, distinct from `Failed`.
    Skipped,
}

impl CandidateStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CandidateStatus::Processing => "processing",
            CandidateStatus::Success => "success",
            CandidateStatus::Failed => "failed",
            CandidateStatus::Duplicate => "duplicate",
            CandidateStatus::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(CandidateStatus::Processing),
            "success" => Some(CandidateStatus::Success),
            "failed" => Some(CandidateStatus::Failed),
            "duplicate" => Some(CandidateStatus::Duplicate),
            "skipped" => Some(CandidateStatus::Skipped),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, CandidateStatus::Processing)
    }

    /// Transitions are one-way: `Processing` may move to any terminal state,
    /// terminal states never move again.
    pub fn can_transition_to(self, next: CandidateStatus) -> bool {
        self == CandidateStatus::Processing && next.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processing_reaches_all_terminal_states() {
        for next in [
            CandidateStatus::Success,
            CandidateStatus::Failed,
            CandidateStatus::Duplicate,
            CandidateStatus::Skipped,
        ] {
            assert!(CandidateStatus::Processing.can_transition_to(next));
        }
    }

    #[test]
    fn test_terminal_states_are_frozen() {
        for from in [
            CandidateStatus::Success,
            CandidateStatus::Failed,
            CandidateStatus::Duplicate,
            CandidateStatus::Skipped,
        ] {
            assert!(!from.can_transition_to(CandidateStatus::Processing));
            assert!(!from.can_transition_to(CandidateStatus::Success));
        }
    }

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [
            CandidateStatus::Processing,
            CandidateStatus::Success,
            CandidateStatus::Failed,
            CandidateStatus::Duplicate,
            CandidateStatus::Skipped,
        ] {
            assert_eq!(CandidateStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(CandidateStatus::parse("pending"), None);
    }
}
