use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One mailbox per (user, provider). The refresh token is an opaque
/// credentials handle; token acquisition happens outside this service.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MailboxConnectionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider: String,
    pub email_address: String,
    pub refresh_token: String,
    pub active: bool,
    /// Sync cursor: messages received after this instant are candidates.
    pub last_synced_at: Option<DateTime<Utc>>,
    pub last_sync_status: Option<String>,
    pub last_sync_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewConnection {
    pub user_id: Uuid,
    pub provider: String,
    pub email_address: String,
    pub refresh_token: String,
}

/// Outcome of the most recent sync attempt, stored as text on the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Success,
    Failed,
}

impl SyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncStatus::Success => "success",
            SyncStatus::Failed => "failed",
        }
    }
}

/// Per-bank search filter. Sender addresses and subject keywords from all
/// rules of a connection are unioned into a single mailbox query.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BankFilterRuleRow {
    pub id: Uuid,
    pub connection_id: Uuid,
    pub bank_name: String,
    pub sender_addresses: Vec<String>,
    pub subject_keywords: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct NewFilterRule {
    pub connection_id: Uuid,
    pub bank_name: String,
    pub sender_addresses: Vec<String>,
    pub subject_keywords: Vec<String>,
}
