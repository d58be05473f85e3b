//! Mailbox gateway seam. The sync orchestrator only ever talks to
//! `dyn MailboxGateway`; `GmailGateway` is the production implementation and
//! tests script their own.

pub mod banks;
pub mod gmail;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::connection::MailboxConnectionRow;

/// One mailbox search: the union of every filter rule's senders and subject
/// keywords, scoped to messages received after the sync cursor.
#[derive(Debug, Clone)]
pub struct MailQuery {
    pub sender_addresses: Vec<String>,
    pub subject_keywords: Vec<String>,
    pub after: DateTime<Utc>,
    pub limit: usize,
}

/// A fetched mailbox message, trimmed to what the parser needs.
#[derive(Debug, Clone)]
pub struct MailMessage {
    pub message_id: String,
    pub subject: String,
    pub sender: String,
    pub received_at: DateTime<Utc>,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Token refresh failed; the connection run aborts without touching
    /// candidates.
    #[error("credential refresh failed: {0}")]
    Credential(String),

    #[error("mailbox API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed message payload: {0}")]
    Payload(String),
}

#[async_trait]
pub trait MailboxGateway: Send + Sync {
    /// Exchanges the connection's stored refresh token for a short-lived
    /// access token. Acquisition of the refresh token happens outside this
    /// service.
    async fn refresh_token(&self, connection: &MailboxConnectionRow)
        -> Result<String, GatewayError>;

    /// Returns provider-native message ids matching the query, newest first.
    async fn search(&self, access_token: &str, query: &MailQuery)
        -> Result<Vec<String>, GatewayError>;

    /// Fetches one message's subject, sender, receipt time and text body.
    async fn fetch(&self, access_token: &str, message_id: &str)
        -> Result<MailMessage, GatewayError>;
}
