//! Mailbox sync pipeline: per-connection orchestrator, duplicate detector,
//! periodic scheduler and the HTTP handlers exposing them.

pub mod dedup;
pub mod handlers;
pub mod orchestrator;
pub mod scheduler;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::store::StoreError;

/// Summary of one orchestrator invocation. Transient: each email's outcome
/// is durably recorded on its candidate row, aggregates land in `sync_runs`.
#[derive(Debug, Default, Clone, Serialize)]
pub struct SyncRunResult {
    pub emails_found: u64,
    /// Newly claimed candidates taken to a terminal state this run.
    pub emails_processed: u64,
    /// Already-seen message ids plus payment-notification exclusions.
    pub emails_skipped: u64,
    pub duplicates: u64,
    pub transactions_created: u64,
    pub errors: Vec<String>,
}

/// Aggregate counters persisted per run for observability.
#[derive(Debug, Clone)]
pub struct NewSyncRun {
    pub connection_id: Uuid,
    pub emails_found: i64,
    pub emails_processed: i64,
    pub emails_skipped: i64,
    pub duplicates: i64,
    pub transactions_created: i64,
    pub error_count: i64,
    pub duration_ms: i64,
}

/// Per-connection failures. Per-message failures never surface here; they
/// are recorded on the candidate and the run continues.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("connection {0} not found")]
    NotFound(Uuid),

    #[error("connection {0} is not active")]
    Inactive(Uuid),

    #[error("credential refresh failed: {0}")]
    Credential(String),

    #[error("mailbox search failed: {0}")]
    Gateway(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
