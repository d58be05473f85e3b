//! Persistence seam. The sync pipeline and mapping engine only ever talk to
//! `dyn Store`; `PgStore` is the production implementation and the in-memory
//! store backs the tests.

pub mod postgres;

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::models::candidate::{CandidateEmailRow, CandidateStatus, NewCandidate};
use crate::models::connection::{
    BankFilterRuleRow, MailboxConnectionRow, NewConnection, NewFilterRule, SyncStatus,
};
use crate::models::mapping::{MappingProvenance, MerchantMappingRow};
use crate::models::transaction::{CategoryRow, NewTransaction, TransactionRow};
use crate::sync::NewSyncRun;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait Store: Send + Sync {
    // ── Mailbox connections ─────────────────────────────────────────────

    async fn insert_connection(&self, connection: &NewConnection) -> Result<Uuid, StoreError>;

    async fn get_connection(&self, id: Uuid)
        -> Result<Option<MailboxConnectionRow>, StoreError>;

    async fn list_active_connections(&self) -> Result<Vec<MailboxConnectionRow>, StoreError>;

    /// Records the outcome of a sync attempt. The cursor only moves when a
    /// new value is supplied; a failed run never advances it.
    async fn record_sync_outcome(
        &self,
        id: Uuid,
        status: SyncStatus,
        error: Option<&str>,
        cursor: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;

    // ── Bank filter rules ───────────────────────────────────────────────

    async fn insert_filter_rule(&self, rule: &NewFilterRule) -> Result<Uuid, StoreError>;

    async fn filter_rules(&self, connection_id: Uuid)
        -> Result<Vec<BankFilterRuleRow>, StoreError>;

    // ── Candidate emails ────────────────────────────────────────────────

    async fn candidate_exists(
        &self,
        connection_id: Uuid,
        message_id: &str,
    ) -> Result<bool, StoreError>;

    /// Atomic create-if-absent on (connection_id, message_id). Returns the
    /// new candidate id, or `None` when another run already claimed the
    /// message — the single guard that makes overlapping runs safe.
    async fn claim_candidate(&self, candidate: &NewCandidate) -> Result<Option<Uuid>, StoreError>;

    /// Moves a `processing` candidate to a terminal status. Terminal rows
    /// are never touched again.
    async fn finish_candidate(
        &self,
        id: Uuid,
        status: CandidateStatus,
        parsed_data: Option<&Value>,
        transaction_id: Option<Uuid>,
        error: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Marks candidates stuck in `processing` (e.g. after a crash mid-run)
    /// as failed. Returns how many rows were swept.
    async fn sweep_stale_candidates(
        &self,
        connection_id: Uuid,
        stale_after: Duration,
    ) -> Result<u64, StoreError>;

    async fn list_candidates(
        &self,
        connection_id: Uuid,
    ) -> Result<Vec<CandidateEmailRow>, StoreError>;

    // ── Transactions ────────────────────────────────────────────────────

    async fn insert_transaction(&self, transaction: &NewTransaction) -> Result<Uuid, StoreError>;

    /// Same-day duplicate probe: same user, same amount in cents, same
    /// calendar date, optionally refined by a merchant substring.
    async fn duplicate_exists(
        &self,
        user_id: Uuid,
        amount_cents: i64,
        day: NaiveDate,
        merchant_hint: Option<&str>,
    ) -> Result<bool, StoreError>;

    async fn list_transactions(&self, user_id: Uuid) -> Result<Vec<TransactionRow>, StoreError>;

    // ── Category catalog (read-only) ────────────────────────────────────

    async fn expense_categories(&self, user_id: Uuid) -> Result<Vec<CategoryRow>, StoreError>;

    // ── Merchant mappings ───────────────────────────────────────────────

    /// User-tier lookup: exact key, or a stored key starting with the first
    /// token of the queried key.
    async fn find_user_mapping(
        &self,
        user_id: Uuid,
        key: &str,
        first_token: &str,
    ) -> Result<Option<MerchantMappingRow>, StoreError>;

    async fn find_trusted_global_mapping(
        &self,
        key: &str,
        min_corroboration: i32,
        min_confidence: i32,
    ) -> Result<Option<MerchantMappingRow>, StoreError>;

    async fn get_global_mapping(&self, key: &str)
        -> Result<Option<MerchantMappingRow>, StoreError>;

    async fn record_mapping_hit(&self, id: Uuid) -> Result<(), StoreError>;

    /// Upsert at full correction strength: created with confidence 100, or
    /// re-pointed to the new category with usage incremented.
    async fn upsert_user_mapping(
        &self,
        user_id: Uuid,
        key: &str,
        pattern: &str,
        category: &str,
        provenance: MappingProvenance,
    ) -> Result<(), StoreError>;

    async fn create_global_mapping(
        &self,
        key: &str,
        pattern: &str,
        category: &str,
        confidence: i32,
        provenance: MappingProvenance,
    ) -> Result<(), StoreError>;

    /// Agreement: usage+1, corroboration+1, confidence+bump capped at 100.
    /// A single atomic update; concurrent corrections must not lose counts.
    async fn reinforce_global_mapping(&self, id: Uuid, bump: i32) -> Result<(), StoreError>;

    /// Disagreement: confidence−decay; at or below the floor the category is
    /// overwritten and confidence reset. One atomic compare-and-set style
    /// statement, returning the resulting row.
    async fn weaken_or_flip_global_mapping(
        &self,
        id: Uuid,
        category: &str,
        decay: i32,
        flip_floor: i32,
        reset_confidence: i32,
    ) -> Result<MerchantMappingRow, StoreError>;

    // ── Sync run log ────────────────────────────────────────────────────

    async fn record_sync_run(&self, run: &NewSyncRun) -> Result<(), StoreError>;
}
