//! sqlx/Postgres implementation of the `Store` trait.
//!
//! Mapping confidence updates are single UPDATE statements so concurrent
//! corrections from different users cannot lose increments; the candidate
//! claim is `INSERT .. ON CONFLICT DO NOTHING`, closing the race between
//! existence check and insert.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::candidate::{CandidateEmailRow, CandidateStatus, NewCandidate};
use crate::models::connection::{
    BankFilterRuleRow, MailboxConnectionRow, NewConnection, NewFilterRule, SyncStatus,
};
use crate::models::mapping::{MappingProvenance, MerchantMappingRow};
use crate::models::transaction::{CategoryRow, NewTransaction, TransactionRow};
use crate::store::{Store, StoreError};
use crate::sync::NewSyncRun;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_connection(&self, connection: &NewConnection) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO mailbox_connections
                (id, user_id, provider, email_address, refresh_token, active)
            VALUES ($1, $2, $3, $4, $5, TRUE)
            "#,
        )
        .bind(id)
        .bind(connection.user_id)
        .bind(&connection.provider)
        .bind(&connection.email_address)
        .bind(&connection.refresh_token)
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    async fn get_connection(
        &self,
        id: Uuid,
    ) -> Result<Option<MailboxConnectionRow>, StoreError> {
        Ok(sqlx::query_as::<_, MailboxConnectionRow>(
            "SELECT * FROM mailbox_connections WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn list_active_connections(&self) -> Result<Vec<MailboxConnectionRow>, StoreError> {
        Ok(sqlx::query_as::<_, MailboxConnectionRow>(
            "SELECT * FROM mailbox_connections WHERE active ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn record_sync_outcome(
        &self,
        id: Uuid,
        status: SyncStatus,
        error: Option<&str>,
        cursor: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE mailbox_connections
            SET last_sync_status = $2,
                last_sync_error = $3,
                last_synced_at = COALESCE($4, last_synced_at)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(error)
        .bind(cursor)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_filter_rule(&self, rule: &NewFilterRule) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO bank_filter_rules
                (id, connection_id, bank_name, sender_addresses, subject_keywords)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(id)
        .bind(rule.connection_id)
        .bind(&rule.bank_name)
        .bind(&rule.sender_addresses)
        .bind(&rule.subject_keywords)
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    async fn filter_rules(
        &self,
        connection_id: Uuid,
    ) -> Result<Vec<BankFilterRuleRow>, StoreError> {
        Ok(sqlx::query_as::<_, BankFilterRuleRow>(
            "SELECT * FROM bank_filter_rules WHERE connection_id = $1 ORDER BY bank_name",
        )
        .bind(connection_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn candidate_exists(
        &self,
        connection_id: Uuid,
        message_id: &str,
    ) -> Result<bool, StoreError> {
        Ok(sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM candidate_emails WHERE connection_id = $1 AND message_id = $2)",
        )
        .bind(connection_id)
        .bind(message_id)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn claim_candidate(&self, candidate: &NewCandidate) -> Result<Option<Uuid>, StoreError> {
        let id = Uuid::new_v4();
        Ok(sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO candidate_emails
                (id, connection_id, message_id, subject, sender, received_at, body, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'processing')
            ON CONFLICT (connection_id, message_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(candidate.connection_id)
        .bind(&candidate.message_id)
        .bind(&candidate.subject)
        .bind(&candidate.sender)
        .bind(candidate.received_at)
        .bind(&candidate.body)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn finish_candidate(
        &self,
        id: Uuid,
        status: CandidateStatus,
        parsed_data: Option<&Value>,
        transaction_id: Option<Uuid>,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        // The status guard keeps transitions one-way: terminal rows stay put.
        sqlx::query(
            r#"
            UPDATE candidate_emails
            SET status = $2,
                parsed_data = $3,
                transaction_id = $4,
                error_message = $5,
                processed_at = NOW()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(parsed_data)
        .bind(transaction_id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn sweep_stale_candidates(
        &self,
        connection_id: Uuid,
        stale_after: Duration,
    ) -> Result<u64, StoreError> {
        let cutoff = Utc::now() - stale_after;
        let result = sqlx::query(
            r#"
            UPDATE candidate_emails
            SET status = 'failed',
                error_message = 'sync interrupted before completion',
                processed_at = NOW()
            WHERE connection_id = $1 AND status = 'processing' AND created_at < $2
            "#,
        )
        .bind(connection_id)
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn list_candidates(
        &self,
        connection_id: Uuid,
    ) -> Result<Vec<CandidateEmailRow>, StoreError> {
        Ok(sqlx::query_as::<_, CandidateEmailRow>(
            "SELECT * FROM candidate_emails WHERE connection_id = $1 ORDER BY received_at DESC",
        )
        .bind(connection_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn insert_transaction(&self, transaction: &NewTransaction) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO transactions
                (id, user_id, amount_cents, currency, merchant, category, tx_date,
                 card_last4, authorization_code, description, source)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(id)
        .bind(transaction.user_id)
        .bind(transaction.amount_cents)
        .bind(&transaction.currency)
        .bind(&transaction.merchant)
        .bind(&transaction.category)
        .bind(transaction.tx_date)
        .bind(&transaction.card_last4)
        .bind(&transaction.authorization_code)
        .bind(&transaction.description)
        .bind(&transaction.source)
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    async fn duplicate_exists(
        &self,
        user_id: Uuid,
        amount_cents: i64,
        day: NaiveDate,
        merchant_hint: Option<&str>,
    ) -> Result<bool, StoreError> {
        Ok(sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM transactions
                WHERE user_id = $1
                  AND amount_cents = $2
                  AND tx_date::date = $3
                  AND ($4::text IS NULL OR merchant ILIKE '%' || $4 || '%')
            )
            "#,
        )
        .bind(user_id)
        .bind(amount_cents)
        .bind(day)
        .bind(merchant_hint)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn list_transactions(&self, user_id: Uuid) -> Result<Vec<TransactionRow>, StoreError> {
        Ok(sqlx::query_as::<_, TransactionRow>(
            "SELECT * FROM transactions WHERE user_id = $1 ORDER BY tx_date DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn expense_categories(&self, user_id: Uuid) -> Result<Vec<CategoryRow>, StoreError> {
        Ok(sqlx::query_as::<_, CategoryRow>(
            "SELECT * FROM categories WHERE user_id = $1 AND category_type = 'expense' ORDER BY name",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn find_user_mapping(
        &self,
        user_id: Uuid,
        key: &str,
        first_token: &str,
    ) -> Result<Option<MerchantMappingRow>, StoreError> {
        Ok(sqlx::query_as::<_, MerchantMappingRow>(
            r#"
            SELECT * FROM merchant_mappings
            WHERE user_id = $1
              AND (merchant_key = $2 OR merchant_key LIKE $3 || '%')
            ORDER BY (merchant_key = $2) DESC, usage_count DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(key)
        .bind(first_token)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn find_trusted_global_mapping(
        &self,
        key: &str,
        min_corroboration: i32,
        min_confidence: i32,
    ) -> Result<Option<MerchantMappingRow>, StoreError> {
        Ok(sqlx::query_as::<_, MerchantMappingRow>(
            r#"
            SELECT * FROM merchant_mappings
            WHERE user_id IS NULL
              AND merchant_key = $1
              AND corroboration >= $2
              AND confidence >= $3
            "#,
        )
        .bind(key)
        .bind(min_corroboration)
        .bind(min_confidence)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn get_global_mapping(
        &self,
        key: &str,
    ) -> Result<Option<MerchantMappingRow>, StoreError> {
        Ok(sqlx::query_as::<_, MerchantMappingRow>(
            "SELECT * FROM merchant_mappings WHERE user_id IS NULL AND merchant_key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn record_mapping_hit(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE merchant_mappings SET usage_count = usage_count + 1, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_user_mapping(
        &self,
        user_id: Uuid,
        key: &str,
        pattern: &str,
        category: &str,
        provenance: MappingProvenance,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO merchant_mappings
                (id, user_id, merchant_key, merchant_pattern, category,
                 confidence, usage_count, corroboration, provenance)
            VALUES ($1, $2, $3, $4, $5, 100, 1, 1, $6)
            ON CONFLICT (user_id, merchant_key) WHERE user_id IS NOT NULL
            DO UPDATE SET
                category = EXCLUDED.category,
                confidence = 100,
                usage_count = merchant_mappings.usage_count + 1,
                provenance = EXCLUDED.provenance,
                updated_at = NOW()
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(key)
        .bind(pattern)
        .bind(category)
        .bind(provenance.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn create_global_mapping(
        &self,
        key: &str,
        pattern: &str,
        category: &str,
        confidence: i32,
        provenance: MappingProvenance,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO merchant_mappings
                (id, user_id, merchant_key, merchant_pattern, category,
                 confidence, usage_count, corroboration, provenance)
            VALUES ($1, NULL, $2, $3, $4, $5, 1, 1, $6)
            ON CONFLICT (merchant_key) WHERE user_id IS NULL
            DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(key)
        .bind(pattern)
        .bind(category)
        .bind(confidence)
        .bind(provenance.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn reinforce_global_mapping(&self, id: Uuid, bump: i32) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE merchant_mappings
            SET usage_count = usage_count + 1,
                corroboration = corroboration + 1,
                confidence = LEAST(100, confidence + $2),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(bump)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn weaken_or_flip_global_mapping(
        &self,
        id: Uuid,
        category: &str,
        decay: i32,
        flip_floor: i32,
        reset_confidence: i32,
    ) -> Result<MerchantMappingRow, StoreError> {
        Ok(sqlx::query_as::<_, MerchantMappingRow>(
            r#"
            UPDATE merchant_mappings
            SET category   = CASE WHEN confidence - $2 <= $3 THEN $5 ELSE category END,
                confidence = CASE WHEN confidence - $2 <= $3 THEN $4 ELSE confidence - $2 END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(decay)
        .bind(flip_floor)
        .bind(reset_confidence)
        .bind(category)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn record_sync_run(&self, run: &NewSyncRun) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sync_runs
                (id, connection_id, emails_found, emails_processed, emails_skipped,
                 duplicates, transactions_created, error_count, duration_ms)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(run.connection_id)
        .bind(run.emails_found)
        .bind(run.emails_processed)
        .bind(run.emails_skipped)
        .bind(run.duplicates)
        .bind(run.transactions_created)
        .bind(run.error_count)
        .bind(run.duration_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
