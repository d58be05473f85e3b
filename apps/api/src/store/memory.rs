//! In-memory `Store` used by unit tests. Mirrors the Postgres semantics
//! (claim-if-absent, one-way candidate transitions, atomic-style mapping
//! updates) behind a single mutex.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::models::candidate::{CandidateEmailRow, CandidateStatus, NewCandidate};
use crate::models::connection::{
    BankFilterRuleRow, MailboxConnectionRow, NewConnection, NewFilterRule, SyncStatus,
};
use crate::models::mapping::{MappingProvenance, MerchantMappingRow};
use crate::models::transaction::{CategoryRow, NewTransaction, TransactionRow};
use crate::store::{Store, StoreError};
use crate::sync::NewSyncRun;

#[derive(Default)]
struct Inner {
    connections: Vec<MailboxConnectionRow>,
    rules: Vec<BankFilterRuleRow>,
    candidates: Vec<CandidateEmailRow>,
    transactions: Vec<TransactionRow>,
    categories: Vec<CategoryRow>,
    mappings: Vec<MerchantMappingRow>,
    sync_runs: Vec<NewSyncRun>,
    /// When set, the next transaction insert fails once (write-failure tests).
    fail_next_transaction_insert: bool,
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn seed_category(&self, user_id: Uuid, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.inner.lock().unwrap().categories.push(CategoryRow {
            id,
            user_id,
            name: name.to_string(),
            category_type: "expense".to_string(),
        });
        id
    }

    pub fn seed_user_mapping(&self, user_id: Uuid, key: &str, category: &str) -> Uuid {
        self.seed_mapping(Some(user_id), key, category, 100, 1)
    }

    pub fn seed_global_mapping(
        &self,
        key: &str,
        category: &str,
        confidence: i32,
        corroboration: i32,
    ) -> Uuid {
        self.seed_mapping(None, key, category, confidence, corroboration)
    }

    fn seed_mapping(
        &self,
        user_id: Option<Uuid>,
        key: &str,
        category: &str,
        confidence: i32,
        corroboration: i32,
    ) -> Uuid {
        let mut inner = self.inner.lock().unwrap();
        inner
            .mappings
            .retain(|m| !(m.user_id == user_id && m.merchant_key == key));
        let id = Uuid::new_v4();
        inner.mappings.push(MerchantMappingRow {
            id,
            user_id,
            merchant_key: key.to_string(),
            merchant_pattern: format!("{key}*"),
            category: category.to_string(),
            confidence,
            usage_count: 1,
            corroboration,
            provenance: MappingProvenance::Seed.as_str().to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        });
        id
    }

    pub fn global_mapping(&self, key: &str) -> Option<MerchantMappingRow> {
        self.inner
            .lock()
            .unwrap()
            .mappings
            .iter()
            .find(|m| m.user_id.is_none() && m.merchant_key == key)
            .cloned()
    }

    pub fn fail_next_transaction_insert(&self) {
        self.inner.lock().unwrap().fail_next_transaction_insert = true;
    }

    pub fn deactivate_connection(&self, id: Uuid) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(conn) = inner.connections.iter_mut().find(|c| c.id == id) {
            conn.active = false;
        }
    }

    /// Ages a candidate row so sweep tests can cross the staleness cutoff.
    pub fn backdate_candidate(&self, id: Uuid, age: Duration) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(candidate) = inner.candidates.iter_mut().find(|c| c.id == id) {
            candidate.created_at = Utc::now() - age;
        }
    }

    pub fn sync_run_count(&self) -> usize {
        self.inner.lock().unwrap().sync_runs.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_connection(&self, connection: &NewConnection) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        self.inner
            .lock()
            .unwrap()
            .connections
            .push(MailboxConnectionRow {
                id,
                user_id: connection.user_id,
                provider: connection.provider.clone(),
                email_address: connection.email_address.clone(),
                refresh_token: connection.refresh_token.clone(),
                active: true,
                last_synced_at: None,
                last_sync_status: None,
                last_sync_error: None,
                created_at: Utc::now(),
            });
        Ok(id)
    }

    async fn get_connection(
        &self,
        id: Uuid,
    ) -> Result<Option<MailboxConnectionRow>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .connections
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn list_active_connections(&self) -> Result<Vec<MailboxConnectionRow>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .connections
            .iter()
            .filter(|c| c.active)
            .cloned()
            .collect())
    }

    async fn record_sync_outcome(
        &self,
        id: Uuid,
        status: SyncStatus,
        error: Option<&str>,
        cursor: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(conn) = inner.connections.iter_mut().find(|c| c.id == id) {
            conn.last_sync_status = Some(status.as_str().to_string());
            conn.last_sync_error = error.map(str::to_string);
            if let Some(cursor) = cursor {
                conn.last_synced_at = Some(cursor);
            }
        }
        Ok(())
    }

    async fn insert_filter_rule(&self, rule: &NewFilterRule) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        self.inner.lock().unwrap().rules.push(BankFilterRuleRow {
            id,
            connection_id: rule.connection_id,
            bank_name: rule.bank_name.clone(),
            sender_addresses: rule.sender_addresses.clone(),
            subject_keywords: rule.subject_keywords.clone(),
        });
        Ok(id)
    }

    async fn filter_rules(
        &self,
        connection_id: Uuid,
    ) -> Result<Vec<BankFilterRuleRow>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .rules
            .iter()
            .filter(|r| r.connection_id == connection_id)
            .cloned()
            .collect())
    }

    async fn candidate_exists(
        &self,
        connection_id: Uuid,
        message_id: &str,
    ) -> Result<bool, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .candidates
            .iter()
            .any(|c| c.connection_id == connection_id && c.message_id == message_id))
    }

    async fn claim_candidate(&self, candidate: &NewCandidate) -> Result<Option<Uuid>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let taken = inner.candidates.iter().any(|c| {
            c.connection_id == candidate.connection_id && c.message_id == candidate.message_id
        });
        if taken {
            return Ok(None);
        }
        let id = Uuid::new_v4();
        inner.candidates.push(CandidateEmailRow {
            id,
            connection_id: candidate.connection_id,
            message_id: candidate.message_id.clone(),
            subject: candidate.subject.clone(),
            sender: candidate.sender.clone(),
            received_at: candidate.received_at,
            body: candidate.body.clone(),
            status: CandidateStatus::Processing.as_str().to_string(),
            parsed_data: None,
            transaction_id: None,
            error_message: None,
            processed_at: None,
            created_at: Utc::now(),
        });
        Ok(Some(id))
    }

    async fn finish_candidate(
        &self,
        id: Uuid,
        status: CandidateStatus,
        parsed_data: Option<&Value>,
        transaction_id: Option<Uuid>,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(candidate) = inner
            .candidates
            .iter_mut()
            .find(|c| c.id == id && c.status == CandidateStatus::Processing.as_str())
        {
            candidate.status = status.as_str().to_string();
            candidate.parsed_data = parsed_data.cloned();
            candidate.transaction_id = transaction_id;
            candidate.error_message = error.map(str::to_string);
            candidate.processed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn sweep_stale_candidates(
        &self,
        connection_id: Uuid,
        stale_after: Duration,
    ) -> Result<u64, StoreError> {
        let cutoff = Utc::now() - stale_after;
        let mut swept = 0;
        let mut inner = self.inner.lock().unwrap();
        for candidate in inner.candidates.iter_mut().filter(|c| {
            c.connection_id == connection_id
                && c.status == CandidateStatus::Processing.as_str()
                && c.created_at < cutoff
        }) {
            candidate.status = CandidateStatus::Failed.as_str().to_string();
            candidate.error_message = Some("sync interrupted before completion".to_string());
            candidate.processed_at = Some(Utc::now());
            swept += 1;
        }
        Ok(swept)
    }

    async fn list_candidates(
        &self,
        connection_id: Uuid,
    ) -> Result<Vec<CandidateEmailRow>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .candidates
            .iter()
            .filter(|c| c.connection_id == connection_id)
            .cloned()
            .collect())
    }

    async fn insert_transaction(&self, transaction: &NewTransaction) -> Result<Uuid, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_next_transaction_insert {
            inner.fail_next_transaction_insert = false;
            return Err(StoreError::Database(sqlx::Error::PoolClosed));
        }
        let id = Uuid::new_v4();
        inner.transactions.push(TransactionRow {
            id,
            user_id: transaction.user_id,
            amount_cents: transaction.amount_cents,
            currency: transaction.currency.clone(),
            merchant: transaction.merchant.clone(),
            category: transaction.category.clone(),
            tx_date: transaction.tx_date,
            card_last4: transaction.card_last4.clone(),
            authorization_code: transaction.authorization_code.clone(),
            description: transaction.description.clone(),
            source: transaction.source.clone(),
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn duplicate_exists(
        &self,
        user_id: Uuid,
        amount_cents: i64,
        day: NaiveDate,
        merchant_hint: Option<&str>,
    ) -> Result<bool, StoreError> {
        Ok(self.inner.lock().unwrap().transactions.iter().any(|t| {
            t.user_id == user_id
                && t.amount_cents == amount_cents
                && t.tx_date.date_naive() == day
                && merchant_hint.map_or(true, |hint| {
                    t.merchant.to_uppercase().contains(&hint.to_uppercase())
                })
        }))
    }

    async fn list_transactions(&self, user_id: Uuid) -> Result<Vec<TransactionRow>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn expense_categories(&self, user_id: Uuid) -> Result<Vec<CategoryRow>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .categories
            .iter()
            .filter(|c| c.user_id == user_id && c.category_type == "expense")
            .cloned()
            .collect())
    }

    async fn find_user_mapping(
        &self,
        user_id: Uuid,
        key: &str,
        first_token: &str,
    ) -> Result<Option<MerchantMappingRow>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let exact = inner
            .mappings
            .iter()
            .find(|m| m.user_id == Some(user_id) && m.merchant_key == key);
        let hit = exact.or_else(|| {
            inner
                .mappings
                .iter()
                .find(|m| m.user_id == Some(user_id) && m.merchant_key.starts_with(first_token))
        });
        Ok(hit.cloned())
    }

    async fn find_trusted_global_mapping(
        &self,
        key: &str,
        min_corroboration: i32,
        min_confidence: i32,
    ) -> Result<Option<MerchantMappingRow>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .mappings
            .iter()
            .find(|m| {
                m.user_id.is_none()
                    && m.merchant_key == key
                    && m.corroboration >= min_corroboration
                    && m.confidence >= min_confidence
            })
            .cloned())
    }

    async fn get_global_mapping(
        &self,
        key: &str,
    ) -> Result<Option<MerchantMappingRow>, StoreError> {
        Ok(self.global_mapping(key))
    }

    async fn record_mapping_hit(&self, id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(mapping) = inner.mappings.iter_mut().find(|m| m.id == id) {
            mapping.usage_count += 1;
            mapping.updated_at = Utc::now();
        }
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
        let mut inner = self.inner.lock().unwrap();
        if let Some(mapping) = inner
            .mappings
            .iter_mut()
            .find(|m| m.user_id == Some(user_id) && m.merchant_key == key)
        {
            mapping.category = category.to_string();
            mapping.confidence = 100;
            mapping.usage_count += 1;
            mapping.provenance = provenance.as_str().to_string();
            mapping.updated_at = Utc::now();
        } else {
            inner.mappings.push(MerchantMappingRow {
                id: Uuid::new_v4(),
                user_id: Some(user_id),
                merchant_key: key.to_string(),
                merchant_pattern: pattern.to_string(),
                category: category.to_string(),
                confidence: 100,
                usage_count: 1,
                corroboration: 1,
                provenance: provenance.as_str().to_string(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            });
        }
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
        let mut inner = self.inner.lock().unwrap();
        if inner
            .mappings
            .iter()
            .any(|m| m.user_id.is_none() && m.merchant_key == key)
        {
            return Ok(());
        }
        inner.mappings.push(MerchantMappingRow {
            id: Uuid::new_v4(),
            user_id: None,
            merchant_key: key.to_string(),
            merchant_pattern: pattern.to_string(),
            category: category.to_string(),
            confidence,
            usage_count: 1,
            corroboration: 1,
            provenance: provenance.as_str().to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        });
        Ok(())
    }

    async fn reinforce_global_mapping(&self, id: Uuid, bump: i32) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(mapping) = inner.mappings.iter_mut().find(|m| m.id == id) {
            mapping.usage_count += 1;
            mapping.corroboration += 1;
            mapping.confidence = (mapping.confidence + bump).min(100);
            mapping.updated_at = Utc::now();
        }
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
        let mut inner = self.inner.lock().unwrap();
        let mapping = inner
            .mappings
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))?;
        if mapping.confidence - decay <= flip_floor {
            mapping.category = category.to_string();
            mapping.confidence = reset_confidence;
        } else {
            mapping.confidence -= decay;
        }
        mapping.updated_at = Utc::now();
        Ok(mapping.clone())
    }

    async fn record_sync_run(&self, run: &NewSyncRun) -> Result<(), StoreError> {
        self.inner.lock().unwrap().sync_runs.push(run.clone());
        Ok(())
    }
}
