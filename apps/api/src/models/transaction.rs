use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A recorded financial transaction. Amounts are integer cents so
/// duplicate-detection equality is exact.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TransactionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub merchant: String,
    pub category: String,
    pub tx_date: DateTime<Utc>,
    pub card_last4: Option<String>,
    pub authorization_code: Option<String>,
    pub description: String,
    pub source: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub merchant: String,
    pub category: String,
    pub tx_date: DateTime<Utc>,
    pub card_last4: Option<String>,
    pub authorization_code: Option<String>,
    pub description: String,
    pub source: String,
}

/// Read-only category catalog entry supplied by the surrounding app.
/// The parser only ever offers the model categories that currently exist.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CategoryRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub category_type: String,
}
