use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Merchant→category mapping. `user_id = NULL` marks the shared global tier;
/// at most one row exists per (owner, merchant_key).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MerchantMappingRow {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub merchant_key: String,
    pub merchant_pattern: String,
    pub category: String,
    pub confidence: i32,
    pub usage_count: i32,
    /// Distinct confirming signals behind a global mapping. A global row is
    /// trusted only once this clears the configured minimum.
    pub corroboration: i32,
    pub provenance: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Which tier answered a merchant resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingSource {
    User,
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingProvenance {
    UserCorrection,
    AiInferred,
    Seed,
}

impl MappingProvenance {
    pub fn as_str(self) -> &'static str {
        match self {
            MappingProvenance::UserCorrection => "user_correction",
            MappingProvenance::AiInferred => "ai_inferred",
            MappingProvenance::Seed => "seed",
        }
    }
}

/// Result of resolving a merchant through the mapping engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerchantResolution {
    pub category: String,
    pub source: MappingSource,
    pub confidence: i32,
}
