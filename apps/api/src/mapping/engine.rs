//! Merchant mapping engine — a two-tier, self-correcting merchant→category
//! store. User-scoped mappings are unconditionally authoritative for that
//! user; the shared global tier needs corroborating evidence from several
//! users before it is trusted, so one bad correction cannot poison everyone.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::mapping::normalize::{normalize, wildcard_pattern};
use crate::models::mapping::{MappingProvenance, MappingSource, MerchantResolution};
use crate::store::{Store, StoreError};

/// Tunable learning constants. The mechanism is fixed; the numbers came out
/// of production tuning and stay configurable.
#[derive(Debug, Clone, Copy)]
pub struct MappingConfig {
    /// Confidence of a freshly created global mapping.
    pub seed_confidence: i32,
    /// Confidence gained on an agreeing correction (capped at 100).
    pub agreement_bump: i32,
    /// Confidence lost on a disagreeing correction.
    pub disagreement_decay: i32,
    /// At or below this confidence, a disagreeing correction flips the
    /// stored category and resets confidence to `seed_confidence`.
    pub flip_floor: i32,
    /// Minimum distinct confirmations before a global mapping is trusted.
    pub min_corroboration: i32,
    /// Minimum confidence before a global mapping is trusted.
    pub min_global_confidence: i32,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            seed_confidence: 50,
            agreement_bump: 5,
            disagreement_decay: 10,
            flip_floor: 30,
            min_corroboration: 3,
            min_global_confidence: 70,
        }
    }
}

pub struct MappingEngine {
    store: Arc<dyn Store>,
    config: MappingConfig,
}

impl MappingEngine {
    pub fn new(store: Arc<dyn Store>, config: MappingConfig) -> Self {
        Self { store, config }
    }

    /// Resolves a merchant to a category. User tier wins over global; the
    /// global tier must clear both trust thresholds. `None` means the caller
    /// falls back to the AI-derived category.
    pub async fn resolve(
        &self,
        user_id: Uuid,
        merchant_raw: &str,
    ) -> Result<Option<MerchantResolution>, StoreError> {
        let key = normalize(merchant_raw);
        if key.is_empty() {
            return Ok(None);
        }
        let first_token = key.split_whitespace().next().unwrap_or(&key);

        if let Some(user_hit) = self.store.find_user_mapping(user_id, &key, first_token).await? {
            self.store.record_mapping_hit(user_hit.id).await?;
            return Ok(Some(MerchantResolution {
                category: user_hit.category,
                source: MappingSource::User,
                confidence: 100,
            }));
        }

        if let Some(global_hit) = self
            .store
            .find_trusted_global_mapping(
                &key,
                self.config.min_corroboration,
                self.config.min_global_confidence,
            )
            .await?
        {
            self.store.record_mapping_hit(global_hit.id).await?;
            return Ok(Some(MerchantResolution {
                category: global_hit.category,
                source: MappingSource::Global,
                confidence: global_hit.confidence,
            }));
        }

        Ok(None)
    }

    /// Records a merchant→category signal. The user tier is upserted at full
    /// correction strength; the global tier is reinforced on agreement,
    /// decayed on disagreement, and flipped once confidence falls to the
    /// floor (majority-correction policy: repeated disagreement eventually
    /// overturns a mistaken global mapping, a single one never does).
    pub async fn learn(
        &self,
        user_id: Uuid,
        merchant_raw: &str,
        category: &str,
        provenance: MappingProvenance,
    ) -> Result<(), StoreError> {
        let key = normalize(merchant_raw);
        if key.is_empty() {
            return Ok(());
        }
        let pattern = wildcard_pattern(merchant_raw);

        self.store
            .upsert_user_mapping(user_id, &key, &pattern, category, provenance)
            .await?;

        match self.store.get_global_mapping(&key).await? {
            None => {
                self.store
                    .create_global_mapping(
                        &key,
                        &pattern,
                        category,
                        self.config.seed_confidence,
                        provenance,
                    )
                    .await?;
                debug!("Seeded global mapping {key} -> {category}");
            }
            Some(existing) if existing.category.eq_ignore_ascii_case(category) => {
                self.store
                    .reinforce_global_mapping(existing.id, self.config.agreement_bump)
                    .await?;
            }
            Some(existing) => {
                let updated = self
                    .store
                    .weaken_or_flip_global_mapping(
                        existing.id,
                        category,
                        self.config.disagreement_decay,
                        self.config.flip_floor,
                        self.config.seed_confidence,
                    )
                    .await?;
                if updated.category != existing.category {
                    debug!(
                        "Global mapping {key} flipped {} -> {} after repeated disagreement",
                        existing.category, updated.category
                    );
                }
            }
        }

        Ok(())
    }
}
