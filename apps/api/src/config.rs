use anyhow::{Context, Result};

use crate::mapping::engine::MappingConfig;

/// Application configuration loaded from environment variables.
/// Panics at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub anthropic_api_key: String,
    pub google_client_id: String,
    pub google_client_secret: String,
    pub port: u16,
    pub rust_log: String,
    pub sync: SyncSettings,
    pub mapping: MappingConfig,
}

/// Sync cadence and per-run tuning. Everything has a default; envs override.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Seconds between scheduler ticks.
    pub interval_secs: u64,
    /// Fixed delay between two connections in one fan-out.
    pub spacing_ms: u64,
    /// Random jitter added on top of the fixed spacing.
    pub spacing_jitter_ms: u64,
    /// Look-back window for a connection's first sync.
    pub lookback_days: i64,
    /// Max messages per mailbox search.
    pub search_limit: usize,
    /// Minutes after which a lingering `processing` candidate is swept.
    pub stale_after_minutes: i64,
    /// Category used when neither the mapping engine nor the model has one.
    pub fallback_category: String,
    /// Raw email bodies are truncated to this many bytes in audit records.
    pub body_limit_bytes: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            interval_secs: 900,
            spacing_ms: 2_000,
            spacing_jitter_ms: 1_000,
            lookback_days: 30,
            search_limit: 50,
            stale_after_minutes: 10,
            fallback_category: "Otros".to_string(),
            body_limit_bytes: 8_192,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let defaults = SyncSettings::default();
        let sync = SyncSettings {
            interval_secs: env_or("SYNC_INTERVAL_SECS", defaults.interval_secs)?,
            spacing_ms: env_or("SYNC_SPACING_MS", defaults.spacing_ms)?,
            spacing_jitter_ms: env_or("SYNC_SPACING_JITTER_MS", defaults.spacing_jitter_ms)?,
            lookback_days: env_or("SYNC_LOOKBACK_DAYS", defaults.lookback_days)?,
            search_limit: env_or("SYNC_SEARCH_LIMIT", defaults.search_limit)?,
            stale_after_minutes: env_or("SYNC_STALE_AFTER_MINUTES", defaults.stale_after_minutes)?,
            fallback_category: std::env::var("SYNC_FALLBACK_CATEGORY")
                .unwrap_or(defaults.fallback_category),
            body_limit_bytes: defaults.body_limit_bytes,
        };

        let mapping_defaults = MappingConfig::default();
        let mapping = MappingConfig {
            seed_confidence: env_or("MAPPING_SEED_CONFIDENCE", mapping_defaults.seed_confidence)?,
            agreement_bump: env_or("MAPPING_AGREEMENT_BUMP", mapping_defaults.agreement_bump)?,
            disagreement_decay: env_or(
                "MAPPING_DISAGREEMENT_DECAY",
                mapping_defaults.disagreement_decay,
            )?,
            flip_floor: env_or("MAPPING_FLIP_FLOOR", mapping_defaults.flip_floor)?,
            min_corroboration: env_or(
                "MAPPING_MIN_CORROBORATION",
                mapping_defaults.min_corroboration,
            )?,
            min_global_confidence: env_or(
                "MAPPING_MIN_GLOBAL_CONFIDENCE",
                mapping_defaults.min_global_confidence,
            )?,
        };

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            google_client_id: require_env("GOOGLE_CLIENT_ID")?,
            google_client_secret: require_env("GOOGLE_CLIENT_SECRET")?,
            port: env_or("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            sync,
            mapping,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("'{key}' must be a valid value")),
        Err(_) => Ok(default),
    }
}
