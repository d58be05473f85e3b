//! Background scheduler: every tick, syncs all active connections one after
//! another with a small randomized gap between them, so the mailbox provider
//! never sees a burst. Errors are logged and never escape the loop.

use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use tracing::{error, info};

use crate::state::AppState;
use crate::sync::orchestrator;

#[derive(Debug, Default, Serialize)]
pub struct SyncAllSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Runs forever; spawned once at startup.
pub async fn run_scheduler(state: AppState) {
    let interval_secs = state.config.sync.interval_secs;
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    info!("Sync scheduler started, tick every {interval_secs}s");

    loop {
        ticker.tick().await;
        let summary = sync_all(&state).await;
        info!(
            "Scheduled sync pass done: {} attempted, {} succeeded, {} failed",
            summary.attempted, summary.succeeded, summary.failed
        );
    }
}

/// Syncs every active connection sequentially. One connection failing never
/// affects the others.
pub async fn sync_all(state: &AppState) -> SyncAllSummary {
    let mut summary = SyncAllSummary::default();

    let connections = match state.store.list_active_connections().await {
        Ok(connections) => connections,
        Err(err) => {
            error!("Could not list active connections: {err}");
            return summary;
        }
    };

    for (index, connection) in connections.iter().enumerate() {
        if index > 0 {
            let jitter = rand::thread_rng().gen_range(0..=state.config.sync.spacing_jitter_ms);
            tokio::time::sleep(Duration::from_millis(state.config.sync.spacing_ms + jitter)).await;
        }

        summary.attempted += 1;
        match orchestrator::sync_connection(
            state.store.clone(),
            state.mailbox.clone(),
            state.llm.clone(),
            &state.config.sync,
            state.config.mapping,
            connection.id,
        )
        .await
        {
            Ok(_) => summary.succeeded += 1,
            Err(err) => {
                error!("Scheduled sync failed for connection {}: {err}", connection.id);
                summary.failed += 1;
            }
        }
    }

    summary
}
