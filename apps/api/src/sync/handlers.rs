use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::mailbox::banks;
use crate::mapping::engine::MappingEngine;
use crate::models::candidate::CandidateEmailRow;
use crate::models::connection::{MailboxConnectionRow, NewConnection};
use crate::models::mapping::{MappingProvenance, MerchantResolution};
use crate::state::AppState;
use crate::sync::scheduler::{sync_all, SyncAllSummary};
use crate::sync::{orchestrator, SyncRunResult};

#[derive(Deserialize)]
pub struct CreateConnectionRequest {
    pub user_id: Uuid,
    #[serde(default = "default_provider")]
    pub provider: String,
    pub email_address: String,
    pub refresh_token: String,
}

fn default_provider() -> String {
    "gmail".to_string()
}

#[derive(Serialize)]
pub struct CreateConnectionResponse {
    pub id: Uuid,
}

/// Connection as exposed over the API. The refresh token never leaves the
/// database.
#[derive(Serialize)]
pub struct ConnectionView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider: String,
    pub email_address: String,
    pub active: bool,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub last_sync_status: Option<String>,
    pub last_sync_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<MailboxConnectionRow> for ConnectionView {
    fn from(row: MailboxConnectionRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            provider: row.provider,
            email_address: row.email_address,
            active: row.active,
            last_synced_at: row.last_synced_at,
            last_sync_status: row.last_sync_status,
            last_sync_error: row.last_sync_error,
            created_at: row.created_at,
        }
    }
}

#[derive(Deserialize)]
pub struct ResolveQuery {
    pub user_id: Uuid,
    pub merchant: String,
}

#[derive(Deserialize)]
pub struct CorrectionRequest {
    pub user_id: Uuid,
    pub merchant: String,
    pub category: String,
}

/// POST /api/v1/connections
pub async fn handle_create_connection(
    State(state): State<AppState>,
    Json(req): Json<CreateConnectionRequest>,
) -> Result<(StatusCode, Json<CreateConnectionResponse>), AppError> {
    if req.email_address.trim().is_empty() || !req.email_address.contains('@') {
        return Err(AppError::Validation(
            "email_address must be a valid address".to_string(),
        ));
    }
    if req.refresh_token.trim().is_empty() {
        return Err(AppError::Validation(
            "refresh_token must not be empty".to_string(),
        ));
    }

    let id = state
        .store
        .insert_connection(&NewConnection {
            user_id: req.user_id,
            provider: req.provider,
            email_address: req.email_address,
            refresh_token: req.refresh_token,
        })
        .await?;

    for rule in banks::default_rules(id) {
        state.store.insert_filter_rule(&rule).await?;
    }

    Ok((StatusCode::CREATED, Json(CreateConnectionResponse { id })))
}

/// GET /api/v1/connections/:id
pub async fn handle_get_connection(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ConnectionView>, AppError> {
    let connection = state
        .store
        .get_connection(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Connection {id} not found")))?;
    Ok(Json(ConnectionView::from(connection)))
}

/// GET /api/v1/connections/:id/candidates
pub async fn handle_list_candidates(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<CandidateEmailRow>>, AppError> {
    state
        .store
        .get_connection(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Connection {id} not found")))?;
    let candidates = state.store.list_candidates(id).await?;
    Ok(Json(candidates))
}

/// POST /api/v1/sync/connections/:id
pub async fn handle_sync_connection(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SyncRunResult>, AppError> {
    let result = orchestrator::sync_connection(
        state.store.clone(),
        state.mailbox.clone(),
        state.llm.clone(),
        &state.config.sync,
        state.config.mapping,
        id,
    )
    .await?;
    Ok(Json(result))
}

/// POST /api/v1/sync/run
pub async fn handle_sync_all(State(state): State<AppState>) -> Json<SyncAllSummary> {
    Json(sync_all(&state).await)
}

/// GET /api/v1/merchants/resolve
pub async fn handle_resolve_merchant(
    State(state): State<AppState>,
    Query(params): Query<ResolveQuery>,
) -> Result<Json<MerchantResolution>, AppError> {
    let engine = MappingEngine::new(state.store.clone(), state.config.mapping);
    let resolution = engine
        .resolve(params.user_id, &params.merchant)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("No mapping found for '{}'", params.merchant))
        })?;
    Ok(Json(resolution))
}

/// POST /api/v1/merchants/corrections
pub async fn handle_merchant_correction(
    State(state): State<AppState>,
    Json(req): Json<CorrectionRequest>,
) -> Result<StatusCode, AppError> {
    if req.merchant.trim().is_empty() {
        return Err(AppError::Validation("merchant must not be empty".to_string()));
    }
    if req.category.trim().is_empty() {
        return Err(AppError::Validation("category must not be empty".to_string()));
    }

    let engine = MappingEngine::new(state.store.clone(), state.config.mapping);
    engine
        .learn(
            req.user_id,
            &req.merchant,
            &req.category,
            MappingProvenance::UserCorrection,
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
