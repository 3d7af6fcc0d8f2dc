use crate::{
    api::{error::ApiError, response::ApiResponse},
    db::AddOutcome,
    models::{TrackingEntry, UserId},
    state::AppState,
    validation::{validate_chain_key, validate_custom_name, validate_evm_address},
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Response,
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

// POST /trackings body
#[derive(Debug, Deserialize)]
pub struct AddTrackingRequest {
    pub chain_key: String,
    pub user_id: UserId,
    pub wallet: String,
    #[serde(default)]
    pub custom_name: Option<String>,
}

// PUT /trackings/name body
#[derive(Debug, Deserialize)]
pub struct RenameTrackingRequest {
    pub chain_key: String,
    pub user_id: UserId,
    pub wallet: String,
    pub custom_name: String,
}

// GET and DELETE /trackings query parameters
#[derive(Debug, Deserialize)]
pub struct TrackingsQuery {
    pub chain_key: String,
    pub user_id: UserId,
    #[serde(default)]
    pub wallet: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StopTrackingResponse {
    pub removed: u64,
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/trackings",
            get(list_trackings).post(add_tracking).delete(stop_tracking),
        )
        .route("/trackings/name", put(rename_tracking))
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

async fn add_tracking(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AddTrackingRequest>,
) -> Result<Response, ApiError> {
    let chain = validate_chain_key(&request.chain_key, &state.chain_keys)?;
    let wallet = validate_evm_address(&request.wallet)?;
    let custom_name = request
        .custom_name
        .as_deref()
        .map(validate_custom_name)
        .transpose()?;

    let outcome = state
        .registry
        .add_named_tracking(&chain, request.user_id, &wallet, custom_name.as_deref())
        .await?;
    match outcome {
        AddOutcome::Added => {}
        AddOutcome::AlreadyTracked => {
            return Err(ApiError::Conflict(format!("wallet {} is already tracked", wallet)));
        }
        AddOutcome::NameTaken => {
            let name = custom_name.unwrap_or_default();
            return Err(ApiError::Conflict(format!("name '{}' is already used", name)));
        }
    }
    info!("User {} started tracking {} on {}", request.user_id, wallet, chain);

    let entry = TrackingEntry {
        chain_key: chain,
        user_id: request.user_id,
        wallet,
        custom_name,
    };
    Ok(ApiResponse::with_status(StatusCode::CREATED, entry))
}

async fn list_trackings(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TrackingsQuery>,
) -> Result<Response, ApiError> {
    let chain = validate_chain_key(&params.chain_key, &state.chain_keys)?;
    let entries = state.registry.user_trackings(&chain, params.user_id).await?;
    Ok(ApiResponse::ok(entries))
}

async fn rename_tracking(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RenameTrackingRequest>,
) -> Result<Response, ApiError> {
    let chain = validate_chain_key(&request.chain_key, &state.chain_keys)?;
    let wallet = validate_evm_address(&request.wallet)?;
    let name = validate_custom_name(&request.custom_name)?;

    let tracked = state
        .registry
        .user_trackings(&chain, request.user_id)
        .await?
        .into_iter()
        .any(|entry| entry.wallet == wallet);
    if !tracked {
        return Err(ApiError::NotFound(format!("wallet {} is not tracked", wallet)));
    }

    if !state
        .registry
        .rename_tracking(&chain, request.user_id, &wallet, &name)
        .await?
    {
        return Err(ApiError::Conflict(format!("name '{}' is already used", name)));
    }

    let entry = TrackingEntry {
        chain_key: chain,
        user_id: request.user_id,
        wallet,
        custom_name: Some(name),
    };
    Ok(ApiResponse::ok(entry))
}

async fn stop_tracking(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TrackingsQuery>,
) -> Result<Response, ApiError> {
    let chain = validate_chain_key(&params.chain_key, &state.chain_keys)?;
    let wallet = params
        .wallet
        .as_deref()
        .map(validate_evm_address)
        .transpose()?;

    let removed = state
        .registry
        .stop_tracking(&chain, params.user_id, wallet.as_ref())
        .await?;
    info!("User {} stopped tracking {} wallet(s) on {}", params.user_id, removed, chain);

    Ok(ApiResponse::ok(StopTrackingResponse { removed }))
}
