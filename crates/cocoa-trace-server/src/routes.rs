//! HTTP routes for appending deliveries, recording scans and verifying the
//! chain.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use cocoa_trace::core::Page;
use cocoa_trace::store::Store;
use cocoa_trace::{
    Block, BlockVerification, ChainVerification, DeliveryRef, LedgerError, LedgerStats, Payload,
    QrPayload, QrToken, ScanEvent, ScanRequest, Timeline,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

/// Mount point of the traceability routes.
pub const API_BASE: &str = "/api/v1/traceability";

/// Page size used when the query omits `limit`.
pub const DEFAULT_PAGE_LIMIT: u64 = 20;

/// Body of `POST /append`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppendRequest {
    #[serde(alias = "delivery_id")]
    pub delivery_ref: String,
    pub payload: Payload,
}

/// Query of `GET /blocks`.
#[derive(Debug, Clone, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub offset: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_limit() -> u64 {
    DEFAULT_PAGE_LIMIT
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
}

/// Build the router: `/health` at the root, everything else under
/// [`API_BASE`].
pub fn router<S: Store + 'static>(state: AppState<S>) -> Router {
    let api = Router::new()
        .route("/append", post(append_block::<S>))
        .route("/block/:qr_token", get(get_block::<S>))
        .route("/delivery/:delivery_ref", get(get_delivery::<S>))
        .route("/blocks", get(list_blocks::<S>))
        .route("/verify/:qr_token", get(verify_block::<S>))
        .route("/verify-chain", get(verify_chain::<S>))
        .route("/scan/:qr_token", post(record_scan::<S>))
        .route("/timeline/:key", get(timeline::<S>))
        .route("/qr/:qr_token", get(qr_payload::<S>))
        .route("/stats", get(stats::<S>));

    Router::new()
        .route("/health", get(health))
        .nest(API_BASE, api)
        .with_state(state)
}

/// A token that does not parse cannot name any block.
fn token(raw: &str) -> Result<QrToken, ApiError> {
    QrToken::parse(raw).map_err(|_| LedgerError::NotFound(format!("qr token {}", raw)).into())
}

/// GET /health
pub async fn health() -> Json<Health> {
    Json(Health {
        status: "ok".to_string(),
    })
}

/// POST /append
pub async fn append_block<S: Store>(
    State(state): State<AppState<S>>,
    body: Result<Json<AppendRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Block>), ApiError> {
    let Json(request) = body?;
    let delivery_ref = DeliveryRef::new(request.delivery_ref)?;
    let block = state.ledger.append_block(delivery_ref, request.payload).await?;
    Ok((StatusCode::CREATED, Json(block)))
}

/// GET /block/:qr_token
pub async fn get_block<S: Store>(
    State(state): State<AppState<S>>,
    Path(qr_token): Path<String>,
) -> Result<Json<Block>, ApiError> {
    let token = token(&qr_token)?;
    Ok(Json(state.ledger.get_block(&token).await?))
}

/// GET /delivery/:delivery_ref
pub async fn get_delivery<S: Store>(
    State(state): State<AppState<S>>,
    Path(delivery_ref): Path<String>,
) -> Result<Json<Block>, ApiError> {
    let delivery_ref = DeliveryRef::new(delivery_ref.as_str())
        .map_err(|_| LedgerError::NotFound(format!("delivery {}", delivery_ref)))?;
    Ok(Json(state.ledger.get_block_by_delivery(&delivery_ref).await?))
}

/// GET /blocks?offset&limit
pub async fn list_blocks<S: Store>(
    State(state): State<AppState<S>>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Page<Block>>, ApiError> {
    let Query(query) = query?;
    Ok(Json(state.ledger.blocks(query.offset, query.limit).await?))
}

/// GET /verify/:qr_token
pub async fn verify_block<S: Store>(
    State(state): State<AppState<S>>,
    Path(qr_token): Path<String>,
) -> Result<Json<BlockVerification>, ApiError> {
    let token = token(&qr_token)?;
    Ok(Json(state.ledger.verify_block(&token).await?))
}

/// GET /verify-chain
pub async fn verify_chain<S: Store>(
    State(state): State<AppState<S>>,
) -> Result<Json<ChainVerification>, ApiError> {
    Ok(Json(state.ledger.verify_chain().await?))
}

/// POST /scan/:qr_token
pub async fn record_scan<S: Store>(
    State(state): State<AppState<S>>,
    Path(qr_token): Path<String>,
    body: Result<Json<ScanRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ScanEvent>), ApiError> {
    let token = token(&qr_token)?;
    let Json(request) = body?;
    let event = state.ledger.record_scan(&token, request).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

/// GET /timeline/:key
pub async fn timeline<S: Store>(
    State(state): State<AppState<S>>,
    Path(key): Path<String>,
) -> Result<Json<Timeline>, ApiError> {
    Ok(Json(state.ledger.timeline(&key).await?))
}

/// GET /qr/:qr_token
pub async fn qr_payload<S: Store>(
    State(state): State<AppState<S>>,
    Path(qr_token): Path<String>,
) -> Result<Json<QrPayload>, ApiError> {
    let token = token(&qr_token)?;
    Ok(Json(state.ledger.qr_payload(&token).await?))
}

/// GET /stats
pub async fn stats<S: Store>(
    State(state): State<AppState<S>>,
) -> Result<Json<LedgerStats>, ApiError> {
    Ok(Json(state.ledger.stats().await?))
}
