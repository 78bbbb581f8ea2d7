//! Merchant API Handlers

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use pool_core::{CheckoutSession, CreateSessionRequest, PoolError};

use crate::error::ApiResult;
use crate::extract::{ApiCaller, ApiJson, ApiQuery};
use crate::state::AppState;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct TransactionQuery {
    pub transaction_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub client_reference: Option<String>,
}

/// Wrapper used by every listing endpoint
#[derive(Debug, Serialize)]
pub struct SessionList {
    pub result: Vec<CheckoutSession>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `POST /v1/checkout/sessions`
pub async fn create_session(
    State(state): State<AppState>,
    ApiCaller(caller): ApiCaller,
    ApiJson(request): ApiJson<CreateSessionRequest>,
) -> ApiResult<(StatusCode, Json<CheckoutSession>)> {
    let session = state.checkout.create(&caller, request).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// `GET /v1/checkout/sessions/{id}`
pub async fn get_session(
    State(state): State<AppState>,
    ApiCaller(caller): ApiCaller,
    Path(id): Path<String>,
) -> ApiResult<Json<CheckoutSession>> {
    let session = state.checkout.get(&id, &caller.business_id).await?;
    Ok(Json(session))
}

/// `GET /v1/checkout/sessions?transaction_id=T_…`
pub async fn get_session_by_transaction(
    State(state): State<AppState>,
    ApiCaller(caller): ApiCaller,
    ApiQuery(query): ApiQuery<TransactionQuery>,
) -> ApiResult<Json<CheckoutSession>> {
    let transaction_id = query
        .transaction_id
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| PoolError::Validation("transaction_id is required".into()))?;

    let session = state
        .checkout
        .get_by_transaction_id(&transaction_id, &caller.business_id)
        .await?;
    Ok(Json(session))
}

/// `GET /v1/checkout/sessions/search?client_reference=…`
pub async fn search_sessions(
    State(state): State<AppState>,
    ApiCaller(caller): ApiCaller,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> ApiResult<Json<SessionList>> {
    let client_reference = query.client_reference.unwrap_or_default();
    let result = state
        .checkout
        .search_by_client_reference(&client_reference, &caller.business_id)
        .await?;
    Ok(Json(SessionList { result }))
}

/// `POST /v1/checkout/sessions/{id}/expire`
pub async fn expire_session(
    State(state): State<AppState>,
    ApiCaller(caller): ApiCaller,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.checkout.expire(&id, &caller.business_id).await?;
    Ok(StatusCode::OK)
}

/// `POST /v1/checkout/sessions/{id}/refund`
pub async fn refund_session(
    State(state): State<AppState>,
    ApiCaller(caller): ApiCaller,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.checkout.refund(&id, &caller.business_id).await?;
    Ok(StatusCode::OK)
}
