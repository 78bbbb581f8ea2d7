//! Portal API Handlers
//!
//! First-party endpoints behind a session token. Every resource is scoped to
//! the caller's business.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use pool_auth::{ApiKey, Business};
use pool_core::{Identity, Permission, PoolError, WebhookEndpoint};
use pool_payments::{NewWebhook, WebhookUpdate};

use crate::error::ApiResult;
use crate::extract::{ApiJson, PortalCaller, PortalToken};
use crate::handlers::SessionList;
use crate::state::AppState;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(alias = "phone")]
    pub phone_number: String,
    pub pin: String,
}

#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: String,
    pub phone_number: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub session_token: String,
    pub user: UserView,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub id: String,
    pub phone_number: String,
    pub business: Business,
}

#[derive(Debug, Deserialize)]
pub struct IssueKeyRequest {
    pub permissions: Vec<Permission>,
}

#[derive(Debug, Serialize)]
pub struct IssuedKeyResponse {
    pub secret_id: String,
    pub api_key: String,
    pub display_hint: String,
}

/// The only response that ever carries a webhook secret
#[derive(Debug, Serialize)]
pub struct CreatedWebhook {
    #[serde(flatten)]
    pub webhook: WebhookEndpoint,
    pub webhook_secret: String,
}

fn portal_user(caller: &Identity) -> Result<&str, PoolError> {
    caller
        .user_id()
        .ok_or_else(|| PoolError::Internal("portal identity without a user".into()))
}

// ============================================================================
// Accounts
// ============================================================================

/// `POST /v1/auth/login`; signs the phone number up on first use
pub async fn login(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> ApiResult<(StatusCode, Json<LoginResponse>)> {
    let outcome = state
        .accounts
        .login(&request.phone_number, &request.pin)
        .await?;

    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(LoginResponse {
            session_token: outcome.session.token,
            user: UserView {
                id: outcome.user.id,
                phone_number: outcome.user.phone_number,
            },
        }),
    ))
}

/// `GET /v1/me`
pub async fn me(
    State(state): State<AppState>,
    PortalCaller(caller): PortalCaller,
) -> ApiResult<Json<MeResponse>> {
    let (user, business) = state.accounts.profile(portal_user(&caller)?).await?;
    Ok(Json(MeResponse {
        id: user.id,
        phone_number: user.phone_number,
        business,
    }))
}

/// `DELETE /v1/auth/logout`
pub async fn logout(
    State(state): State<AppState>,
    PortalToken(token): PortalToken,
) -> ApiResult<StatusCode> {
    state.tokens.revoke(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// API Keys
// ============================================================================

/// `POST /v1/secrets`
pub async fn issue_api_key(
    State(state): State<AppState>,
    PortalCaller(caller): PortalCaller,
    ApiJson(request): ApiJson<IssueKeyRequest>,
) -> ApiResult<(StatusCode, Json<IssuedKeyResponse>)> {
    let issued = state
        .api_keys
        .issue(&caller.business_id, request.permissions)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(IssuedKeyResponse {
            secret_id: issued.key.id,
            api_key: issued.plaintext,
            display_hint: issued.key.display_hint,
        }),
    ))
}

/// `GET /v1/secrets`
pub async fn list_api_keys(
    State(state): State<AppState>,
    PortalCaller(caller): PortalCaller,
) -> ApiResult<Json<Vec<ApiKey>>> {
    Ok(Json(state.api_keys.list(&caller.business_id).await?))
}

/// `DELETE /v1/secrets/{id}`
pub async fn revoke_api_key(
    State(state): State<AppState>,
    PortalCaller(caller): PortalCaller,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.api_keys.revoke(&caller.business_id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Webhooks
// ============================================================================

/// `POST /v1/webhooks`
pub async fn create_webhook(
    State(state): State<AppState>,
    PortalCaller(caller): PortalCaller,
    ApiJson(request): ApiJson<NewWebhook>,
) -> ApiResult<(StatusCode, Json<CreatedWebhook>)> {
    let webhook = state.webhooks.register(&caller.business_id, request).await?;
    let webhook_secret = webhook.secret.clone();
    Ok((
        StatusCode::CREATED,
        Json(CreatedWebhook {
            webhook,
            webhook_secret,
        }),
    ))
}

/// `GET /v1/webhooks`
pub async fn list_webhooks(
    State(state): State<AppState>,
    PortalCaller(caller): PortalCaller,
) -> ApiResult<Json<Vec<WebhookEndpoint>>> {
    Ok(Json(state.webhooks.list(&caller.business_id).await?))
}

/// `PUT /v1/webhooks/{id}`
pub async fn update_webhook(
    State(state): State<AppState>,
    PortalCaller(caller): PortalCaller,
    Path(id): Path<String>,
    ApiJson(update): ApiJson<WebhookUpdate>,
) -> ApiResult<Json<WebhookEndpoint>> {
    let webhook = state
        .webhooks
        .update(&caller.business_id, &id, update)
        .await?;
    Ok(Json(webhook))
}

/// `DELETE /v1/webhooks/{id}`
pub async fn revoke_webhook(
    State(state): State<AppState>,
    PortalCaller(caller): PortalCaller,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.webhooks.revoke(&caller.business_id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /v1/webhooks/{id}/test`
pub async fn test_webhook(
    State(state): State<AppState>,
    PortalCaller(caller): PortalCaller,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.webhooks.send_test(&caller.business_id, &id).await?;
    Ok(StatusCode::ACCEPTED)
}

// ============================================================================
// Checkout Sessions
// ============================================================================

/// `GET /v1/portal/checkout-sessions`
pub async fn list_sessions(
    State(state): State<AppState>,
    PortalCaller(caller): PortalCaller,
) -> ApiResult<Json<SessionList>> {
    let result = state.checkout.list(&caller.business_id).await?;
    Ok(Json(SessionList { result }))
}
