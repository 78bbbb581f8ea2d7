//! Request extractors
//!
//! Handlers never see the `Authorization` header: they take an [`ApiCaller`]
//! or [`PortalCaller`] and receive the resolved [`Identity`]. Logout is the
//! one exception and gets the validated token through [`PortalToken`].

use axum::extract::{FromRequest, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use pool_auth::bearer_token;
use pool_core::error::CODE_INVALID_AUTH;
use pool_core::{Identity, Permission, PoolError};

use crate::error::ApiError;
use crate::state::AppState;

/// JSON body whose rejections use the API error shape
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Form body whose rejections use the API error shape
#[derive(FromRequest)]
#[from_request(via(axum::Form), rejection(ApiError))]
pub struct ApiForm<T>(pub T);

/// Query string whose rejections use the API error shape
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

fn authorization(parts: &Parts) -> Result<Option<&str>, PoolError> {
    parts
        .headers
        .get(AUTHORIZATION)
        .map(|value| {
            value.to_str().map_err(|_| {
                PoolError::unauthorized(CODE_INVALID_AUTH, "Authorization header is not valid text")
            })
        })
        .transpose()
}

/// Integration caller holding an API key with the checkout permission
pub struct ApiCaller(pub Identity);

impl FromRequestParts<AppState> for ApiCaller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let header = authorization(parts)?;
        let identity = state
            .gate
            .api_caller(header, Permission::CheckoutApi)
            .await?;
        Ok(Self(identity))
    }
}

/// First-party portal caller holding a session token
pub struct PortalCaller(pub Identity);

impl FromRequestParts<AppState> for PortalCaller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let header = authorization(parts)?;
        let identity = state.gate.portal_caller(header).await?;
        Ok(Self(identity))
    }
}

/// Session token of an authenticated portal caller
pub struct PortalToken(pub String);

impl FromRequestParts<AppState> for PortalToken {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let header = authorization(parts)?;
        state.gate.portal_caller(header).await?;
        Ok(Self(bearer_token(header)?.to_owned()))
    }
}
