//! HTTP error responses
//!
//! Every failure leaves the server as `{code, message, details?}` with the
//! status the underlying [`PoolError`] maps to.

use axum::Json;
use axum::extract::rejection::{FormRejection, JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use pool_core::PoolError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("invalid JSON body: {0}")]
    Json(#[from] JsonRejection),

    #[error("invalid form body: {0}")]
    Form(#[from] FormRejection),

    #[error("invalid query string: {0}")]
    Query(#[from] QueryRejection),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    fn body(&self) -> (StatusCode, ErrorBody) {
        match self {
            Self::Pool(err) => (
                StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                ErrorBody {
                    code: err.code(),
                    message: err.user_message(),
                    details: None,
                },
            ),
            Self::Json(rejection) => malformed("Request body is not valid", rejection.body_text()),
            Self::Form(rejection) => malformed("Form body is not valid", rejection.body_text()),
            Self::Query(rejection) => {
                malformed("Query parameters are not valid", rejection.body_text())
            }
        }
    }
}

fn malformed(message: &str, details: String) -> (StatusCode, ErrorBody) {
    let validation = PoolError::Validation(message.to_string());
    (
        StatusCode::BAD_REQUEST,
        ErrorBody {
            code: validation.code(),
            message: validation.user_message(),
            details: Some(details),
        },
    )
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = self.body();

        if status.is_server_error() {
            tracing::error!(code = body.code, error = %self, "Request failed");
        } else {
            tracing::debug!(code = body.code, status = status.as_u16(), "Request rejected");
        }

        (status, Json(body)).into_response()
    }
}
