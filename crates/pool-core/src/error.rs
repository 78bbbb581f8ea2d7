//! Error Types
//!
//! Every failure a merchant can observe maps to one variant here. The `code`
//! strings are part of the public contract: integrators branch on them, so
//! they never change once shipped.

use thiserror::Error;

/// Result type alias for pool operations
pub type Result<T> = std::result::Result<T, PoolError>;

pub const CODE_VALIDATION: &str = "request-validation-error";
pub const CODE_SESSION_NOT_FOUND: &str = "checkout-session-not-found";
pub const CODE_SESSION_CONFLICT: &str = "checkout-session-conflict";
pub const CODE_SESSION_EXPIRED: &str = "checkout-session-expired";
pub const CODE_SESSION_NOT_OPEN: &str = "checkout-session-not-open";
pub const CODE_REFUND_FAILED: &str = "checkout-refund-failed";
pub const CODE_INSUFFICIENT_PERMISSIONS: &str = "insufficient-permissions";
pub const CODE_TOO_MANY_ATTEMPTS: &str = "too-many-attempts";
pub const CODE_WEBHOOK_NOT_FOUND: &str = "webhook-not-found";
pub const CODE_WEBHOOK_REVOKED: &str = "webhook-revoked";
pub const CODE_API_KEY_NOT_FOUND: &str = "api-key-not-found";
pub const CODE_INTERNAL: &str = "internal-server-error";

// Authentication gate
pub const CODE_MISSING_AUTH_HEADER: &str = "missing-auth-header";
pub const CODE_INVALID_AUTH: &str = "invalid-auth";
pub const CODE_API_KEY_NOT_PROVIDED: &str = "api-key-not-provided";
pub const CODE_INVALID_API_KEY_PREFIX: &str = "invalid-api-key-prefix";
pub const CODE_NO_MATCHING_API_KEY: &str = "no-matching-api-key";
pub const CODE_API_KEY_REVOKED: &str = "api-key-revoked";
pub const CODE_INVALID_SESSION_TOKEN: &str = "invalid-session-token";
pub const CODE_SESSION_TOKEN_EXPIRED: &str = "session-expired";
pub const CODE_INVALID_CREDENTIALS: &str = "invalid-credentials";

/// Pool error taxonomy
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// Malformed input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing, invalid or revoked credential
    #[error("Unauthorized ({code}): {message}")]
    Unauthorized { code: &'static str, message: String },

    /// Valid credential without the required capability
    #[error("Forbidden ({code}): {message}")]
    Forbidden { code: &'static str, message: String },

    /// Unknown resource, or one owned by another business
    #[error("Not found ({code}): {message}")]
    NotFound { code: &'static str, message: String },

    /// Illegal state transition
    #[error("Conflict ({code}): {message}")]
    Conflict { code: &'static str, message: String },

    /// Refund rejected by business rules
    #[error("Refund failed: {0}")]
    RefundFailed(String),

    /// Abuse mitigation kicked in
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Store or other internal failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PoolError {
    /// The checkout session does not exist or belongs to someone else.
    ///
    /// Both cases share one error so ownership checks never leak existence.
    pub fn session_not_found() -> Self {
        Self::NotFound {
            code: CODE_SESSION_NOT_FOUND,
            message: "The checkout session was not found".into(),
        }
    }

    pub fn session_conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            code: CODE_SESSION_CONFLICT,
            message: message.into(),
        }
    }

    /// Payment page action after `when_expires`
    pub fn session_expired() -> Self {
        Self::Conflict {
            code: CODE_SESSION_EXPIRED,
            message: "Checkout session has expired".into(),
        }
    }

    /// Payment page action on a session that is no longer open
    pub fn session_not_open() -> Self {
        Self::Conflict {
            code: CODE_SESSION_NOT_OPEN,
            message: "Checkout session is not open".into(),
        }
    }

    pub fn unauthorized(code: &'static str, message: impl Into<String>) -> Self {
        Self::Unauthorized {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self::NotFound {
            code,
            message: message.into(),
        }
    }

    /// Stable wire code
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => CODE_VALIDATION,
            Self::Unauthorized { code, .. }
            | Self::Forbidden { code, .. }
            | Self::NotFound { code, .. }
            | Self::Conflict { code, .. } => code,
            Self::RefundFailed(_) => CODE_REFUND_FAILED,
            Self::RateLimited(_) => CODE_TOO_MANY_ATTEMPTS,
            Self::Internal(_) => CODE_INTERNAL,
        }
    }

    /// HTTP status this error maps to
    pub const fn status(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::RefundFailed(_) => 400,
            Self::Unauthorized { .. } => 401,
            Self::Forbidden { .. } => 403,
            Self::NotFound { .. } => 404,
            Self::Conflict { .. } => 409,
            Self::RateLimited(_) => 429,
            Self::Internal(_) => 500,
        }
    }

    /// Whether the caller can recover by retrying or re-reading state.
    ///
    /// State-machine conflicts and refund rejections are answers about the
    /// session, not failures of the service.
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Conflict { .. } | Self::RefundFailed(_) | Self::RateLimited(_)
        )
    }

    /// Human-readable message for the response body
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) | Self::RefundFailed(msg) | Self::RateLimited(msg) => msg.clone(),
            Self::Unauthorized { message, .. }
            | Self::Forbidden { message, .. }
            | Self::NotFound { message, .. }
            | Self::Conflict { message, .. } => message.clone(),
            Self::Internal(_) => "An internal error occurred. Please try again.".into(),
        }
    }
}

impl From<serde_json::Error> for PoolError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON error: {err}"))
    }
}

impl From<anyhow::Error> for PoolError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_shape() {
        let err = PoolError::session_not_found();
        assert_eq!(err.code(), "checkout-session-not-found");
        assert_eq!(err.status(), 404);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(PoolError::Validation("x".into()).status(), 400);
        assert_eq!(PoolError::RefundFailed("x".into()).status(), 400);
        assert_eq!(PoolError::RefundFailed("x".into()).code(), "checkout-refund-failed");
        assert_eq!(PoolError::session_conflict("x").status(), 409);
        assert_eq!(PoolError::session_conflict("x").code(), "checkout-session-conflict");
        assert_eq!(PoolError::Internal("db down".into()).status(), 500);
    }

    #[test]
    fn test_internal_message_hides_cause() {
        let err = PoolError::Internal("connection refused to 10.0.0.3".into());
        assert!(!err.user_message().contains("10.0.0.3"));
    }

    #[test]
    fn test_conflicts_are_recoverable() {
        assert!(PoolError::session_conflict("done").is_recoverable());
        assert!(!PoolError::Internal("x".into()).is_recoverable());
    }
}
