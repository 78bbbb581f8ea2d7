//! Resolved caller identity
//!
//! Credential schemes differ, but every authenticated request ends up as an
//! [`Identity`]: the business it acts for plus what it may do. Nothing past the
//! authentication gate ever sees the raw credential.

use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{CODE_INSUFFICIENT_PERMISSIONS, PoolError, Result};

/// Capability granted to an API key
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    CheckoutApi,
    BalanceApi,
    WebhookApi,
}

impl Permission {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CheckoutApi => "CHECKOUT_API",
            Self::BalanceApi => "BALANCE_API",
            Self::WebhookApi => "WEBHOOK_API",
        }
    }
}

impl FromStr for Permission {
    type Err = PoolError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "CHECKOUT_API" => Ok(Self::CheckoutApi),
            "BALANCE_API" => Ok(Self::BalanceApi),
            "WEBHOOK_API" => Ok(Self::WebhookApi),
            other => Err(PoolError::Validation(format!("unknown permission: {other}"))),
        }
    }
}

/// Who is behind the request
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Principal {
    /// Portal user holding a session token
    User { user_id: String },

    /// Integration holding an API key
    ApiKey { key_id: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub principal: Principal,

    /// Authorization scope for every resource lookup
    pub business_id: String,

    pub business_name: String,

    /// Only meaningful for API keys; portal users act as the business owner
    pub permissions: Vec<Permission>,
}

impl Identity {
    pub fn user(
        user_id: impl Into<String>,
        business_id: impl Into<String>,
        business_name: impl Into<String>,
    ) -> Self {
        Self {
            principal: Principal::User {
                user_id: user_id.into(),
            },
            business_id: business_id.into(),
            business_name: business_name.into(),
            permissions: Vec::new(),
        }
    }

    pub fn api_key(
        key_id: impl Into<String>,
        business_id: impl Into<String>,
        business_name: impl Into<String>,
        permissions: Vec<Permission>,
    ) -> Self {
        Self {
            principal: Principal::ApiKey {
                key_id: key_id.into(),
            },
            business_id: business_id.into(),
            business_name: business_name.into(),
            permissions,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        match &self.principal {
            Principal::User { user_id } => Some(user_id),
            Principal::ApiKey { .. } => None,
        }
    }

    /// Fail with `Forbidden` unless this identity may use `permission`
    pub fn require(&self, permission: Permission) -> Result<()> {
        match self.principal {
            Principal::User { .. } => Ok(()),
            Principal::ApiKey { .. } if self.permissions.contains(&permission) => Ok(()),
            Principal::ApiKey { .. } => Err(PoolError::Forbidden {
                code: CODE_INSUFFICIENT_PERMISSIONS,
                message: format!("This API key lacks the {} permission", permission.as_str()),
            }),
        }
    }
}

/// Turns a presented bearer credential into an identity
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    /// Resolve `credential` or fail with `Unauthorized`
    async fn resolve(&self, credential: &str) -> Result<Identity>;

    /// Scheme name for logging
    fn scheme(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_scope_check() {
        let identity = Identity::api_key("key_1", "biz_a", "Shop", vec![Permission::BalanceApi]);
        let err = identity.require(Permission::CheckoutApi).unwrap_err();
        assert_eq!(err.status(), 403);
        assert_eq!(err.code(), "insufficient-permissions");
        assert!(identity.require(Permission::BalanceApi).is_ok());
    }

    #[test]
    fn test_portal_user_acts_as_owner() {
        let identity = Identity::user("usr_1", "biz_a", "Shop");
        assert!(identity.require(Permission::CheckoutApi).is_ok());
        assert_eq!(identity.user_id(), Some("usr_1"));
    }

    #[test]
    fn test_permission_wire_names() {
        let json = serde_json::to_string(&Permission::WebhookApi).unwrap();
        assert_eq!(json, "\"WEBHOOK_API\"");
        assert_eq!("CHECKOUT_API".parse::<Permission>().unwrap(), Permission::CheckoutApi);
        assert!("checkout_api".parse::<Permission>().is_err());
    }
}
