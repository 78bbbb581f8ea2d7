//! Authentication Gate
//!
//! The only code that reads credential material. Handlers get an
//! [`Identity`] or an `Unauthorized`/`Forbidden` error, never the token.

use std::sync::Arc;

use tracing::debug;

use pool_core::error::{CODE_INVALID_AUTH, CODE_MISSING_AUTH_HEADER};
use pool_core::{CredentialResolver, Identity, Permission, PoolError, Result};

/// Extract the token from an `Authorization: Bearer <token>` header value.
///
/// The token may be empty; each scheme reports that its own way.
pub fn bearer_token(header: Option<&str>) -> Result<&str> {
    let header = header.ok_or_else(|| {
        PoolError::unauthorized(CODE_MISSING_AUTH_HEADER, "Missing Authorization header")
    })?;

    let (scheme, token) = header.split_once(' ').unwrap_or((header, ""));
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(PoolError::unauthorized(
            CODE_INVALID_AUTH,
            "Authorization header must use the Bearer scheme",
        ));
    }
    Ok(token.trim())
}

/// Both credential schemes, kept apart
#[derive(Clone)]
pub struct AuthGate {
    api_keys: Arc<dyn CredentialResolver>,
    portal: Arc<dyn CredentialResolver>,
}

impl AuthGate {
    pub fn new(api_keys: Arc<dyn CredentialResolver>, portal: Arc<dyn CredentialResolver>) -> Self {
        Self { api_keys, portal }
    }

    /// Programmatic caller holding an API key with `permission`
    pub async fn api_caller(
        &self,
        authorization: Option<&str>,
        permission: Permission,
    ) -> Result<Identity> {
        let identity = self.resolve(&*self.api_keys, authorization).await?;
        identity.require(permission)?;
        Ok(identity)
    }

    /// First-party portal caller holding a session token
    pub async fn portal_caller(&self, authorization: Option<&str>) -> Result<Identity> {
        self.resolve(&*self.portal, authorization).await
    }

    async fn resolve(
        &self,
        resolver: &dyn CredentialResolver,
        authorization: Option<&str>,
    ) -> Result<Identity> {
        let token = bearer_token(authorization)?;
        let identity = resolver.resolve(token).await.inspect_err(|e| {
            debug!(scheme = resolver.scheme(), code = e.code(), "Authentication failed");
        })?;
        debug!(
            scheme = resolver.scheme(),
            business_id = %identity.business_id,
            "Authenticated"
        );
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Fixed(&'static str, Identity);

    #[async_trait]
    impl CredentialResolver for Fixed {
        async fn resolve(&self, credential: &str) -> Result<Identity> {
            if credential == self.0 {
                Ok(self.1.clone())
            } else {
                Err(PoolError::unauthorized("invalid", "nope"))
            }
        }

        fn scheme(&self) -> &'static str {
            "fixed"
        }
    }

    fn gate() -> AuthGate {
        AuthGate::new(
            Arc::new(Fixed(
                "wave-pool_prod_k",
                Identity::api_key("key", "biz_a", "Shop", vec![Permission::BalanceApi]),
            )),
            Arc::new(Fixed("portal-token", Identity::user("usr", "biz_a", "Shop"))),
        )
    }

    #[test]
    fn test_bearer_parsing() {
        assert_eq!(bearer_token(Some("Bearer abc")).unwrap(), "abc");
        assert_eq!(bearer_token(Some("bearer abc")).unwrap(), "abc");
        assert_eq!(bearer_token(Some("Bearer ")).unwrap(), "");
        assert_eq!(bearer_token(None).unwrap_err().code(), "missing-auth-header");
        assert_eq!(bearer_token(Some("Basic abc")).unwrap_err().code(), "invalid-auth");
    }

    #[tokio::test]
    async fn test_schemes_are_not_conflated() {
        let gate = gate();
        assert!(gate.portal_caller(Some("Bearer portal-token")).await.is_ok());
        assert!(gate.portal_caller(Some("Bearer wave-pool_prod_k")).await.is_err());
        assert!(
            gate.api_caller(Some("Bearer portal-token"), Permission::BalanceApi)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_scope_is_enforced() {
        let gate = gate();
        let err = gate
            .api_caller(Some("Bearer wave-pool_prod_k"), Permission::CheckoutApi)
            .await
            .unwrap_err();
        assert_eq!(err.status(), 403);
        assert!(
            gate.api_caller(Some("Bearer wave-pool_prod_k"), Permission::BalanceApi)
                .await
                .is_ok()
        );
    }
}
