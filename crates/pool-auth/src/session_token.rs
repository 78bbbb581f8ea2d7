//! Portal session tokens

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use tokio::sync::RwLock;
use tracing::{debug, info};

use pool_core::error::{CODE_INVALID_SESSION_TOKEN, CODE_SESSION_TOKEN_EXPIRED};
use pool_core::{Clock, CredentialResolver, Identity, PoolError, Result};

use crate::account::AccountStore;

/// An issued portal session
#[derive(Clone, Debug)]
pub struct PortalSession {
    pub token: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PortalSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[async_trait]
pub trait SessionTokenStore: Send + Sync {
    async fn insert(&self, session: PortalSession) -> Result<()>;

    async fn get(&self, token: &str) -> Result<Option<PortalSession>>;

    async fn remove(&self, token: &str) -> Result<()>;

    /// Drop every session expired at `now`, returning how many went
    async fn prune_expired(&self, now: DateTime<Utc>) -> Result<usize>;
}

/// In-memory token store
pub struct MemorySessionTokenStore {
    sessions: RwLock<HashMap<String, PortalSession>>,
}

impl Default for MemorySessionTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySessionTokenStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl SessionTokenStore for MemorySessionTokenStore {
    async fn insert(&self, session: PortalSession) -> Result<()> {
        self.sessions
            .write()
            .await
            .insert(session.token.clone(), session);
        Ok(())
    }

    async fn get(&self, token: &str) -> Result<Option<PortalSession>> {
        Ok(self.sessions.read().await.get(token).cloned())
    }

    async fn remove(&self, token: &str) -> Result<()> {
        self.sessions.write().await.remove(token);
        Ok(())
    }

    async fn prune_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(now));
        Ok(before - sessions.len())
    }
}

/// Issues and validates portal tokens
pub struct SessionTokenService {
    store: Arc<dyn SessionTokenStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl SessionTokenService {
    pub fn new(store: Arc<dyn SessionTokenStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self { store, clock, ttl }
    }

    pub async fn issue(&self, user_id: &str) -> Result<PortalSession> {
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);

        let now = self.clock.now();
        let session = PortalSession {
            token: hex::encode(bytes),
            user_id: user_id.to_string(),
            created_at: now,
            expires_at: now + self.ttl,
        };
        self.store.insert(session.clone()).await?;
        Ok(session)
    }

    /// Look up a token; unknown and expired tokens are `Unauthorized`
    pub async fn validate(&self, token: &str) -> Result<PortalSession> {
        let session = self.store.get(token).await?.ok_or_else(|| {
            PoolError::unauthorized(CODE_INVALID_SESSION_TOKEN, "Invalid session token")
        })?;

        if session.is_expired(self.clock.now()) {
            debug!(user_id = %session.user_id, "Portal session expired");
            self.store.remove(token).await?;
            return Err(PoolError::unauthorized(
                CODE_SESSION_TOKEN_EXPIRED,
                "Session has expired, please log in again",
            ));
        }
        Ok(session)
    }

    /// Log out; unknown tokens are ignored
    pub async fn revoke(&self, token: &str) -> Result<()> {
        self.store.remove(token).await
    }

    pub async fn prune_expired(&self) -> Result<usize> {
        let pruned = self.store.prune_expired(self.clock.now()).await?;
        if pruned > 0 {
            info!(pruned, "Pruned expired portal sessions");
        }
        Ok(pruned)
    }
}

/// Session-token scheme: token → user → owned business
pub struct SessionTokenResolver {
    tokens: Arc<SessionTokenService>,
    accounts: Arc<dyn AccountStore>,
}

impl SessionTokenResolver {
    pub fn new(tokens: Arc<SessionTokenService>, accounts: Arc<dyn AccountStore>) -> Self {
        Self { tokens, accounts }
    }
}

#[async_trait]
impl CredentialResolver for SessionTokenResolver {
    async fn resolve(&self, credential: &str) -> Result<Identity> {
        if credential.is_empty() {
            return Err(PoolError::unauthorized(
                CODE_INVALID_SESSION_TOKEN,
                "Invalid session token",
            ));
        }
        let session = self.tokens.validate(credential).await?;
        let business = self
            .accounts
            .business_for_owner(&session.user_id)
            .await?
            .ok_or_else(|| PoolError::Internal(format!("user {} has no business", session.user_id)))?;

        Ok(Identity::user(session.user_id, business.id, business.name))
    }

    fn scheme(&self) -> &'static str {
        "session-token"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pool_core::ManualClock;

    fn service() -> (SessionTokenService, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let service = SessionTokenService::new(
            Arc::new(MemorySessionTokenStore::new()),
            clock.clone(),
            Duration::hours(24),
        );
        (service, clock)
    }

    #[tokio::test]
    async fn test_issue_and_validate() {
        let (service, _) = service();
        let session = service.issue("usr_1").await.unwrap();
        assert_eq!(session.token.len(), 64);

        let validated = service.validate(&session.token).await.unwrap();
        assert_eq!(validated.user_id, "usr_1");
    }

    #[tokio::test]
    async fn test_unknown_token() {
        let (service, _) = service();
        let err = service.validate("nope").await.unwrap_err();
        assert_eq!(err.code(), "invalid-session-token");
        assert_eq!(err.status(), 401);
    }

    #[tokio::test]
    async fn test_expired_token_is_dropped() {
        let (service, clock) = service();
        let session = service.issue("usr_1").await.unwrap();
        clock.advance(Duration::hours(24));

        let err = service.validate(&session.token).await.unwrap_err();
        assert_eq!(err.code(), "session-expired");
        let err = service.validate(&session.token).await.unwrap_err();
        assert_eq!(err.code(), "invalid-session-token");
    }

    #[tokio::test]
    async fn test_revoked_token_is_invalid() {
        let (service, _) = service();
        let session = service.issue("usr_1").await.unwrap();
        let other = service.issue("usr_1").await.unwrap();

        service.revoke(&session.token).await.unwrap();
        let err = service.validate(&session.token).await.unwrap_err();
        assert_eq!(err.code(), "invalid-session-token");
        assert!(service.validate(&other.token).await.is_ok());

        service.revoke(&session.token).await.unwrap();
    }

    #[tokio::test]
    async fn test_prune_drops_only_expired() {
        let (service, clock) = service();
        let old = service.issue("usr_1").await.unwrap();
        clock.advance(Duration::hours(12));
        let fresh = service.issue("usr_2").await.unwrap();
        clock.advance(Duration::hours(12));

        assert_eq!(service.prune_expired().await.unwrap(), 1);
        assert_eq!(service.prune_expired().await.unwrap(), 0);
        assert_eq!(
            service.validate(&old.token).await.unwrap_err().code(),
            "invalid-session-token"
        );
        assert_eq!(service.validate(&fresh.token).await.unwrap().user_id, "usr_2");
    }
}
