//! API Keys
//!
//! Keys look like `wave-pool_prod_<64 hex>`. Only an HMAC of the part after
//! the prefix is stored, keyed with the process-wide secret, so a presented
//! key can be found with a single hash lookup.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::Serialize;
use sha2::Sha256;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use pool_core::error::{
    CODE_API_KEY_NOT_FOUND, CODE_API_KEY_NOT_PROVIDED, CODE_API_KEY_REVOKED,
    CODE_INVALID_API_KEY_PREFIX, CODE_NO_MATCHING_API_KEY,
};
use pool_core::{Clock, CredentialResolver, Identity, Permission, PoolError, Result};

use crate::account::AccountStore;

type HmacSha256 = Hmac<Sha256>;

pub const API_KEY_PREFIX: &str = "wave-pool_prod_";

/// Stored key metadata
#[derive(Clone, Debug, Serialize)]
pub struct ApiKey {
    pub id: String,

    #[serde(skip_serializing)]
    pub business_id: String,

    #[serde(skip_serializing)]
    pub key_hash: String,

    /// Last characters of the key, for recognising it in the portal
    pub display_hint: String,

    pub permissions: Vec<Permission>,

    pub created_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
}

impl ApiKey {
    pub const fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }
}

/// A freshly issued key; the plaintext exists only here
#[derive(Debug)]
pub struct IssuedApiKey {
    pub key: ApiKey,
    pub plaintext: String,
}

#[async_trait]
pub trait ApiKeyStore: Send + Sync {
    async fn insert(&self, key: ApiKey) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Option<ApiKey>>;

    async fn find_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>>;

    async fn list_by_business(&self, business_id: &str) -> Result<Vec<ApiKey>>;

    async fn update(&self, key: ApiKey) -> Result<()>;
}

#[derive(Default)]
struct KeyTables {
    by_id: HashMap<String, ApiKey>,
    by_hash: HashMap<String, String>,
}

/// In-memory API key store
pub struct MemoryApiKeyStore {
    tables: RwLock<KeyTables>,
}

impl Default for MemoryApiKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryApiKeyStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(KeyTables::default()),
        }
    }
}

#[async_trait]
impl ApiKeyStore for MemoryApiKeyStore {
    async fn insert(&self, key: ApiKey) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.by_hash.insert(key.key_hash.clone(), key.id.clone());
        tables.by_id.insert(key.id.clone(), key);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<ApiKey>> {
        Ok(self.tables.read().await.by_id.get(id).cloned())
    }

    async fn find_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_hash
            .get(key_hash)
            .and_then(|id| tables.by_id.get(id))
            .cloned())
    }

    async fn list_by_business(&self, business_id: &str) -> Result<Vec<ApiKey>> {
        let tables = self.tables.read().await;
        let mut keys: Vec<_> = tables
            .by_id
            .values()
            .filter(|k| k.business_id == business_id)
            .cloned()
            .collect();
        keys.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(keys)
    }

    async fn update(&self, key: ApiKey) -> Result<()> {
        let mut tables = self.tables.write().await;
        match tables.by_id.get_mut(&key.id) {
            Some(slot) => {
                *slot = key;
                Ok(())
            }
            None => Err(api_key_not_found()),
        }
    }
}

/// Deterministic keyed hash of the key suffix
#[derive(Clone)]
pub struct ApiKeyHasher {
    secret: String,
}

impl ApiKeyHasher {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn hash(&self, key_suffix: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| PoolError::Internal(format!("Failed to create HMAC: {e}")))?;
        mac.update(key_suffix.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

fn api_key_not_found() -> PoolError {
    PoolError::not_found(CODE_API_KEY_NOT_FOUND, "The API key was not found")
}

/// Issue, list and revoke keys for a business
pub struct ApiKeyService {
    store: Arc<dyn ApiKeyStore>,
    hasher: ApiKeyHasher,
    clock: Arc<dyn Clock>,
}

impl ApiKeyService {
    pub fn new(store: Arc<dyn ApiKeyStore>, hasher: ApiKeyHasher, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            hasher,
            clock,
        }
    }

    pub async fn issue(
        &self,
        business_id: &str,
        permissions: Vec<Permission>,
    ) -> Result<IssuedApiKey> {
        if permissions.is_empty() {
            return Err(PoolError::Validation(
                "at least one permission is required".into(),
            ));
        }
        let permissions = permissions.into_iter().fold(Vec::new(), |mut unique, p| {
            if !unique.contains(&p) {
                unique.push(p);
            }
            unique
        });

        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        let suffix = hex::encode(bytes);
        let plaintext = format!("{API_KEY_PREFIX}{suffix}");

        let key = ApiKey {
            id: format!("sk_{}", Uuid::new_v4().simple()),
            business_id: business_id.to_string(),
            key_hash: self.hasher.hash(&suffix)?,
            display_hint: suffix[suffix.len() - 4..].to_string(),
            permissions,
            created_at: self.clock.now(),
            revoked_at: None,
        };
        self.store.insert(key.clone()).await?;

        info!(key_id = %key.id, business_id, "API key issued");
        Ok(IssuedApiKey { key, plaintext })
    }

    pub async fn list(&self, business_id: &str) -> Result<Vec<ApiKey>> {
        self.store.list_by_business(business_id).await
    }

    /// Revoke a key. Keys of other businesses are reported as not found.
    pub async fn revoke(&self, business_id: &str, key_id: &str) -> Result<ApiKey> {
        let mut key = self
            .store
            .get(key_id)
            .await?
            .filter(|k| k.business_id == business_id)
            .ok_or_else(api_key_not_found)?;

        if key.is_revoked() {
            return Err(PoolError::Conflict {
                code: CODE_API_KEY_REVOKED,
                message: "The API key is already revoked".into(),
            });
        }

        key.revoked_at = Some(self.clock.now());
        self.store.update(key.clone()).await?;
        info!(key_id = %key.id, business_id, "API key revoked");
        Ok(key)
    }
}

/// API-key scheme
pub struct ApiKeyResolver {
    store: Arc<dyn ApiKeyStore>,
    accounts: Arc<dyn AccountStore>,
    hasher: ApiKeyHasher,
}

impl ApiKeyResolver {
    pub fn new(
        store: Arc<dyn ApiKeyStore>,
        accounts: Arc<dyn AccountStore>,
        hasher: ApiKeyHasher,
    ) -> Self {
        Self {
            store,
            accounts,
            hasher,
        }
    }
}

#[async_trait]
impl CredentialResolver for ApiKeyResolver {
    async fn resolve(&self, credential: &str) -> Result<Identity> {
        if credential.is_empty() {
            return Err(PoolError::unauthorized(
                CODE_API_KEY_NOT_PROVIDED,
                "No API key was provided",
            ));
        }

        let suffix = credential.strip_prefix(API_KEY_PREFIX).ok_or_else(|| {
            PoolError::unauthorized(
                CODE_INVALID_API_KEY_PREFIX,
                format!("API keys must start with {API_KEY_PREFIX}"),
            )
        })?;

        let hint = suffix
            .char_indices()
            .rev()
            .nth(3)
            .map_or(suffix, |(i, _)| &suffix[i..]);
        let key = self
            .store
            .find_by_hash(&self.hasher.hash(suffix)?)
            .await?
            .ok_or_else(|| {
                debug!(hint, "Unknown API key presented");
                PoolError::unauthorized(
                    CODE_NO_MATCHING_API_KEY,
                    format!("No API key matches the one ending in {hint}"),
                )
            })?;

        if key.is_revoked() {
            return Err(PoolError::unauthorized(
                CODE_API_KEY_REVOKED,
                format!("The API key ending in {hint} has been revoked"),
            ));
        }

        let business = self
            .accounts
            .get_business(&key.business_id)
            .await?
            .ok_or_else(|| PoolError::Internal(format!("business {} missing", key.business_id)))?;

        Ok(Identity::api_key(
            key.id,
            business.id,
            business.name,
            key.permissions,
        ))
    }

    fn scheme(&self) -> &'static str {
        "api-key"
    }
}
