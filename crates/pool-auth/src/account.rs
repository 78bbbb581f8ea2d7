//! Portal Accounts
//!
//! Phone + PIN login. The first successful login for a phone number signs
//! the user up and creates the single business they own.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use argon2::Argon2;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::{Rng, RngCore};
use regex::Regex;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use pool_core::error::CODE_INVALID_CREDENTIALS;
use pool_core::{Clock, PoolError, Result};

use crate::rate_limit::RateLimiter;
use crate::session_token::{PortalSession, SessionTokenService};

static SENEGAL_MOBILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\+221(70|71|75|76|77|78)\d{7}$").expect("SENEGAL_MOBILE_RE: invalid regex pattern")
});

static PIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}$").expect("PIN_RE: invalid regex pattern"));

const BUSINESS_COUNTRY: &str = "SN";
const BUSINESS_CURRENCY: &str = "XOF";

#[derive(Clone, Debug, Serialize)]
pub struct User {
    pub id: String,

    pub phone_number: String,

    #[serde(skip_serializing)]
    pub pin_hash: String,

    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Business {
    pub id: String,
    pub name: String,
    pub country: String,
    pub currency: String,
    #[serde(skip_serializing)]
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
}

/// Users and their businesses
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn insert_user(&self, user: User) -> Result<()>;

    async fn get_user(&self, id: &str) -> Result<Option<User>>;

    async fn find_user_by_phone(&self, phone_number: &str) -> Result<Option<User>>;

    async fn insert_business(&self, business: Business) -> Result<()>;

    async fn get_business(&self, id: &str) -> Result<Option<Business>>;

    async fn business_for_owner(&self, user_id: &str) -> Result<Option<Business>>;
}

#[derive(Default)]
struct AccountTables {
    users: HashMap<String, User>,
    by_phone: HashMap<String, String>,
    businesses: HashMap<String, Business>,
    by_owner: HashMap<String, String>,
}

/// In-memory account store
pub struct MemoryAccountStore {
    tables: RwLock<AccountTables>,
}

impl Default for MemoryAccountStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(AccountTables::default()),
        }
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn insert_user(&self, user: User) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.by_phone.contains_key(&user.phone_number) {
            return Err(PoolError::Conflict {
                code: "user-exists",
                message: "A user with this phone number already exists".into(),
            });
        }
        tables
            .by_phone
            .insert(user.phone_number.clone(), user.id.clone());
        tables.users.insert(user.id.clone(), user);
        Ok(())
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>> {
        Ok(self.tables.read().await.users.get(id).cloned())
    }

    async fn find_user_by_phone(&self, phone_number: &str) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_phone
            .get(phone_number)
            .and_then(|id| tables.users.get(id))
            .cloned())
    }

    async fn insert_business(&self, business: Business) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables
            .by_owner
            .insert(business.owner_id.clone(), business.id.clone());
        tables.businesses.insert(business.id.clone(), business);
        Ok(())
    }

    async fn get_business(&self, id: &str) -> Result<Option<Business>> {
        Ok(self.tables.read().await.businesses.get(id).cloned())
    }

    async fn business_for_owner(&self, user_id: &str) -> Result<Option<Business>> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_owner
            .get(user_id)
            .and_then(|id| tables.businesses.get(id))
            .cloned())
    }
}

/// Normalise a Senegalese mobile number to `+221XXXXXXXXX`
pub fn normalize_phone(raw: &str) -> Result<String> {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();

    let normalized = if let Some(rest) = compact.strip_prefix("00221") {
        format!("+221{rest}")
    } else if compact.starts_with("+221") {
        compact
    } else if let Some(rest) = compact.strip_prefix("221").filter(|r| r.len() == 9) {
        format!("+221{rest}")
    } else if compact.len() == 9 {
        format!("+221{compact}")
    } else {
        compact
    };

    if SENEGAL_MOBILE_RE.is_match(&normalized) {
        Ok(normalized)
    } else {
        Err(PoolError::Validation(
            "phone_number must be a Senegalese mobile number".into(),
        ))
    }
}

fn hash_pin(pin: &str) -> Result<String> {
    let mut salt_bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| PoolError::Internal(format!("salt encoding failed: {e}")))?;

    Argon2::default()
        .hash_password(pin.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PoolError::Internal(format!("PIN hashing failed: {e}")))
}

fn verify_pin(pin: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| PoolError::Internal(format!("stored PIN hash unreadable: {e}")))?;
    Ok(Argon2::default()
        .verify_password(pin.as_bytes(), &parsed)
        .is_ok())
}

fn business_name() -> String {
    const FIRST: [&str; 8] = [
        "Baobab", "Teranga", "Sahel", "Lac Rose", "Casamance", "Goree", "Saloum", "Ndar",
    ];
    const SECOND: [&str; 6] = ["Trading", "Crafts", "Foods", "Logistics", "Textiles", "Market"];

    let mut rng = rand::rng();
    format!(
        "{} {}",
        FIRST[rng.random_range(0..FIRST.len())],
        SECOND[rng.random_range(0..SECOND.len())]
    )
}

/// Result of a successful login
#[derive(Clone, Debug)]
pub struct LoginOutcome {
    pub user: User,
    pub business: Business,
    pub session: PortalSession,
    /// True when this login signed the user up
    pub created: bool,
}

pub struct AccountService {
    accounts: Arc<dyn AccountStore>,
    tokens: Arc<SessionTokenService>,
    limiter: Arc<dyn RateLimiter>,
    clock: Arc<dyn Clock>,
}

impl AccountService {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        tokens: Arc<SessionTokenService>,
        limiter: Arc<dyn RateLimiter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            accounts,
            tokens,
            limiter,
            clock,
        }
    }

    /// Log in, signing up on first contact
    pub async fn login(&self, phone_number: &str, pin: &str) -> Result<LoginOutcome> {
        let phone_number = normalize_phone(phone_number)?;
        if !PIN_RE.is_match(pin) {
            return Err(PoolError::Validation("pin must be exactly 4 digits".into()));
        }

        self.limiter.check(&phone_number)?;

        let (user, created) = match self.accounts.find_user_by_phone(&phone_number).await? {
            Some(user) => {
                if !verify_pin(pin, &user.pin_hash)? {
                    self.limiter.record_failure(&phone_number);
                    return Err(PoolError::unauthorized(
                        CODE_INVALID_CREDENTIALS,
                        "Invalid phone number or PIN",
                    ));
                }
                (user, false)
            }
            None => (self.sign_up(&phone_number, pin).await?, true),
        };
        self.limiter.reset(&phone_number);

        let business = self
            .accounts
            .business_for_owner(&user.id)
            .await?
            .ok_or_else(|| PoolError::Internal(format!("user {} has no business", user.id)))?;
        let session = self.tokens.issue(&user.id).await?;

        info!(user_id = %user.id, business_id = %business.id, created, "Portal login");
        Ok(LoginOutcome {
            user,
            business,
            session,
            created,
        })
    }

    /// The user and the business they own
    pub async fn profile(&self, user_id: &str) -> Result<(User, Business)> {
        let user = self
            .accounts
            .get_user(user_id)
            .await?
            .ok_or_else(|| PoolError::Internal(format!("user {user_id} vanished")))?;
        let business = self
            .accounts
            .business_for_owner(user_id)
            .await?
            .ok_or_else(|| PoolError::Internal(format!("user {user_id} has no business")))?;
        Ok((user, business))
    }

    async fn sign_up(&self, phone_number: &str, pin: &str) -> Result<User> {
        let now = self.clock.now();
        let user = User {
            id: format!("usr_{}", Uuid::new_v4().simple()),
            phone_number: phone_number.to_string(),
            pin_hash: hash_pin(pin)?,
            created_at: now,
        };
        let business = Business {
            id: format!("biz_{}", Uuid::new_v4().simple()),
            name: business_name(),
            country: BUSINESS_COUNTRY.to_string(),
            currency: BUSINESS_CURRENCY.to_string(),
            owner_id: user.id.clone(),
            created_at: now,
        };

        self.accounts.insert_user(user.clone()).await?;
        self.accounts.insert_business(business).await?;
        info!(user_id = %user.id, "New portal user signed up");
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::LockoutLimiter;
    use crate::session_token::MemorySessionTokenStore;
    use chrono::Duration;
    use pool_core::ManualClock;

    fn service() -> AccountService {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::default());
        let tokens = Arc::new(SessionTokenService::new(
            Arc::new(MemorySessionTokenStore::new()),
            clock.clone(),
            Duration::hours(24),
        ));
        AccountService::new(
            Arc::new(MemoryAccountStore::new()),
            tokens,
            Arc::new(LockoutLimiter::new(5, Duration::minutes(15), clock.clone())),
            clock,
        )
    }

    #[test]
    fn test_phone_normalization() {
        assert_eq!(normalize_phone("+221771234567").unwrap(), "+221771234567");
        assert_eq!(normalize_phone("00221771234567").unwrap(), "+221771234567");
        assert_eq!(normalize_phone("221 77 123 45 67").unwrap(), "+221771234567");
        assert_eq!(normalize_phone("77-123-45-67").unwrap(), "+221771234567");
        assert!(normalize_phone("+221331234567").is_err());
        assert!(normalize_phone("+33612345678").is_err());
    }

    #[test]
    fn test_pin_hash_roundtrip() {
        let hash = hash_pin("1234").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_pin("1234", &hash).unwrap());
        assert!(!verify_pin("4321", &hash).unwrap());
    }

    #[tokio::test]
    async fn test_first_login_signs_up() {
        let service = service();
        let first = service.login("771234567", "1234").await.unwrap();
        assert!(first.created);
        assert_eq!(first.user.phone_number, "+221771234567");
        assert_eq!(first.business.country, "SN");
        assert_eq!(first.business.currency, "XOF");

        let second = service.login("+221771234567", "1234").await.unwrap();
        assert!(!second.created);
        assert_eq!(second.user.id, first.user.id);
        assert_eq!(second.business.id, first.business.id);
        assert_ne!(second.session.token, first.session.token);
    }

    #[tokio::test]
    async fn test_wrong_pin_then_lockout() {
        let service = service();
        service.login("771234567", "1234").await.unwrap();

        for _ in 0..5 {
            let err = service.login("771234567", "0000").await.unwrap_err();
            assert_eq!(err.code(), "invalid-credentials");
        }
        let err = service.login("771234567", "1234").await.unwrap_err();
        assert_eq!(err.code(), "too-many-attempts");
    }

    #[tokio::test]
    async fn test_malformed_pin() {
        let service = service();
        let err = service.login("771234567", "12a4").await.unwrap_err();
        assert_eq!(err.status(), 400);
    }
}
