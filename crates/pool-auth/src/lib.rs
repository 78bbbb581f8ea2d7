//! # pool-auth
//!
//! Request authentication for wave-pool.
//!
//! ## Credential schemes
//!
//! ```text
//!  Authorization: Bearer wave-pool_prod_…          Authorization: Bearer <hex token>
//!                 │                                                │
//!                 ▼                                                ▼
//!        ┌─────────────────┐                             ┌───────────────────┐
//!        │ ApiKeyResolver  │  HMAC(API_SECRET, suffix)   │SessionTokenResolver│
//!        │  hash lookup    │                             │ token → user      │
//!        └────────┬────────┘                             └─────────┬─────────┘
//!                 └──────────────┐              ┌──────────────────┘
//!                                ▼              ▼
//!                         Identity { business_id, permissions }
//! ```
//!
//! [`AuthGate`] keeps the two schemes apart: a portal token is never accepted
//! where an API key is expected, and the other way round.

pub mod account;
pub mod api_key;
pub mod config;
pub mod gate;
pub mod rate_limit;
pub mod session_token;

pub use account::{AccountService, AccountStore, Business, LoginOutcome, MemoryAccountStore, User};
pub use api_key::{
    API_KEY_PREFIX, ApiKey, ApiKeyHasher, ApiKeyResolver, ApiKeyService, ApiKeyStore,
    IssuedApiKey, MemoryApiKeyStore,
};
pub use config::AuthConfig;
pub use gate::{AuthGate, bearer_token};
pub use rate_limit::{LockoutLimiter, RateLimiter};
pub use session_token::{
    MemorySessionTokenStore, PortalSession, SessionTokenResolver, SessionTokenService,
    SessionTokenStore,
};
