//! Authentication configuration

use chrono::Duration;
use tracing::warn;

pub const DEFAULT_API_SECRET: &str = "dev-secret-change-me";

#[derive(Clone, Debug)]
pub struct AuthConfig {
    /// Process-wide key for API-key hashing
    pub api_secret: String,

    /// Lifetime of a portal session token
    pub portal_session_ttl: Duration,

    /// Failed PIN attempts before a phone number is locked out
    pub max_login_attempts: u32,

    /// How long a lockout lasts
    pub lockout: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_secret: DEFAULT_API_SECRET.to_string(),
            portal_session_ttl: Duration::hours(24),
            max_login_attempts: 5,
            lockout: Duration::minutes(15),
        }
    }
}

impl AuthConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let api_secret = std::env::var("API_SECRET").unwrap_or_else(|_| {
            warn!("API_SECRET not set; using the development default");
            defaults.api_secret.clone()
        });

        let portal_session_ttl = std::env::var("PORTAL_SESSION_TTL_HOURS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map_or(defaults.portal_session_ttl, Duration::hours);

        Self {
            api_secret,
            portal_session_ttl,
            ..defaults
        }
    }
}
