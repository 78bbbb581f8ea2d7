//! Server configuration

use std::time::Duration;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Listen address
    pub bind_addr: String,

    /// Interval of the overdue-session sweeper
    pub expiry_sweep: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            expiry_sweep: Duration::from_secs(60),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables.
    ///
    /// `BIND_ADDR` wins over `PORT`; `PORT` alone binds every interface.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let bind_addr = std::env::var("BIND_ADDR")
            .ok()
            .or_else(|| std::env::var("PORT").ok().map(|port| format!("0.0.0.0:{port}")))
            .unwrap_or(defaults.bind_addr);

        let expiry_sweep = std::env::var("EXPIRY_SWEEP_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|secs| *secs > 0)
            .map_or(defaults.expiry_sweep, Duration::from_secs);

        Self {
            bind_addr,
            expiry_sweep,
        }
    }
}
