//! Delivery Error Types

use thiserror::Error;

/// Why a webhook delivery did not land
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// Event could not be turned into a request body
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Endpoint secret unusable as an HMAC key
    #[error("Invalid signing key")]
    InvalidKey,

    /// Connection, TLS or protocol failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Endpoint did not answer within the configured bound
    #[error("Delivery timed out")]
    Timeout,

    /// Endpoint answered with a non-2xx status
    #[error("Endpoint rejected delivery with status {status}")]
    Rejected { status: u16 },

    /// Endpoint lookup failed
    #[error("Registry error: {0}")]
    Registry(String),
}

impl DeliveryError {
    /// Whether a retry could plausibly succeed. Informational only: deliveries
    /// are best-effort and never retried.
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout | Self::Registry(_) => true,
            Self::Rejected { status } => *status >= 500 || *status == 429,
            Self::Serialization(_) | Self::InvalidKey => false,
        }
    }
}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for DeliveryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Why an incoming `Wave-Signature` header was refused
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Malformed signature header")]
    Malformed,

    #[error("Signature does not match payload")]
    Mismatch,

    #[error("Signature timestamp outside tolerance")]
    Stale,

    #[error("Invalid signing key")]
    InvalidKey,
}
