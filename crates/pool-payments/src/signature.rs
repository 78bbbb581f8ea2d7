//! `Wave-Signature` header
//!
//! ```text
//! Wave-Signature: t=<unix seconds>,v1=<hex HMAC-SHA256(secret, "<t>.<raw body>")>
//! ```
//!
//! The MAC covers the exact bytes put on the wire.

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{DeliveryError, SignatureError};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "Wave-Signature";

fn mac_for(secret: &str, timestamp: i64, body: &[u8]) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    Some(mac)
}

/// Hex digest for `body` sent at `timestamp`
pub fn compute(secret: &str, timestamp: i64, body: &[u8]) -> Result<String, DeliveryError> {
    let mac = mac_for(secret, timestamp, body).ok_or(DeliveryError::InvalidKey)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Full header value
pub fn header_value(secret: &str, timestamp: i64, body: &[u8]) -> Result<String, DeliveryError> {
    Ok(format!("t={timestamp},v1={}", compute(secret, timestamp, body)?))
}

/// Check a received header against the raw body.
///
/// With a `tolerance`, timestamps further than that from `now` are refused.
pub fn verify(
    secret: &str,
    header: &str,
    body: &[u8],
    now: DateTime<Utc>,
    tolerance: Option<Duration>,
) -> Result<(), SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => {
                timestamp = Some(value.parse::<i64>().map_err(|_| SignatureError::Malformed)?);
            }
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    if signatures.is_empty() {
        return Err(SignatureError::Malformed);
    }

    if let Some(tolerance) = tolerance {
        let sent = DateTime::from_timestamp(timestamp, 0).ok_or(SignatureError::Malformed)?;
        if (now - sent).abs() > tolerance {
            return Err(SignatureError::Stale);
        }
    }

    for candidate in signatures {
        let Ok(expected) = hex::decode(candidate) else {
            continue;
        };
        let mac = mac_for(secret, timestamp, body).ok_or(SignatureError::InvalidKey)?;
        if mac.verify_slice(&expected).is_ok() {
            return Ok(());
        }
    }
    Err(SignatureError::Mismatch)
}
