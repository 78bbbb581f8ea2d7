//! Create-request parsing and format checks.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};
use url::Url;

use crate::error::{PoolError, Result};

static AMOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]+(\.[0-9]+)?$").expect("AMOUNT_RE: invalid regex pattern")
});

static CURRENCY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{3}$").expect("CURRENCY_RE: invalid regex pattern"));

static E164_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\+[1-9][0-9]{6,14}$").expect("E164_RE: invalid regex pattern")
});

pub const MAX_CLIENT_REFERENCE_LEN: usize = 255;

/// Body of `POST /v1/checkout/sessions`
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSessionRequest {
    /// Decimal numeral as a JSON string; JSON numbers are rejected
    #[serde(deserialize_with = "amount_string")]
    pub amount: String,

    pub currency: String,

    pub error_url: String,

    pub success_url: String,

    #[serde(default)]
    pub client_reference: Option<String>,

    #[serde(default, alias = "enforce_payer_mobile")]
    pub restrict_payer_mobile: Option<String>,

    #[serde(default)]
    pub aggregated_merchant_id: Option<String>,
}

impl CreateSessionRequest {
    /// Check every field, reporting the first problem found
    pub fn validate(&self) -> Result<()> {
        validate_amount(&self.amount)?;

        if !CURRENCY_RE.is_match(&self.currency) {
            return Err(PoolError::Validation(
                "currency must be a 3-letter uppercase code".into(),
            ));
        }

        validate_http_url("error_url", &self.error_url)?;
        validate_http_url("success_url", &self.success_url)?;

        if let Some(reference) = &self.client_reference {
            if reference.chars().count() > MAX_CLIENT_REFERENCE_LEN {
                return Err(PoolError::Validation(format!(
                    "client_reference must be at most {MAX_CLIENT_REFERENCE_LEN} characters"
                )));
            }
        }

        if let Some(mobile) = &self.restrict_payer_mobile {
            if !E164_RE.is_match(mobile) {
                return Err(PoolError::Validation(
                    "restrict_payer_mobile must be an E.164 phone number".into(),
                ));
            }
        }

        Ok(())
    }
}

/// Positive decimal numeral. The string itself is what gets stored.
pub fn validate_amount(amount: &str) -> Result<()> {
    if !AMOUNT_RE.is_match(amount) {
        return Err(PoolError::Validation(
            "amount must be a decimal number such as 1000 or 1000.50".into(),
        ));
    }
    let value: Decimal = amount
        .parse()
        .map_err(|_| PoolError::Validation("amount is out of range".into()))?;
    if value <= Decimal::ZERO {
        return Err(PoolError::Validation("amount must be greater than zero".into()));
    }
    Ok(())
}

/// Absolute `http`/`https` URL
pub fn validate_http_url(field: &str, raw: &str) -> Result<()> {
    let parsed =
        Url::parse(raw).map_err(|_| PoolError::Validation(format!("{field} must be an absolute URL")))?;
    match parsed.scheme() {
        "http" | "https" if parsed.has_host() => Ok(()),
        _ => Err(PoolError::Validation(format!(
            "{field} must use http or https"
        ))),
    }
}

struct AmountVisitor;

impl Visitor<'_> for AmountVisitor {
    type Value = String;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("amount as a decimal string such as \"1000.50\"")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> std::result::Result<String, E> {
        Ok(value.to_owned())
    }

    fn visit_string<E: de::Error>(self, value: String) -> std::result::Result<String, E> {
        Ok(value)
    }
}

// A JSON number has already lost its trailing zeros by the time it gets here.
fn amount_string<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    deserializer.deserialize_str(AmountVisitor)
}
