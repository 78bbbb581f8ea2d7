//! Checkout Session
//!
//! The session entity and the rules governing its two status dimensions.
//!
//! ```text
//! checkout_status:  open ──┬──▶ complete   (payment resolved)
//!                          └──▶ expired    (merchant expire / TTL)
//!
//! payment_status:   processing ──┬──▶ succeeded ──▶ cancelled (refund)
//!                                └──▶ failed
//! ```
//!
//! Transitions here are pure: they check the guard and mutate the value.
//! Persisting the result (and racing other writers) is the store's job.

use chrono::{DateTime, Duration, Utc};
use rand::{Rng, distr::Alphanumeric};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::error::{PoolError, Result};
use crate::identity::Identity;
use crate::validation::CreateSessionRequest;

pub const SESSION_ID_PREFIX: &str = "cos_";
pub const TRANSACTION_ID_PREFIX: &str = "T_";

/// Default session lifetime
pub const DEFAULT_SESSION_TTL_MINUTES: i64 = 30;

/// Checkout session identifier (`cos_<hex>`)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(format!("{SESSION_ID_PREFIX}{}", Uuid::new_v4().simple()))
    }

    /// Parse a caller-supplied id.
    ///
    /// A malformed id cannot name any session, so it is reported as not found.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.strip_prefix(SESSION_ID_PREFIX) {
            Some(rest) if !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric()) => {
                Ok(Self(raw.to_string()))
            }
            _ => Err(PoolError::session_not_found()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Wave transaction identifier.
///
/// Held without its `T_` prefix; the prefix only exists on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TransactionId(String);

impl TransactionId {
    pub fn generate() -> Self {
        let body: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(16)
            .map(|b| char::from(b).to_ascii_uppercase())
            .collect();
        Self(body)
    }

    /// Strip and validate the caller-facing prefix
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().strip_prefix(TRANSACTION_ID_PREFIX) {
            Some(rest) if !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric()) => {
                Ok(Self(rest.to_string()))
            }
            _ => Err(PoolError::Validation(
                "transaction_id is required and must start with T_".into(),
            )),
        }
    }

    /// Identifier without prefix (store key)
    pub fn bare(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{TRANSACTION_ID_PREFIX}{}", self.0)
    }
}

impl Serialize for TransactionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TransactionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Lifecycle of the session as a UI flow
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckoutStatus {
    Open,
    Complete,
    Expired,
}

impl CheckoutStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Complete => "complete",
            Self::Expired => "expired",
        }
    }
}

/// Outcome of the underlying payment attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Processing,
    Succeeded,
    Failed,
    Cancelled,
}

impl PaymentStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Both status dimensions, used as the guard for conditional updates
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StatusPair {
    pub checkout: CheckoutStatus,
    pub payment: PaymentStatus,
}

/// Error recorded after a failed payment attempt
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastPaymentError {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl LastPaymentError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn insufficient_funds() -> Self {
        Self::new(
            "insufficient-funds",
            "The user did not have enough account balance.",
        )
    }

    pub fn blocked_account() -> Self {
        Self::new(
            "blocked-account",
            "The customer used a blocked account to try and pay for the checkout.",
        )
    }

    pub fn payment_failure() -> Self {
        Self::new(
            "payment-failure",
            "A technical error has occurred in Wave's system.",
        )
    }

    pub fn payer_mobile_mismatch() -> Self {
        Self::new(
            "payer-mobile-mismatch",
            "The paying account does not match the mobile number required by the merchant.",
        )
    }

    /// One of the simulator's realistic failures, picked at random
    pub fn simulated() -> Self {
        match rand::rng().random_range(0..3) {
            0 => Self::insufficient_funds(),
            1 => Self::blocked_account(),
            _ => Self::payment_failure(),
        }
    }
}

/// Whether a transition changed anything
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Applied,
    Unchanged,
}

/// A single payment request with a bounded lifetime
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: SessionId,

    /// Decimal string, carried verbatim
    pub amount: String,

    pub checkout_status: CheckoutStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_reference: Option<String>,

    pub currency: String,

    pub error_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_payment_error: Option<LastPaymentError>,

    pub business_name: String,

    pub payment_status: PaymentStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<TransactionId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregated_merchant_id: Option<String>,

    pub success_url: String,

    pub wave_launch_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when_completed: Option<DateTime<Utc>>,

    pub when_created: DateTime<Utc>,

    pub when_expires: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when_refunded: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restrict_payer_mobile: Option<String>,

    /// Owner; never leaves the service
    #[serde(skip_serializing, default)]
    pub business_id: String,
}

impl CheckoutSession {
    /// Open a new session from an already validated request
    pub fn open(
        request: CreateSessionRequest,
        owner: &Identity,
        launch_base_url: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        let id = SessionId::generate();
        let wave_launch_url = format!("{}/c/{}", launch_base_url.trim_end_matches('/'), id);

        Self {
            id,
            amount: request.amount,
            checkout_status: CheckoutStatus::Open,
            client_reference: request.client_reference,
            currency: request.currency,
            error_url: request.error_url,
            last_payment_error: None,
            business_name: owner.business_name.clone(),
            payment_status: PaymentStatus::Processing,
            transaction_id: None,
            aggregated_merchant_id: request.aggregated_merchant_id,
            success_url: request.success_url,
            wave_launch_url,
            when_completed: None,
            when_created: now,
            when_expires: now + ttl,
            when_refunded: None,
            restrict_payer_mobile: request.restrict_payer_mobile,
            business_id: owner.business_id.clone(),
        }
    }

    pub const fn status(&self) -> StatusPair {
        StatusPair {
            checkout: self.checkout_status,
            payment: self.payment_status,
        }
    }

    pub fn is_owned_by(&self, business_id: &str) -> bool {
        self.business_id == business_id
    }

    /// Still open but past its expiry time
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.checkout_status == CheckoutStatus::Open && now >= self.when_expires
    }

    /// Guard for the payment page: the session must be open and in time
    pub fn ensure_payable(&self, now: DateTime<Utc>) -> Result<()> {
        match self.checkout_status {
            CheckoutStatus::Expired => Err(PoolError::session_expired()),
            CheckoutStatus::Complete => Err(PoolError::session_not_open()),
            CheckoutStatus::Open if now >= self.when_expires => Err(PoolError::session_expired()),
            CheckoutStatus::Open => Ok(()),
        }
    }

    /// Record a successful payment; completes the checkout
    pub fn succeed(&mut self, transaction_id: TransactionId, now: DateTime<Utc>) -> Result<()> {
        self.ensure_payable(now)?;
        self.payment_status = PaymentStatus::Succeeded;
        self.checkout_status = CheckoutStatus::Complete;
        self.transaction_id = Some(transaction_id);
        self.last_payment_error = None;
        self.when_completed = Some(now);
        Ok(())
    }

    /// Record a failed payment; completes the checkout
    pub fn fail(&mut self, error: LastPaymentError, now: DateTime<Utc>) -> Result<()> {
        self.ensure_payable(now)?;
        self.payment_status = PaymentStatus::Failed;
        self.checkout_status = CheckoutStatus::Complete;
        self.last_payment_error = Some(error);
        self.when_completed = Some(now);
        Ok(())
    }

    /// Expire an open session. Expiring twice is a no-op; expiring a
    /// completed session is a conflict.
    pub fn expire(&mut self, now: DateTime<Utc>) -> Result<Transition> {
        match self.checkout_status {
            CheckoutStatus::Expired => Ok(Transition::Unchanged),
            CheckoutStatus::Complete => Err(PoolError::session_conflict(
                "The checkout session has already been completed",
            )),
            CheckoutStatus::Open => {
                self.checkout_status = CheckoutStatus::Expired;
                self.when_completed = Some(now);
                Ok(Transition::Applied)
            }
        }
    }

    /// Refund a succeeded payment. Refunding twice is a no-op.
    pub fn refund(&mut self, now: DateTime<Utc>) -> Result<Transition> {
        match self.payment_status {
            PaymentStatus::Cancelled => Ok(Transition::Unchanged),
            PaymentStatus::Succeeded => {
                self.payment_status = PaymentStatus::Cancelled;
                self.when_refunded = Some(now);
                Ok(Transition::Applied)
            }
            PaymentStatus::Processing | PaymentStatus::Failed => Err(PoolError::RefundFailed(
                "Can only refund payments that have succeeded".into(),
            )),
        }
    }

    /// Whether `payer_mobile` may pay this session
    pub fn accepts_payer(&self, payer_mobile: Option<&str>) -> bool {
        match (self.restrict_payer_mobile.as_deref(), payer_mobile) {
            (Some(required), Some(payer)) => required == payer,
            _ => true,
        }
    }
}
