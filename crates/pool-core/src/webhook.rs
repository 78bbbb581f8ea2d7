//! Merchant webhook endpoints

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::EventType;

/// How deliveries to an endpoint are authenticated
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningStrategy {
    /// `Authorization: Bearer <secret>`
    #[serde(alias = "SHARED_SECRET")]
    SharedSecret,

    /// `Wave-Signature: t=<unix>,v1=<hmac>`
    #[default]
    #[serde(alias = "SIGNING_SECRET")]
    SigningSecret,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookStatus {
    #[default]
    #[serde(alias = "ACTIVE")]
    Active,

    #[serde(alias = "REVOKED")]
    Revoked,
}

/// A merchant-owned delivery target
#[derive(Clone, Debug, Serialize)]
pub struct WebhookEndpoint {
    pub id: String,

    #[serde(skip_serializing)]
    pub business_id: String,

    pub url: String,

    pub signing_strategy: SigningStrategy,

    /// Credential material; only shown to the merchant once, at creation
    #[serde(skip_serializing)]
    pub secret: String,

    /// Empty means every event
    pub event_types: Vec<EventType>,

    pub status: WebhookStatus,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl WebhookEndpoint {
    pub fn new(
        business_id: impl Into<String>,
        url: impl Into<String>,
        signing_strategy: SigningStrategy,
        secret: impl Into<String>,
        event_types: Vec<EventType>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: format!("wh_{}", Uuid::new_v4().simple()),
            business_id: business_id.into(),
            url: url.into(),
            signing_strategy,
            secret: secret.into(),
            event_types,
            status: WebhookStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == WebhookStatus::Active
    }

    /// Whether this endpoint should receive `event_type`
    pub fn accepts(&self, event_type: EventType) -> bool {
        self.is_active() && (self.event_types.is_empty() || self.event_types.contains(&event_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(event_types: Vec<EventType>) -> WebhookEndpoint {
        WebhookEndpoint::new(
            "biz_a",
            "https://merchant.example/hooks",
            SigningStrategy::default(),
            "wave-pool_whs_abc",
            event_types,
            Utc::now(),
        )
    }

    #[test]
    fn test_empty_filter_accepts_everything() {
        let endpoint = endpoint(vec![]);
        for event_type in EventType::ALL {
            assert!(endpoint.accepts(event_type));
        }
    }

    #[test]
    fn test_filter_and_revocation() {
        let mut endpoint = endpoint(vec![EventType::CheckoutSessionCompleted]);
        assert!(endpoint.accepts(EventType::CheckoutSessionCompleted));
        assert!(!endpoint.accepts(EventType::CheckoutSessionPaymentFailed));

        endpoint.status = WebhookStatus::Revoked;
        assert!(!endpoint.accepts(EventType::CheckoutSessionCompleted));
    }

    #[test]
    fn test_strategy_spellings() {
        let upper: SigningStrategy = serde_json::from_str("\"SHARED_SECRET\"").unwrap();
        let lower: SigningStrategy = serde_json::from_str("\"shared_secret\"").unwrap();
        assert_eq!(upper, lower);
        assert_eq!(SigningStrategy::default(), SigningStrategy::SigningSecret);
    }

    #[test]
    fn test_secret_never_serialized() {
        let json = serde_json::to_value(endpoint(vec![])).unwrap();
        assert!(json.get("secret").is_none());
        assert!(json.get("business_id").is_none());
        assert_eq!(json["signing_strategy"], "signing_secret");
    }
}
