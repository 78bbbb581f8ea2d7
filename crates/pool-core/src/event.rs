//! Webhook events

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::error::{PoolError, Result};
use crate::session::CheckoutSession;

pub const EVENT_ID_PREFIX: &str = "EV_";

/// Event types a merchant endpoint can subscribe to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "checkout.session.completed")]
    CheckoutSessionCompleted,

    #[serde(rename = "checkout.session.payment_failed")]
    CheckoutSessionPaymentFailed,

    #[serde(rename = "webhook.test")]
    WebhookTest,
}

impl EventType {
    pub const ALL: [Self; 3] = [
        Self::CheckoutSessionCompleted,
        Self::CheckoutSessionPaymentFailed,
        Self::WebhookTest,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CheckoutSessionCompleted => "checkout.session.completed",
            Self::CheckoutSessionPaymentFailed => "checkout.session.payment_failed",
            Self::WebhookTest => "webhook.test",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = PoolError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|event_type| event_type.as_str() == s)
            .ok_or_else(|| PoolError::Validation(format!("unknown event type: {s}")))
    }
}

/// Payload POSTed to merchant endpoints
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Event {
    pub id: String,

    #[serde(rename = "type")]
    pub event_type: EventType,

    pub data: serde_json::Value,
}

impl Event {
    /// Event about a session; its id is derived from the session id, so a
    /// receiver sees the same id for every delivery of that session's outcome.
    pub fn for_session(event_type: EventType, session: &CheckoutSession) -> Result<Self> {
        Ok(Self {
            id: format!("{EVENT_ID_PREFIX}{}", session.id),
            event_type,
            data: serde_json::to_value(session)?,
        })
    }

    /// Connectivity check sent from the portal
    pub fn test(now: DateTime<Utc>) -> Self {
        Self {
            id: format!("{EVENT_ID_PREFIX}test_{}", Uuid::new_v4().simple()),
            event_type: EventType::WebhookTest,
            data: json!({
                "test_message": "This is a test webhook event from Wave Pool",
                "timestamp": now.to_rfc3339(),
            }),
        }
    }
}
