//! Webhook Dispatch
//!
//! Best-effort fan-out of events to every active endpoint of a business.
//!
//! ```text
//!                          ┌──▶ task ──POST──▶ endpoint A
//! publish(event) ──▶ task ─┼──▶ task ──POST──▶ endpoint B
//!                          └──▶ task ──POST──▶ endpoint C
//! ```
//!
//! Each delivery runs in its own task with its own timeout. Failures are
//! logged and dropped; nothing is retried or persisted.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use reqwest::header::CONTENT_TYPE;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use pool_core::{
    CheckoutSession, Clock, Event, EventType, SigningStrategy, WebhookEndpoint, WebhookRegistry,
};

use crate::checkout::EventPublisher;
use crate::error::DeliveryError;
use crate::signature::{self, SIGNATURE_HEADER};

/// Dispatcher configuration
#[derive(Clone, Debug)]
pub struct DispatcherConfig {
    /// Upper bound on a single POST
    pub timeout: Duration,

    pub user_agent: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            user_agent: format!("wave-pool-webhooks/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl DispatcherConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            timeout: std::env::var("WEBHOOK_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map_or(defaults.timeout, Duration::from_secs),
            ..defaults
        }
    }
}

/// Outcome of one delivery attempt
#[derive(Debug)]
pub struct DeliveryReport {
    pub endpoint_id: String,
    pub event_id: String,
    /// Response status on success
    pub outcome: Result<u16, DeliveryError>,
}

impl DeliveryReport {
    pub const fn is_delivered(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Signs and POSTs events to merchant endpoints
#[derive(Clone)]
pub struct WebhookDispatcher {
    registry: Arc<dyn WebhookRegistry>,
    clock: Arc<dyn Clock>,
    client: reqwest::Client,
}

impl WebhookDispatcher {
    pub fn new(
        registry: Arc<dyn WebhookRegistry>,
        clock: Arc<dyn Clock>,
        config: &DispatcherConfig,
    ) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            registry,
            clock,
            client,
        })
    }

    /// Deliver `event` to every active endpoint of `business_id` that
    /// subscribes to it, concurrently, and wait for all outcomes.
    pub async fn dispatch(
        &self,
        event: Event,
        business_id: &str,
    ) -> Result<Vec<DeliveryReport>, DeliveryError> {
        let endpoints = self
            .registry
            .list_active(business_id)
            .await
            .map_err(|e| DeliveryError::Registry(e.to_string()))?;

        let handles: Vec<JoinHandle<DeliveryReport>> = endpoints
            .into_iter()
            .filter(|endpoint| endpoint.accepts(event.event_type))
            .map(|endpoint| {
                let dispatcher = self.clone();
                let event = event.clone();
                tokio::spawn(async move { dispatcher.deliver(&endpoint, &event).await })
            })
            .collect();

        debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            business_id,
            endpoints = handles.len(),
            "Dispatching webhook event"
        );

        Ok(join_all(handles)
            .await
            .into_iter()
            .filter_map(|joined| {
                joined
                    .map_err(|e| error!(error = %e, "Webhook delivery task panicked"))
                    .ok()
            })
            .collect())
    }

    /// Send a `webhook.test` event to one endpoint in the background
    pub fn send_test(&self, endpoint: WebhookEndpoint) -> JoinHandle<DeliveryReport> {
        let dispatcher = self.clone();
        let event = Event::test(self.clock.now());
        tokio::spawn(async move { dispatcher.deliver(&endpoint, &event).await })
    }

    /// One delivery, logged
    pub async fn deliver(&self, endpoint: &WebhookEndpoint, event: &Event) -> DeliveryReport {
        let outcome = self.try_deliver(endpoint, event).await;

        match &outcome {
            Ok(status) => info!(
                endpoint_id = %endpoint.id,
                event_id = %event.id,
                event_type = %event.event_type,
                status,
                "Webhook delivered"
            ),
            Err(e) => warn!(
                endpoint_id = %endpoint.id,
                event_id = %event.id,
                event_type = %event.event_type,
                error = %e,
                retryable = e.is_retryable(),
                "Webhook delivery failed"
            ),
        }

        DeliveryReport {
            endpoint_id: endpoint.id.clone(),
            event_id: event.id.clone(),
            outcome,
        }
    }

    async fn try_deliver(
        &self,
        endpoint: &WebhookEndpoint,
        event: &Event,
    ) -> Result<u16, DeliveryError> {
        // Serialized once; the signature covers exactly these bytes.
        let body = serde_json::to_vec(event)?;

        let request = self
            .client
            .post(&endpoint.url)
            .header(CONTENT_TYPE, "application/json");

        let request = match endpoint.signing_strategy {
            SigningStrategy::SharedSecret => request.bearer_auth(&endpoint.secret),
            SigningStrategy::SigningSecret => {
                let timestamp = self.clock.now().timestamp();
                request.header(
                    SIGNATURE_HEADER,
                    signature::header_value(&endpoint.secret, timestamp, &body)?,
                )
            }
        };

        let response = request.body(body).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(status.as_u16())
        } else {
            Err(DeliveryError::Rejected {
                status: status.as_u16(),
            })
        }
    }
}

impl EventPublisher for WebhookDispatcher {
    fn publish(&self, event_type: EventType, session: &CheckoutSession) {
        let event = match Event::for_session(event_type, session) {
            Ok(event) => event,
            Err(e) => {
                error!(session_id = %session.id, error = %e, "Failed to build webhook event");
                return;
            }
        };

        let dispatcher = self.clone();
        let business_id = session.business_id.clone();
        tokio::spawn(async move {
            if let Err(e) = dispatcher.dispatch(event, &business_id).await {
                warn!(business_id = %business_id, error = %e, "Webhook dispatch aborted");
            }
        });
    }
}
