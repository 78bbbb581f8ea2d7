//! Merchant-managed webhook endpoints

use std::sync::Arc;

use rand::RngCore;
use serde::Deserialize;
use tracing::info;

use pool_core::error::{CODE_WEBHOOK_NOT_FOUND, CODE_WEBHOOK_REVOKED};
use pool_core::validation::validate_http_url;
use pool_core::{
    Clock, EventType, PoolError, Result, SigningStrategy, WebhookEndpoint, WebhookRegistry,
    WebhookStatus,
};

use crate::webhook::WebhookDispatcher;

pub const WEBHOOK_SECRET_PREFIX: &str = "wave-pool_whs_";

/// Body of `POST /v1/webhooks`
#[derive(Clone, Debug, Deserialize)]
pub struct NewWebhook {
    pub url: String,

    /// Empty subscribes to every event
    #[serde(default)]
    pub event_types: Vec<EventType>,

    #[serde(default, rename = "security_strategy", alias = "signing_strategy")]
    pub signing_strategy: SigningStrategy,
}

/// Body of `PUT /v1/webhooks/{id}`; absent fields stay as they are
#[derive(Clone, Debug, Default, Deserialize)]
pub struct WebhookUpdate {
    pub url: Option<String>,

    pub event_types: Option<Vec<EventType>>,

    #[serde(rename = "security_strategy", alias = "signing_strategy")]
    pub signing_strategy: Option<SigningStrategy>,

    pub status: Option<WebhookStatus>,
}

fn webhook_not_found() -> PoolError {
    PoolError::not_found(CODE_WEBHOOK_NOT_FOUND, "The webhook was not found")
}

fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    format!("{WEBHOOK_SECRET_PREFIX}{}", hex::encode(bytes))
}

pub struct WebhookEndpointService {
    registry: Arc<dyn WebhookRegistry>,
    dispatcher: WebhookDispatcher,
    clock: Arc<dyn Clock>,
}

impl WebhookEndpointService {
    pub fn new(
        registry: Arc<dyn WebhookRegistry>,
        dispatcher: WebhookDispatcher,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            clock,
        }
    }

    /// Register an endpoint. The returned value carries the secret, which is
    /// never readable again afterwards.
    pub async fn register(&self, business_id: &str, request: NewWebhook) -> Result<WebhookEndpoint> {
        validate_http_url("url", &request.url)?;

        let endpoint = WebhookEndpoint::new(
            business_id,
            request.url,
            request.signing_strategy,
            generate_secret(),
            request.event_types,
            self.clock.now(),
        );
        self.registry.insert(endpoint.clone()).await?;

        info!(webhook_id = %endpoint.id, business_id, url = %endpoint.url, "Webhook registered");
        Ok(endpoint)
    }

    pub async fn list(&self, business_id: &str) -> Result<Vec<WebhookEndpoint>> {
        self.registry.list_by_business(business_id).await
    }

    pub async fn get(&self, business_id: &str, id: &str) -> Result<WebhookEndpoint> {
        self.registry
            .get(id)
            .await?
            .filter(|e| e.business_id == business_id)
            .ok_or_else(webhook_not_found)
    }

    pub async fn update(
        &self,
        business_id: &str,
        id: &str,
        update: WebhookUpdate,
    ) -> Result<WebhookEndpoint> {
        let mut endpoint = self.get(business_id, id).await?;

        if let Some(url) = update.url {
            validate_http_url("url", &url)?;
            endpoint.url = url;
        }
        if let Some(event_types) = update.event_types {
            endpoint.event_types = event_types;
        }
        if let Some(strategy) = update.signing_strategy {
            endpoint.signing_strategy = strategy;
        }
        if let Some(status) = update.status {
            endpoint.status = status;
        }
        endpoint.updated_at = self.clock.now();

        self.registry.update(endpoint.clone()).await?;
        info!(webhook_id = %endpoint.id, business_id, "Webhook updated");
        Ok(endpoint)
    }

    /// Soft revoke; revoking twice is harmless
    pub async fn revoke(&self, business_id: &str, id: &str) -> Result<()> {
        let mut endpoint = self.get(business_id, id).await?;
        if endpoint.status == WebhookStatus::Revoked {
            return Ok(());
        }
        endpoint.status = WebhookStatus::Revoked;
        endpoint.updated_at = self.clock.now();
        self.registry.update(endpoint).await?;
        info!(webhook_id = id, business_id, "Webhook revoked");
        Ok(())
    }

    /// Queue a `webhook.test` delivery and return without waiting for it
    pub async fn send_test(&self, business_id: &str, id: &str) -> Result<()> {
        let endpoint = self.get(business_id, id).await?;
        if !endpoint.is_active() {
            return Err(PoolError::Conflict {
                code: CODE_WEBHOOK_REVOKED,
                message: "Revoked webhooks cannot receive test events".into(),
            });
        }
        // The delivery outcome is only logged.
        drop(self.dispatcher.send_test(endpoint));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhook::DispatcherConfig;
    use pool_core::{MemoryWebhookRegistry, SystemClock};

    fn service() -> WebhookEndpointService {
        let registry: Arc<dyn WebhookRegistry> = Arc::new(MemoryWebhookRegistry::new());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let dispatcher =
            WebhookDispatcher::new(registry.clone(), clock.clone(), &DispatcherConfig::default())
                .unwrap();
        WebhookEndpointService::new(registry, dispatcher, clock)
    }

    fn new_webhook(url: &str) -> NewWebhook {
        serde_json::from_value(serde_json::json!({ "url": url })).unwrap()
    }

    #[tokio::test]
    async fn test_register_defaults() {
        let service = service();
        let endpoint = service
            .register("biz_a", new_webhook("https://merchant.example/hooks"))
            .await
            .unwrap();

        assert!(endpoint.secret.starts_with(WEBHOOK_SECRET_PREFIX));
        assert_eq!(endpoint.secret.len(), WEBHOOK_SECRET_PREFIX.len() + 64);
        assert_eq!(endpoint.signing_strategy, SigningStrategy::SigningSecret);
        assert!(endpoint.event_types.is_empty());
        assert!(endpoint.is_active());
    }

    #[tokio::test]
    async fn test_register_rejects_relative_url() {
        let service = service();
        let err = service.register("biz_a", new_webhook("/hooks")).await.unwrap_err();
        assert_eq!(err.status(), 400);
    }

    #[test]
    fn test_strategy_field_spellings() {
        let a: NewWebhook = serde_json::from_value(serde_json::json!({
            "url": "https://m.example/h",
            "security_strategy": "SHARED_SECRET",
            "event_types": ["checkout.session.completed"],
        }))
        .unwrap();
        assert_eq!(a.signing_strategy, SigningStrategy::SharedSecret);
        assert_eq!(a.event_types, vec![EventType::CheckoutSessionCompleted]);

        let b: NewWebhook = serde_json::from_value(serde_json::json!({
            "url": "https://m.example/h",
            "signing_strategy": "shared_secret",
        }))
        .unwrap();
        assert_eq!(b.signing_strategy, SigningStrategy::SharedSecret);
    }

    #[tokio::test]
    async fn test_update_and_revoke_are_scoped() {
        let service = service();
        let endpoint = service
            .register("biz_a", new_webhook("https://merchant.example/hooks"))
            .await
            .unwrap();

        let err = service
            .update("biz_b", &endpoint.id, WebhookUpdate::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "webhook-not-found");
        assert!(service.revoke("biz_b", &endpoint.id).await.is_err());

        let updated = service
            .update(
                "biz_a",
                &endpoint.id,
                WebhookUpdate {
                    url: Some("https://merchant.example/v2".into()),
                    event_types: Some(vec![EventType::CheckoutSessionPaymentFailed]),
                    ..WebhookUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.url, "https://merchant.example/v2");
        assert_eq!(updated.secret, endpoint.secret);

        service.revoke("biz_a", &endpoint.id).await.unwrap();
        service.revoke("biz_a", &endpoint.id).await.unwrap();
        let listed = service.list("biz_a").await.unwrap();
        assert_eq!(listed[0].status, WebhookStatus::Revoked);

        let err = service.send_test("biz_a", &endpoint.id).await.unwrap_err();
        assert_eq!(err.status(), 409);
    }
}
