//! Persistence seams
//!
//! The checkout service and dispatcher only talk to these traits. The
//! in-memory implementations back the server and the tests.

mod memory;

pub use memory::{MemorySessionStore, MemoryWebhookRegistry};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::session::{CheckoutSession, SessionId, StatusPair, TransactionId};
use crate::webhook::WebhookEndpoint;

/// Session rows
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Add a new session; ids are never reused
    async fn insert(&self, session: CheckoutSession) -> Result<()>;

    async fn get(&self, id: &SessionId) -> Result<Option<CheckoutSession>>;

    async fn find_by_transaction_id(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Option<CheckoutSession>>;

    /// Sessions of one business carrying `client_reference`, newest first
    async fn find_by_client_reference(
        &self,
        business_id: &str,
        client_reference: &str,
    ) -> Result<Vec<CheckoutSession>>;

    /// All sessions of one business, newest first
    async fn list_by_business(&self, business_id: &str) -> Result<Vec<CheckoutSession>>;

    /// Open sessions whose expiry time is at or before `now`
    async fn list_overdue(&self, now: DateTime<Utc>) -> Result<Vec<CheckoutSession>>;

    /// Replace the stored row with `updated` only if its status pair still
    /// equals `expected`. Returns `false` when another writer got there first.
    async fn compare_and_swap(&self, expected: StatusPair, updated: CheckoutSession)
    -> Result<bool>;
}

/// Webhook endpoints
#[async_trait]
pub trait WebhookRegistry: Send + Sync {
    async fn insert(&self, endpoint: WebhookEndpoint) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Option<WebhookEndpoint>>;

    /// Every endpoint of the business, revoked ones included
    async fn list_by_business(&self, business_id: &str) -> Result<Vec<WebhookEndpoint>>;

    /// Endpoints that may receive deliveries
    async fn list_active(&self, business_id: &str) -> Result<Vec<WebhookEndpoint>> {
        Ok(self
            .list_by_business(business_id)
            .await?
            .into_iter()
            .filter(WebhookEndpoint::is_active)
            .collect())
    }

    async fn update(&self, endpoint: WebhookEndpoint) -> Result<()>;
}
