use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{SessionStore, WebhookRegistry};
use crate::error::{CODE_WEBHOOK_NOT_FOUND, PoolError, Result};
use crate::session::{CheckoutSession, CheckoutStatus, SessionId, StatusPair, TransactionId};
use crate::webhook::WebhookEndpoint;

/// In-memory session store (development and tests)
pub struct MemorySessionStore {
    sessions: RwLock<SessionTables>,
}

#[derive(Default)]
struct SessionTables {
    by_id: HashMap<SessionId, CheckoutSession>,
    by_transaction: HashMap<String, SessionId>,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(SessionTables::default()),
        }
    }
}

fn newest_first(mut sessions: Vec<CheckoutSession>) -> Vec<CheckoutSession> {
    sessions.sort_by(|a, b| b.when_created.cmp(&a.when_created));
    sessions
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, session: CheckoutSession) -> Result<()> {
        let mut tables = self.sessions.write().await;
        if tables.by_id.contains_key(&session.id) {
            return Err(PoolError::Internal(format!(
                "duplicate session id {}",
                session.id
            )));
        }
        if let Some(tx) = &session.transaction_id {
            tables
                .by_transaction
                .insert(tx.bare().to_string(), session.id.clone());
        }
        tables.by_id.insert(session.id.clone(), session);
        Ok(())
    }

    async fn get(&self, id: &SessionId) -> Result<Option<CheckoutSession>> {
        Ok(self.sessions.read().await.by_id.get(id).cloned())
    }

    async fn find_by_transaction_id(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Option<CheckoutSession>> {
        let tables = self.sessions.read().await;
        Ok(tables
            .by_transaction
            .get(transaction_id.bare())
            .and_then(|id| tables.by_id.get(id))
            .cloned())
    }

    async fn find_by_client_reference(
        &self,
        business_id: &str,
        client_reference: &str,
    ) -> Result<Vec<CheckoutSession>> {
        let tables = self.sessions.read().await;
        let matches = tables
            .by_id
            .values()
            .filter(|s| {
                s.is_owned_by(business_id) && s.client_reference.as_deref() == Some(client_reference)
            })
            .cloned()
            .collect();
        Ok(newest_first(matches))
    }

    async fn list_by_business(&self, business_id: &str) -> Result<Vec<CheckoutSession>> {
        let tables = self.sessions.read().await;
        let owned = tables
            .by_id
            .values()
            .filter(|s| s.is_owned_by(business_id))
            .cloned()
            .collect();
        Ok(newest_first(owned))
    }

    async fn list_overdue(&self, now: DateTime<Utc>) -> Result<Vec<CheckoutSession>> {
        let tables = self.sessions.read().await;
        Ok(tables
            .by_id
            .values()
            .filter(|s| s.checkout_status == CheckoutStatus::Open && s.when_expires <= now)
            .cloned()
            .collect())
    }

    async fn compare_and_swap(
        &self,
        expected: StatusPair,
        updated: CheckoutSession,
    ) -> Result<bool> {
        let mut tables = self.sessions.write().await;
        let current = tables
            .by_id
            .get(&updated.id)
            .ok_or_else(PoolError::session_not_found)?;

        if current.status() != expected {
            return Ok(false);
        }

        if let Some(tx) = &updated.transaction_id {
            tables
                .by_transaction
                .insert(tx.bare().to_string(), updated.id.clone());
        }
        tables.by_id.insert(updated.id.clone(), updated);
        Ok(true)
    }
}

/// In-memory webhook registry
pub struct MemoryWebhookRegistry {
    endpoints: RwLock<HashMap<String, WebhookEndpoint>>,
}

impl Default for MemoryWebhookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryWebhookRegistry {
    pub fn new() -> Self {
        Self {
            endpoints: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl WebhookRegistry for MemoryWebhookRegistry {
    async fn insert(&self, endpoint: WebhookEndpoint) -> Result<()> {
        self.endpoints
            .write()
            .await
            .insert(endpoint.id.clone(), endpoint);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<WebhookEndpoint>> {
        Ok(self.endpoints.read().await.get(id).cloned())
    }

    async fn list_by_business(&self, business_id: &str) -> Result<Vec<WebhookEndpoint>> {
        let endpoints = self.endpoints.read().await;
        let mut owned: Vec<_> = endpoints
            .values()
            .filter(|e| e.business_id == business_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(owned)
    }

    async fn update(&self, endpoint: WebhookEndpoint) -> Result<()> {
        let mut endpoints = self.endpoints.write().await;
        match endpoints.get_mut(&endpoint.id) {
            Some(slot) => {
                *slot = endpoint;
                Ok(())
            }
            None => Err(PoolError::not_found(
                CODE_WEBHOOK_NOT_FOUND,
                "The webhook was not found",
            )),
        }
    }
}
