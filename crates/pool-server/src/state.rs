//! Application State

use std::sync::Arc;

use pool_auth::{
    AccountService, AccountStore, ApiKeyHasher, ApiKeyResolver, ApiKeyService, ApiKeyStore,
    AuthConfig, AuthGate, LockoutLimiter, MemoryAccountStore, MemoryApiKeyStore,
    MemorySessionTokenStore, SessionTokenResolver, SessionTokenService,
};
use pool_core::{Clock, MemorySessionStore, MemoryWebhookRegistry, WebhookRegistry};
use pool_payments::{
    CheckoutConfig, CheckoutService, DeliveryError, DispatcherConfig, WebhookDispatcher,
    WebhookEndpointService,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Checkout session lifecycle
    pub checkout: Arc<CheckoutService>,

    /// Merchant webhook endpoints
    pub webhooks: Arc<WebhookEndpointService>,

    /// Portal users and their businesses
    pub accounts: Arc<AccountService>,

    pub api_keys: Arc<ApiKeyService>,

    /// Portal session tokens
    pub tokens: Arc<SessionTokenService>,

    pub clock: Arc<dyn Clock>,

    /// The only reader of credential material
    pub gate: AuthGate,
}

impl AppState {
    /// Wire every service over in-memory stores
    pub fn in_memory(
        clock: Arc<dyn Clock>,
        checkout: CheckoutConfig,
        dispatcher: &DispatcherConfig,
        auth: &AuthConfig,
    ) -> Result<Self, DeliveryError> {
        let registry: Arc<dyn WebhookRegistry> = Arc::new(MemoryWebhookRegistry::new());
        let dispatcher = WebhookDispatcher::new(registry.clone(), clock.clone(), dispatcher)?;

        let checkout = CheckoutService::new(
            Arc::new(MemorySessionStore::new()),
            Arc::new(dispatcher.clone()),
            clock.clone(),
            checkout,
        );
        let webhooks = WebhookEndpointService::new(registry, dispatcher, clock.clone());

        let account_store: Arc<dyn AccountStore> = Arc::new(MemoryAccountStore::new());
        let key_store: Arc<dyn ApiKeyStore> = Arc::new(MemoryApiKeyStore::new());
        let hasher = ApiKeyHasher::new(auth.api_secret.clone());

        let tokens = Arc::new(SessionTokenService::new(
            Arc::new(MemorySessionTokenStore::new()),
            clock.clone(),
            auth.portal_session_ttl,
        ));
        let limiter = LockoutLimiter::new(auth.max_login_attempts, auth.lockout, clock.clone());

        let gate = AuthGate::new(
            Arc::new(ApiKeyResolver::new(
                key_store.clone(),
                account_store.clone(),
                hasher.clone(),
            )),
            Arc::new(SessionTokenResolver::new(tokens.clone(), account_store.clone())),
        );

        Ok(Self {
            checkout: Arc::new(checkout),
            webhooks: Arc::new(webhooks),
            accounts: Arc::new(AccountService::new(
                account_store,
                tokens.clone(),
                Arc::new(limiter),
                clock.clone(),
            )),
            api_keys: Arc::new(ApiKeyService::new(key_store, hasher, clock.clone())),
            tokens,
            clock,
            gate,
        })
    }
}
