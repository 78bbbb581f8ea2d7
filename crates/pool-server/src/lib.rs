//! # pool-server
//!
//! HTTP surface of wave-pool, a hosted checkout simulator.
//!
//! ```text
//! merchant backend ──API key──▶ /v1/checkout/sessions ─┐
//! payer browser ──────────────▶ /c/{id}, /pay/{id}  ───┼──▶ CheckoutService ──▶ webhooks
//! portal ─────session token───▶ /v1/auth, /v1/secrets, ┘
//!                               /v1/webhooks, /v1/me
//! ```

pub mod config;
pub mod error;
mod extract;
mod handlers;
mod page;
mod portal;
pub mod state;
mod sweeper;

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use config::ServerConfig;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
pub use sweeper::spawn_expiry_sweeper;

use crate::handlers::{
    create_session, expire_session, get_session, get_session_by_transaction, health_check,
    refund_session, search_sessions,
};
use crate::page::{pay, payment_page, simulate_failure, simulate_success};
use crate::portal::{
    create_webhook, issue_api_key, list_api_keys, list_sessions, list_webhooks, login, logout, me,
    revoke_api_key, revoke_webhook, test_webhook, update_webhook,
};

/// Build the full router over `state`
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health
        .route("/health", get(health_check))

        // Merchant API
        .route(
            "/v1/checkout/sessions",
            post(create_session).get(get_session_by_transaction),
        )
        .route("/v1/checkout/sessions/search", get(search_sessions))
        .route("/v1/checkout/sessions/{id}", get(get_session))
        .route("/v1/checkout/sessions/{id}/expire", post(expire_session))
        .route("/v1/checkout/sessions/{id}/refund", post(refund_session))

        // Payment page
        .route("/c/{id}", get(payment_page))
        .route("/c/{id}/succeed", post(simulate_success))
        .route("/c/{id}/fail", post(simulate_failure))
        .route("/pay/{id}", get(payment_page).post(pay))

        // Portal
        .route("/v1/auth/login", post(login))
        .route("/v1/auth/logout", delete(logout))
        .route("/v1/me", get(me))
        .route("/v1/secrets", post(issue_api_key).get(list_api_keys))
        .route("/v1/secrets/{id}", delete(revoke_api_key))
        .route("/v1/webhooks", post(create_webhook).get(list_webhooks))
        .route(
            "/v1/webhooks/{id}",
            put(update_webhook).delete(revoke_webhook),
        )
        .route("/v1/webhooks/{id}/test", post(test_webhook))
        .route("/v1/portal/checkout-sessions", get(list_sessions))

        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
