//! wave-pool HTTP Server
//!
//! Hosted checkout simulator: merchants create sessions with an API key,
//! payers settle them on the simulated payment page, and merchants hear about
//! it through signed webhooks.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pool_auth::AuthConfig;
use pool_core::SystemClock;
use pool_payments::{CheckoutConfig, DispatcherConfig};
use pool_server::{AppState, ServerConfig, app, spawn_expiry_sweeper};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let server = ServerConfig::from_env();
    let checkout = CheckoutConfig::from_env();
    let dispatcher = DispatcherConfig::from_env();
    let auth = AuthConfig::from_env();

    tracing::info!("Checkout sessions live {} minutes", checkout.session_ttl.num_minutes());
    tracing::info!("Webhook timeout {:?}", dispatcher.timeout);

    let launch_base_url = checkout.launch_base_url.clone();
    let state = AppState::in_memory(Arc::new(SystemClock), checkout, &dispatcher, &auth)?;

    let sweeper = spawn_expiry_sweeper(&state, server.expiry_sweep);

    let listener = tokio::net::TcpListener::bind(&server.bind_addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("wave-pool running on http://{}", server.bind_addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Payment pages: {}/c/<session id>", launch_base_url);
    tracing::info!("Endpoints:");
    tracing::info!("  POST /v1/auth/login                   - Portal login / sign-up");
    tracing::info!("  DELETE /v1/auth/logout                - Portal logout");
    tracing::info!("  POST /v1/secrets                      - Issue API key");
    tracing::info!("  POST /v1/webhooks                     - Register webhook");
    tracing::info!("  POST /v1/checkout/sessions            - Create checkout session");
    tracing::info!("  POST /v1/checkout/sessions/{{id}}/expire - Expire session");
    tracing::info!("  POST /v1/checkout/sessions/{{id}}/refund - Refund session");
    tracing::info!("");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
