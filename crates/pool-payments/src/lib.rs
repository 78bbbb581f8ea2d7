//! # pool-payments
//!
//! Checkout session lifecycle and merchant notification for wave-pool.
//!
//! ## Flow
//!
//! ```text
//! ┌──────────────┐  create   ┌─────────────────┐  succeed/fail  ┌──────────────────┐
//! │   Merchant   │──────────▶│ CheckoutService │───────────────▶│ WebhookDispatcher│
//! │   backend    │◀──────────│  (CAS on store) │    publish     │  (signed POSTs)  │
//! └──────────────┘  session  └─────────────────┘                └──────────────────┘
//!        ▲                                                              │
//!        └──────────────────── Wave-Signature / Bearer ─────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pool_payments::{CheckoutConfig, CheckoutService, DispatcherConfig, WebhookDispatcher};
//!
//! let dispatcher = WebhookDispatcher::new(registry, clock.clone(), &DispatcherConfig::from_env())?;
//! let checkout = CheckoutService::new(store, Arc::new(dispatcher), clock, CheckoutConfig::from_env());
//!
//! let session = checkout.create(&identity, request).await?;
//! // Redirect the payer to: session.wave_launch_url
//! ```

mod checkout;
mod endpoints;
mod error;
pub mod signature;
mod webhook;

pub use checkout::{CheckoutConfig, CheckoutService, EventPublisher};
pub use endpoints::{NewWebhook, WEBHOOK_SECRET_PREFIX, WebhookEndpointService, WebhookUpdate};
pub use error::{DeliveryError, SignatureError};
pub use webhook::{DeliveryReport, DispatcherConfig, WebhookDispatcher};
