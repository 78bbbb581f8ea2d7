//! # pool-core
//!
//! Domain model for the wave-pool checkout simulator.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         pool-core                             │
//! │  ┌──────────────┐  ┌──────────────┐  ┌────────────────────┐  │
//! │  │   Session    │  │   Identity   │  │   SessionStore     │  │
//! │  │ state rules  │  │  (resolved   │  │   WebhookRegistry  │  │
//! │  │ + validation │  │   caller)    │  │   (traits + mem)   │  │
//! │  └──────────────┘  └──────────────┘  └────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//!          ▲                    ▲                    ▲
//!    pool-payments          pool-auth           pool-server
//! ```
//!
//! Nothing here does I/O beyond the in-memory stores. Services in the other
//! crates drive the transitions and persist them through the store traits.

pub mod clock;
pub mod error;
pub mod event;
pub mod identity;
pub mod session;
pub mod store;
pub mod validation;
pub mod webhook;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{PoolError, Result};
pub use event::{Event, EventType};
pub use identity::{CredentialResolver, Identity, Permission, Principal};
pub use session::{
    CheckoutSession, CheckoutStatus, LastPaymentError, PaymentStatus, SessionId, StatusPair,
    TransactionId, Transition,
};
pub use store::{MemorySessionStore, MemoryWebhookRegistry, SessionStore, WebhookRegistry};
pub use validation::CreateSessionRequest;
pub use webhook::{SigningStrategy, WebhookEndpoint, WebhookStatus};
