//! Checkout Service
//!
//! Drives the session state machine against a [`SessionStore`]. Every change
//! goes through a conditional write on the current status pair, so two racing
//! transitions on one session can never both land.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use pool_core::session::DEFAULT_SESSION_TTL_MINUTES;
use pool_core::{
    CheckoutSession, CheckoutStatus, Clock, CreateSessionRequest, EventType, Identity,
    LastPaymentError, PaymentStatus, PoolError, Result, SessionId, SessionStore, TransactionId,
    Transition,
};

/// Conditional-write attempts before giving up with a conflict
const MAX_TRANSITION_ATTEMPTS: usize = 3;

/// Receives state changes that merchants must hear about
pub trait EventPublisher: Send + Sync {
    /// Hand off an event. Must not block on delivery.
    fn publish(&self, event_type: EventType, session: &CheckoutSession);
}

/// Checkout configuration
#[derive(Clone, Debug)]
pub struct CheckoutConfig {
    /// Lifetime of a new session
    pub session_ttl: Duration,

    /// Base of `wave_launch_url`
    pub launch_base_url: String,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            session_ttl: Duration::minutes(DEFAULT_SESSION_TTL_MINUTES),
            launch_base_url: "http://localhost:8080".to_string(),
        }
    }
}

impl CheckoutConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());

        Self {
            session_ttl: std::env::var("SESSION_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .map_or(defaults.session_ttl, Duration::minutes),
            launch_base_url: std::env::var("WAVE_LAUNCH_URL")
                .unwrap_or_else(|_| format!("http://localhost:{port}")),
        }
    }
}

/// Session lifecycle operations
pub struct CheckoutService {
    store: Arc<dyn SessionStore>,
    events: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    config: CheckoutConfig,
}

impl CheckoutService {
    pub fn new(
        store: Arc<dyn SessionStore>,
        events: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        config: CheckoutConfig,
    ) -> Self {
        Self {
            store,
            events,
            clock,
            config,
        }
    }

    /// Validate the request and open a new session owned by `owner`
    pub async fn create(
        &self,
        owner: &Identity,
        request: CreateSessionRequest,
    ) -> Result<CheckoutSession> {
        request.validate()?;

        let session = CheckoutSession::open(
            request,
            owner,
            &self.config.launch_base_url,
            self.clock.now(),
            self.config.session_ttl,
        );
        self.store.insert(session.clone()).await?;

        info!(
            session_id = %session.id,
            business_id = %session.business_id,
            amount = %session.amount,
            currency = %session.currency,
            "Checkout session created"
        );
        Ok(session)
    }

    /// Fetch a session owned by `business_id`
    pub async fn get(&self, id: &str, business_id: &str) -> Result<CheckoutSession> {
        let id = SessionId::parse(id)?;
        self.store
            .get(&id)
            .await?
            .filter(|s| s.is_owned_by(business_id))
            .ok_or_else(PoolError::session_not_found)
    }

    /// Lookup by the caller-facing `T_…` transaction id
    pub async fn get_by_transaction_id(
        &self,
        transaction_id: &str,
        business_id: &str,
    ) -> Result<CheckoutSession> {
        let transaction_id = TransactionId::parse(transaction_id)?;
        self.store
            .find_by_transaction_id(&transaction_id)
            .await?
            .filter(|s| s.is_owned_by(business_id))
            .ok_or_else(PoolError::session_not_found)
    }

    pub async fn search_by_client_reference(
        &self,
        client_reference: &str,
        business_id: &str,
    ) -> Result<Vec<CheckoutSession>> {
        if client_reference.trim().is_empty() {
            return Err(PoolError::Validation("client_reference is required".into()));
        }
        self.store
            .find_by_client_reference(business_id, client_reference)
            .await
    }

    /// Sessions of one business, newest first
    pub async fn list(&self, business_id: &str) -> Result<Vec<CheckoutSession>> {
        self.store.list_by_business(business_id).await
    }

    /// Unscoped lookup for the public payment page
    pub async fn find_public(&self, id: &str) -> Result<CheckoutSession> {
        let id = SessionId::parse(id)?;
        self.store
            .get(&id)
            .await?
            .ok_or_else(PoolError::session_not_found)
    }

    /// Resolve the payment as successful.
    ///
    /// A `payer_mobile` that differs from the session's restriction turns the
    /// attempt into a `payer-mobile-mismatch` failure instead.
    pub async fn mark_succeeded(
        &self,
        id: &str,
        payer_mobile: Option<&str>,
    ) -> Result<CheckoutSession> {
        let id = SessionId::parse(id)?;
        let transaction_id = TransactionId::generate();

        self.settle(&id, |session, now| {
            if session.accepts_payer(payer_mobile) {
                session.succeed(transaction_id.clone(), now)
            } else {
                session.fail(LastPaymentError::payer_mobile_mismatch(), now)
            }
        })
        .await
    }

    /// Resolve the payment as failed with `error`
    pub async fn mark_failed(&self, id: &str, error: LastPaymentError) -> Result<CheckoutSession> {
        let id = SessionId::parse(id)?;
        self.settle(&id, |session, now| session.fail(error.clone(), now))
            .await
    }

    /// Expire an open session; a no-op if it is already expired
    pub async fn expire(&self, id: &str, business_id: &str) -> Result<CheckoutSession> {
        let id = SessionId::parse(id)?;
        let (session, transition) = self
            .transition(&id, |session, now| {
                owned(session, business_id)?;
                session.expire(now)
            })
            .await?;

        if transition == Transition::Applied {
            info!(session_id = %session.id, "Checkout session expired by merchant");
        }
        Ok(session)
    }

    /// Refund a succeeded payment; a no-op if already refunded
    pub async fn refund(&self, id: &str, business_id: &str) -> Result<CheckoutSession> {
        let id = SessionId::parse(id)?;
        let (session, transition) = self
            .transition(&id, |session, now| {
                owned(session, business_id)?;
                session.refund(now)
            })
            .await?;

        if transition == Transition::Applied {
            info!(session_id = %session.id, "Checkout session refunded");
        }
        Ok(session)
    }

    /// Expire every open session past its expiry time. Returns how many
    /// sessions changed.
    pub async fn expire_overdue(&self) -> Result<usize> {
        let now = self.clock.now();
        let overdue = self.store.list_overdue(now).await?;
        let mut expired = 0;

        for candidate in overdue {
            let outcome = self
                .transition(&candidate.id, |session, now| {
                    if session.is_overdue(now) {
                        session.expire(now)
                    } else {
                        Ok(Transition::Unchanged)
                    }
                })
                .await;

            match outcome {
                Ok((_, Transition::Applied)) => expired += 1,
                Ok((_, Transition::Unchanged)) => {}
                Err(e) => warn!(session_id = %candidate.id, error = %e, "Failed to expire overdue session"),
            }
        }

        if expired > 0 {
            info!(count = expired, "Expired overdue checkout sessions");
        }
        Ok(expired)
    }

    /// Apply a payment outcome, persisting expiry instead when the session
    /// has run out of time, and publish the matching event.
    async fn settle<F>(&self, id: &SessionId, resolve: F) -> Result<CheckoutSession>
    where
        F: Fn(&mut CheckoutSession, DateTime<Utc>) -> Result<()> + Send + Sync,
    {
        let (session, _) = self
            .transition(id, |session, now| {
                if session.is_overdue(now) {
                    return session.expire(now);
                }
                resolve(session, now)?;
                Ok(Transition::Applied)
            })
            .await?;

        match (session.checkout_status, session.payment_status) {
            (CheckoutStatus::Expired, _) => {
                info!(session_id = %session.id, "Payment attempted after expiry");
                Err(PoolError::session_expired())
            }
            (_, PaymentStatus::Succeeded) => {
                info!(
                    session_id = %session.id,
                    transaction_id = ?session.transaction_id.as_ref().map(ToString::to_string),
                    "Checkout payment succeeded"
                );
                self.events
                    .publish(EventType::CheckoutSessionCompleted, &session);
                Ok(session)
            }
            (_, PaymentStatus::Failed) => {
                info!(
                    session_id = %session.id,
                    code = ?session.last_payment_error.as_ref().map(|e| e.code.as_str()),
                    "Checkout payment failed"
                );
                self.events
                    .publish(EventType::CheckoutSessionPaymentFailed, &session);
                Ok(session)
            }
            _ => Err(PoolError::Internal(format!(
                "session {} settled into {}/{}",
                session.id,
                session.checkout_status.as_str(),
                session.payment_status.as_str()
            ))),
        }
    }

    /// Read, apply, conditionally write; re-read on a lost race.
    ///
    /// `apply` sees the freshest row on every attempt, so a transition that
    /// became illegal in the meantime fails with its ordinary error.
    async fn transition<F>(
        &self,
        id: &SessionId,
        apply: F,
    ) -> Result<(CheckoutSession, Transition)>
    where
        F: Fn(&mut CheckoutSession, DateTime<Utc>) -> Result<Transition> + Send + Sync,
    {
        for attempt in 1..=MAX_TRANSITION_ATTEMPTS {
            let current = self
                .store
                .get(id)
                .await?
                .ok_or_else(PoolError::session_not_found)?;

            let expected = current.status();
            let mut next = current.clone();
            if apply(&mut next, self.clock.now())? == Transition::Unchanged {
                return Ok((current, Transition::Unchanged));
            }

            if self.store.compare_and_swap(expected, next.clone()).await? {
                return Ok((next, Transition::Applied));
            }
            debug!(session_id = %id, attempt, "Lost update race; re-reading session");
        }

        warn!(session_id = %id, "Giving up after repeated concurrent modification");
        Err(PoolError::session_conflict(
            "The checkout session was modified concurrently",
        ))
    }
}

fn owned(session: &CheckoutSession, business_id: &str) -> Result<()> {
    if session.is_owned_by(business_id) {
        Ok(())
    } else {
        Err(PoolError::session_not_found())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pool_core::{ManualClock, MemorySessionStore, Permission};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingPublisher {
        events: Mutex<Vec<(EventType, String)>>,
    }

    impl RecordingPublisher {
        fn recorded(&self) -> Vec<(EventType, String)> {
            self.events.lock().unwrap().clone()
        }
    }

    impl EventPublisher for RecordingPublisher {
        fn publish(&self, event_type: EventType, session: &CheckoutSession) {
            self.events
                .lock()
                .unwrap()
                .push((event_type, session.id.to_string()));
        }
    }

    struct Fixture {
        service: CheckoutService,
        clock: Arc<ManualClock>,
        events: Arc<RecordingPublisher>,
        owner: Identity,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::default());
        let events = Arc::new(RecordingPublisher::default());
        let service = CheckoutService::new(
            Arc::new(MemorySessionStore::new()),
            events.clone(),
            clock.clone(),
            CheckoutConfig::default(),
        );
        Fixture {
            service,
            clock,
            events,
            owner: Identity::api_key("key_1", "biz_a", "Dakar Crafts", vec![Permission::CheckoutApi]),
        }
    }

    fn request(amount: &str) -> CreateSessionRequest {
        CreateSessionRequest {
            amount: amount.into(),
            currency: "XOF".into(),
            error_url: "https://merchant.example/error".into(),
            success_url: "https://merchant.example/success".into(),
            client_reference: Some("order-7".into()),
            restrict_payer_mobile: None,
            aggregated_merchant_id: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_preserves_amount() {
        let f = fixture();
        let created = f.service.create(&f.owner, request("1000.50")).await.unwrap();
        let fetched = f.service.get(created.id.as_str(), "biz_a").await.unwrap();

        assert_eq!(fetched.amount, "1000.50");
        assert_eq!(fetched.business_name, "Dakar Crafts");
        assert_eq!(fetched.checkout_status, CheckoutStatus::Open);
        assert_eq!(fetched.when_expires - fetched.when_created, Duration::minutes(30));
    }

    #[tokio::test]
    async fn test_create_rejects_bad_amount() {
        let f = fixture();
        let err = f.service.create(&f.owner, request("12,5")).await.unwrap_err();
        assert_eq!(err.code(), "request-validation-error");
    }

    #[tokio::test]
    async fn test_ownership_is_indistinguishable_from_absence() {
        let f = fixture();
        let created = f.service.create(&f.owner, request("500")).await.unwrap();

        let foreign = f.service.get(created.id.as_str(), "biz_b").await.unwrap_err();
        let missing = f.service.get("cos_doesnotexist", "biz_a").await.unwrap_err();
        assert_eq!(foreign, missing);
        assert_eq!(foreign.status(), 404);

        let refund = f.service.refund(created.id.as_str(), "biz_b").await.unwrap_err();
        assert_eq!(refund, missing);
        let expire = f.service.expire(created.id.as_str(), "biz_b").await.unwrap_err();
        assert_eq!(expire, missing);
    }

    #[tokio::test]
    async fn test_success_publishes_completed_once() {
        let f = fixture();
        let created = f.service.create(&f.owner, request("500")).await.unwrap();
        let paid = f.service.mark_succeeded(created.id.as_str(), None).await.unwrap();

        assert_eq!(paid.checkout_status, CheckoutStatus::Complete);
        assert_eq!(paid.payment_status, PaymentStatus::Succeeded);
        assert!(paid.transaction_id.is_some());
        assert_eq!(
            f.events.recorded(),
            vec![(EventType::CheckoutSessionCompleted, created.id.to_string())]
        );

        let again = f.service.mark_succeeded(created.id.as_str(), None).await.unwrap_err();
        assert_eq!(again.code(), "checkout-session-not-open");
        assert_eq!(f.events.recorded().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_records_error_and_publishes() {
        let f = fixture();
        let created = f.service.create(&f.owner, request("500")).await.unwrap();
        let failed = f
            .service
            .mark_failed(created.id.as_str(), LastPaymentError::insufficient_funds())
            .await
            .unwrap();

        assert_eq!(failed.payment_status, PaymentStatus::Failed);
        assert_eq!(failed.checkout_status, CheckoutStatus::Complete);
        assert_eq!(failed.last_payment_error.unwrap().code, "insufficient-funds");
        assert_eq!(
            f.events.recorded()[0].0,
            EventType::CheckoutSessionPaymentFailed
        );
    }

    #[tokio::test]
    async fn test_payer_mismatch_fails_attempt() {
        let f = fixture();
        let mut req = request("500");
        req.restrict_payer_mobile = Some("+221771234567".into());
        let created = f.service.create(&f.owner, req).await.unwrap();

        let session = f
            .service
            .mark_succeeded(created.id.as_str(), Some("+221781111111"))
            .await
            .unwrap();
        assert_eq!(session.payment_status, PaymentStatus::Failed);
        assert_eq!(session.last_payment_error.unwrap().code, "payer-mobile-mismatch");
    }

    #[tokio::test]
    async fn test_payment_after_expiry_persists_expired() {
        let f = fixture();
        let created = f.service.create(&f.owner, request("500")).await.unwrap();
        f.clock.advance(Duration::minutes(31));

        let err = f.service.mark_succeeded(created.id.as_str(), None).await.unwrap_err();
        assert_eq!(err.code(), "checkout-session-expired");

        let stored = f.service.get(created.id.as_str(), "biz_a").await.unwrap();
        assert_eq!(stored.checkout_status, CheckoutStatus::Expired);
        assert!(f.events.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_expire_is_idempotent_and_conflicts_on_complete() {
        let f = fixture();
        let open = f.service.create(&f.owner, request("500")).await.unwrap();
        let first = f.service.expire(open.id.as_str(), "biz_a").await.unwrap();
        let second = f.service.expire(open.id.as_str(), "biz_a").await.unwrap();
        assert_eq!(first.checkout_status, CheckoutStatus::Expired);
        assert_eq!(second.when_completed, first.when_completed);

        let paid = f.service.create(&f.owner, request("500")).await.unwrap();
        f.service.mark_succeeded(paid.id.as_str(), None).await.unwrap();
        let err = f.service.expire(paid.id.as_str(), "biz_a").await.unwrap_err();
        assert_eq!(err.status(), 409);
        assert_eq!(err.code(), "checkout-session-conflict");
    }

    #[tokio::test]
    async fn test_refund_rules() {
        let f = fixture();
        let created = f.service.create(&f.owner, request("500")).await.unwrap();
        let err = f.service.refund(created.id.as_str(), "biz_a").await.unwrap_err();
        assert_eq!(err.code(), "checkout-refund-failed");

        f.service.mark_succeeded(created.id.as_str(), None).await.unwrap();
        let refunded = f.service.refund(created.id.as_str(), "biz_a").await.unwrap();
        assert_eq!(refunded.payment_status, PaymentStatus::Cancelled);

        let again = f.service.refund(created.id.as_str(), "biz_a").await.unwrap();
        assert_eq!(again.payment_status, PaymentStatus::Cancelled);
        assert_eq!(again.when_refunded, refunded.when_refunded);
        assert_eq!(f.events.recorded().len(), 1);
    }

    #[tokio::test]
    async fn test_lookup_by_transaction_and_reference() {
        let f = fixture();
        let created = f.service.create(&f.owner, request("500")).await.unwrap();
        let paid = f.service.mark_succeeded(created.id.as_str(), None).await.unwrap();
        let tx = paid.transaction_id.unwrap().to_string();

        let found = f.service.get_by_transaction_id(&tx, "biz_a").await.unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(
            f.service.get_by_transaction_id(&tx, "biz_b").await.unwrap_err().status(),
            404
        );
        let bare = tx.trim_start_matches("T_");
        assert_eq!(
            f.service.get_by_transaction_id(bare, "biz_a").await.unwrap_err().status(),
            400
        );

        let by_ref = f.service.search_by_client_reference("order-7", "biz_a").await.unwrap();
        assert_eq!(by_ref.len(), 1);
        assert!(f.service.search_by_client_reference("order-7", "biz_b").await.unwrap().is_empty());
        assert!(f.service.search_by_client_reference(" ", "biz_a").await.is_err());
    }

    #[tokio::test]
    async fn test_sweeper_expires_only_overdue() {
        let f = fixture();
        let early = f.service.create(&f.owner, request("500")).await.unwrap();
        f.clock.advance(Duration::minutes(20));
        let late = f.service.create(&f.owner, request("500")).await.unwrap();
        f.clock.advance(Duration::minutes(15));

        assert_eq!(f.service.expire_overdue().await.unwrap(), 1);
        let early = f.service.get(early.id.as_str(), "biz_a").await.unwrap();
        let late = f.service.get(late.id.as_str(), "biz_a").await.unwrap();
        assert_eq!(early.checkout_status, CheckoutStatus::Expired);
        assert_eq!(late.checkout_status, CheckoutStatus::Open);
        assert!(f.events.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_racing_transitions_never_both_win() {
        let f = Arc::new(fixture());
        for _ in 0..20 {
            let created = f.service.create(&f.owner, request("500")).await.unwrap();
            let id = created.id.to_string();

            let pay = {
                let f = f.clone();
                let id = id.clone();
                tokio::spawn(async move { f.service.mark_succeeded(&id, None).await })
            };
            let expire = {
                let f = f.clone();
                let id = id.clone();
                tokio::spawn(async move { f.service.expire(&id, "biz_a").await })
            };
            let paid = pay.await.unwrap();
            let expired = expire.await.unwrap();

            assert!(paid.is_ok() != expired.is_ok(), "exactly one transition must win");
            let stored = f.service.get(&id, "biz_a").await.unwrap();
            if paid.is_ok() {
                assert_eq!(stored.checkout_status, CheckoutStatus::Complete);
                assert_eq!(expired.unwrap_err().status(), 409);
            } else {
                assert_eq!(stored.checkout_status, CheckoutStatus::Expired);
                assert_eq!(paid.unwrap_err().status(), 409);
            }
        }
    }
}
