//! Webhook dispatcher against a real HTTP receiver

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use chrono::Utc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use pool_core::{
    CheckoutSession, CreateSessionRequest, Event, EventType, Identity, MemoryWebhookRegistry,
    Permission, SigningStrategy, SystemClock, WebhookEndpoint, WebhookRegistry, WebhookStatus,
};
use pool_payments::{DeliveryError, DispatcherConfig, EventPublisher, WebhookDispatcher, signature};

struct Captured {
    name: String,
    headers: HeaderMap,
    body: Vec<u8>,
}

async fn capture(
    State(tx): State<UnboundedSender<Captured>>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let _ = tx.send(Captured {
        name,
        headers,
        body: body.to_vec(),
    });
    StatusCode::OK
}

async fn spawn_receiver() -> (String, UnboundedReceiver<Captured>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let app = Router::new()
        .route("/ok/{name}", post(capture))
        .route("/fail", post(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
        .route(
            "/slow",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                StatusCode::OK
            }),
        )
        .with_state(tx);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), rx)
}

fn session(business_id: &str) -> CheckoutSession {
    let owner = Identity::api_key("key_1", business_id, "Dakar Crafts", vec![Permission::CheckoutApi]);
    let request = CreateSessionRequest {
        amount: "500".into(),
        currency: "XOF".into(),
        error_url: "https://merchant.example/error".into(),
        success_url: "https://merchant.example/success".into(),
        client_reference: None,
        restrict_payer_mobile: None,
        aggregated_merchant_id: None,
    };
    CheckoutSession::open(request, &owner, "http://localhost:8080", Utc::now(), chrono::Duration::minutes(30))
}

fn endpoint(business_id: &str, url: String, strategy: SigningStrategy, secret: &str) -> WebhookEndpoint {
    WebhookEndpoint::new(business_id, url, strategy, secret, vec![], Utc::now())
}

fn dispatcher(registry: Arc<MemoryWebhookRegistry>, timeout: Duration) -> WebhookDispatcher {
    let config = DispatcherConfig {
        timeout,
        ..DispatcherConfig::default()
    };
    WebhookDispatcher::new(registry, Arc::new(SystemClock), &config).unwrap()
}

#[tokio::test]
async fn test_signed_delivery_verifies() {
    let (base, mut rx) = spawn_receiver().await;
    let registry = Arc::new(MemoryWebhookRegistry::new());
    registry
        .insert(endpoint("biz_a", format!("{base}/ok/signed"), SigningStrategy::SigningSecret, "whs_one"))
        .await
        .unwrap();

    let session = session("biz_a");
    let event = Event::for_session(EventType::CheckoutSessionCompleted, &session).unwrap();
    let reports = dispatcher(registry, Duration::from_secs(5))
        .dispatch(event, "biz_a")
        .await
        .unwrap();

    assert_eq!(reports.len(), 1);
    assert!(reports[0].is_delivered());

    let got = rx.recv().await.unwrap();
    assert_eq!(got.name, "signed");
    assert_eq!(got.headers["content-type"], "application/json");
    assert!(got.headers.get("authorization").is_none());

    let header = got.headers["wave-signature"].to_str().unwrap();
    signature::verify("whs_one", header, &got.body, Utc::now(), Some(chrono::Duration::minutes(5)))
        .unwrap();

    let body: serde_json::Value = serde_json::from_slice(&got.body).unwrap();
    assert_eq!(body["id"], format!("EV_{}", session.id));
    assert_eq!(body["type"], "checkout.session.completed");
    assert_eq!(body["data"]["id"], session.id.as_str());
    assert_eq!(body["data"]["amount"], "500");
}

#[tokio::test]
async fn test_shared_secret_uses_bearer() {
    let (base, mut rx) = spawn_receiver().await;
    let registry = Arc::new(MemoryWebhookRegistry::new());
    registry
        .insert(endpoint("biz_a", format!("{base}/ok/shared"), SigningStrategy::SharedSecret, "whs_two"))
        .await
        .unwrap();

    let event = Event::for_session(EventType::CheckoutSessionPaymentFailed, &session("biz_a")).unwrap();
    dispatcher(registry, Duration::from_secs(5))
        .dispatch(event, "biz_a")
        .await
        .unwrap();

    let got = rx.recv().await.unwrap();
    assert_eq!(got.headers["authorization"], "Bearer whs_two");
    assert!(got.headers.get("wave-signature").is_none());
}

#[tokio::test]
async fn test_only_active_subscribed_owned_endpoints_receive() {
    let (base, mut rx) = spawn_receiver().await;
    let registry = Arc::new(MemoryWebhookRegistry::new());

    let mut revoked = endpoint("biz_a", format!("{base}/ok/revoked"), SigningStrategy::SigningSecret, "s");
    revoked.status = WebhookStatus::Revoked;
    let mut filtered = endpoint("biz_a", format!("{base}/ok/filtered"), SigningStrategy::SigningSecret, "s");
    filtered.event_types = vec![EventType::CheckoutSessionPaymentFailed];
    let foreign = endpoint("biz_b", format!("{base}/ok/foreign"), SigningStrategy::SigningSecret, "s");
    let wanted = endpoint("biz_a", format!("{base}/ok/wanted"), SigningStrategy::SigningSecret, "s");

    for e in [revoked, filtered, foreign, wanted] {
        registry.insert(e).await.unwrap();
    }

    let event = Event::for_session(EventType::CheckoutSessionCompleted, &session("biz_a")).unwrap();
    let reports = dispatcher(registry, Duration::from_secs(5))
        .dispatch(event, "biz_a")
        .await
        .unwrap();
    assert_eq!(reports.len(), 1);

    let got = rx.recv().await.unwrap();
    assert_eq!(got.name, "wanted");
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_failing_and_slow_endpoints_do_not_block_siblings() {
    let (base, mut rx) = spawn_receiver().await;
    let registry = Arc::new(MemoryWebhookRegistry::new());
    let failing = endpoint("biz_a", format!("{base}/fail"), SigningStrategy::SigningSecret, "s");
    let slow = endpoint("biz_a", format!("{base}/slow"), SigningStrategy::SigningSecret, "s");
    let healthy = endpoint("biz_a", format!("{base}/ok/healthy"), SigningStrategy::SigningSecret, "s");
    let (failing_id, slow_id) = (failing.id.clone(), slow.id.clone());
    for e in [failing, slow, healthy] {
        registry.insert(e).await.unwrap();
    }

    let event = Event::for_session(EventType::CheckoutSessionCompleted, &session("biz_a")).unwrap();
    let reports = dispatcher(registry, Duration::from_millis(300))
        .dispatch(event, "biz_a")
        .await
        .unwrap();
    assert_eq!(reports.len(), 3);

    for report in &reports {
        if report.endpoint_id == failing_id {
            assert!(matches!(report.outcome, Err(DeliveryError::Rejected { status: 500 })));
        } else if report.endpoint_id == slow_id {
            assert!(matches!(report.outcome, Err(DeliveryError::Timeout)));
        } else {
            assert!(report.is_delivered());
        }
    }
    assert_eq!(rx.recv().await.unwrap().name, "healthy");
}

#[tokio::test]
async fn test_publish_is_fire_and_forget() {
    let (base, mut rx) = spawn_receiver().await;
    let registry = Arc::new(MemoryWebhookRegistry::new());
    registry
        .insert(endpoint("biz_a", format!("{base}/ok/async"), SigningStrategy::SigningSecret, "s"))
        .await
        .unwrap();

    let session = session("biz_a");
    dispatcher(registry, Duration::from_secs(5)).publish(EventType::CheckoutSessionCompleted, &session);

    let got = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&got.body).unwrap();
    assert_eq!(body["data"]["id"], session.id.as_str());
}

#[tokio::test]
async fn test_send_test_event() {
    let (base, mut rx) = spawn_receiver().await;
    let registry = Arc::new(MemoryWebhookRegistry::new());
    let target = endpoint("biz_a", format!("{base}/ok/test"), SigningStrategy::SigningSecret, "s");

    let report = dispatcher(registry, Duration::from_secs(5))
        .send_test(target)
        .await
        .unwrap();
    assert!(report.is_delivered());

    let got = rx.recv().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&got.body).unwrap();
    assert_eq!(body["type"], "webhook.test");
    assert!(body["data"]["test_message"].is_string());
}
