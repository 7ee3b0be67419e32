mod common;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use chrono::{DateTime, Utc};
use serde_json::json;
use serial_test::serial;
use sqlx::PgPool;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use openpayflow::repos::{delivery_repo, endpoint_repo, event_repo};
use openpayflow::webhook::sender::{DELIVERY_ID_HEADER, EVENT_TYPE_HEADER, SIGNATURE_HEADER};
use openpayflow::webhook::{signature, SchedulerContext, WebhookSender, DEAD_LETTER_QUEUE};
use openpayflow::webhook::scheduler::process_delivery;
use work_queue::{InMemoryQueue, WorkQueue};

const SECRET: &str = "whsec_test_secret";

#[derive(Debug, Clone)]
struct Captured {
    signature: String,
    event_type: String,
    delivery_id: String,
    body: Vec<u8>,
}

#[derive(Clone)]
struct HookState {
    fail_first: u32,
    counter: Arc<AtomicU32>,
    calls: Arc<Mutex<Vec<Captured>>>,
}

async fn hook(State(state): State<HookState>, headers: HeaderMap, body: Bytes) -> StatusCode {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string()
    };
    state.calls.lock().unwrap().push(Captured {
        signature: header(SIGNATURE_HEADER),
        event_type: header(EVENT_TYPE_HEADER),
        delivery_id: header(DELIVERY_ID_HEADER),
        body: body.to_vec(),
    });

    let call_no = state.counter.fetch_add(1, Ordering::SeqCst);
    if call_no < state.fail_first {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    }
}

/// Local receiver failing the first `fail_first` calls with 500
async fn start_receiver(fail_first: u32) -> (SocketAddr, HookState) {
    let state = HookState {
        fail_first,
        counter: Arc::new(AtomicU32::new(0)),
        calls: Arc::new(Mutex::new(Vec::new())),
    };
    let app = Router::new()
        .route("/hook", post(hook))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    (addr, state)
}

fn scheduler_ctx(pool: PgPool) -> (SchedulerContext, InMemoryQueue) {
    let queue = InMemoryQueue::new();
    let ctx = SchedulerContext {
        pool,
        queue: Arc::new(queue.clone()) as Arc<dyn WorkQueue>,
        sender: WebhookSender::new(Duration::from_secs(5)).unwrap(),
        max_attempts: 10,
    };
    (ctx, queue)
}

async fn seed_delivery(pool: &PgPool, url: &str) -> (Uuid, Uuid, Uuid) {
    let (merchant, _) = common::seed_merchant(pool).await;
    let endpoint = endpoint_repo::insert(
        pool,
        merchant.id,
        url,
        SECRET,
        &["payment.created".to_string()],
    )
    .await
    .unwrap();

    let mut tx = pool.begin().await.unwrap();
    let event = event_repo::insert(
        &mut tx,
        Uuid::new_v4(),
        "payment.created",
        &json!({"paymentSnapshot": {"amount": 1999}, "correlationId": "corr-test"}),
    )
    .await
    .unwrap();
    let delivery_id = Uuid::new_v4();
    delivery_repo::insert_pending(&mut tx, delivery_id, endpoint.id, event.id)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    (endpoint.id, event.id, delivery_id)
}

#[derive(sqlx::FromRow)]
struct DeliveryRow {
    status: String,
    attempt_count: i32,
    last_error: Option<String>,
    next_retry_at: Option<DateTime<Utc>>,
}

async fn load_delivery(pool: &PgPool, id: Uuid) -> DeliveryRow {
    sqlx::query_as(
        "SELECT status, attempt_count, last_error, next_retry_at
         FROM webhook_deliveries WHERE id = $1",
    )
    .bind(id)
    .fetch_one(pool)
    .await
    .unwrap()
}

/// Retries until the receiver recovers: DELIVERED at attempt 4 with
/// strictly increasing retry times
#[tokio::test]
#[serial]
async fn delivery_retries_until_receiver_recovers() {
    let pool = common::get_test_pool().await;
    common::truncate_delivery_tables(&pool).await;
    let (addr, receiver) = start_receiver(3).await;
    let (ctx, _) = scheduler_ctx(pool.clone());
    let (_, event_id, delivery_id) =
        seed_delivery(&pool, &format!("http://{}/hook", addr)).await;

    let mut retry_times = Vec::new();
    for expected_attempt in 1..=3 {
        process_delivery(&ctx, delivery_id).await.unwrap();
        let row = load_delivery(&pool, delivery_id).await;
        assert_eq!(row.status, "FAILED");
        assert_eq!(row.attempt_count, expected_attempt);
        assert_eq!(row.last_error.as_deref(), Some("http_status:500"));
        let next = row.next_retry_at.expect("retry scheduled");
        assert!(next > Utc::now(), "retry time must be in the future");
        retry_times.push(next);
    }
    assert!(retry_times.windows(2).all(|w| w[0] < w[1]));

    process_delivery(&ctx, delivery_id).await.unwrap();
    let row = load_delivery(&pool, delivery_id).await;
    assert_eq!(row.status, "DELIVERED");
    assert_eq!(row.attempt_count, 4);
    assert!(row.last_error.is_none());
    assert!(row.next_retry_at.is_none());

    // Every POST was signed over its exact bytes and carried the headers
    let calls = receiver.calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 4);
    for call in &calls {
        assert!(signature::verify(SECRET, &call.body, &call.signature));
        assert_eq!(call.event_type, "payment.created");
        assert_eq!(call.delivery_id, delivery_id.to_string());

        let payload: serde_json::Value = serde_json::from_slice(&call.body).unwrap();
        assert_eq!(payload["id"], json!(event_id.to_string()));
        assert_eq!(payload["type"], "payment.created");
        assert!(payload["created"].is_i64());
        assert_eq!(payload["data"]["paymentSnapshot"]["amount"], 1999);
    }

    // Late re-processing of a DELIVERED row is a drop
    process_delivery(&ctx, delivery_id).await.unwrap();
    let row = load_delivery(&pool, delivery_id).await;
    assert_eq!(row.attempt_count, 4);
    assert_eq!(receiver.calls.lock().unwrap().len(), 4);
}

/// A permanently failing receiver abandons at 10 attempts with a dead
/// letter
#[tokio::test]
#[serial]
async fn delivery_abandons_after_max_attempts() {
    let pool = common::get_test_pool().await;
    common::truncate_delivery_tables(&pool).await;
    let (addr, receiver) = start_receiver(u32::MAX).await;
    let (ctx, queue) = scheduler_ctx(pool.clone());
    let (endpoint_id, event_id, delivery_id) =
        seed_delivery(&pool, &format!("http://{}/hook", addr)).await;

    for _ in 1..=10 {
        process_delivery(&ctx, delivery_id).await.unwrap();
    }

    let row = load_delivery(&pool, delivery_id).await;
    assert_eq!(row.status, "ABANDONED");
    assert_eq!(row.attempt_count, 10);
    assert!(row.next_retry_at.is_none());

    let (attempts, dead_endpoint, dead_event): (i32, Uuid, Uuid) = sqlx::query_as(
        "SELECT attempts, endpoint_id, event_id FROM dead_letters WHERE delivery_id = $1",
    )
    .bind(delivery_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(attempts, 10);
    assert_eq!(dead_endpoint, endpoint_id);
    assert_eq!(dead_event, event_id);

    let raw = queue
        .pop(DEAD_LETTER_QUEUE, Duration::from_millis(200))
        .await
        .unwrap()
        .expect("dead letter pushed");
    let message: serde_json::Value = serde_json::from_slice(&raw).unwrap();
    assert_eq!(message["type"], "webhook_delivery_abandoned");
    assert_eq!(message["deliveryId"], json!(delivery_id.to_string()));
    assert_eq!(message["attempts"], 10);
    assert_eq!(message["lastError"], "http_status:500");

    // Further processing is a drop; no eleventh POST
    process_delivery(&ctx, delivery_id).await.unwrap();
    let row = load_delivery(&pool, delivery_id).await;
    assert_eq!(row.status, "ABANDONED");
    assert_eq!(row.attempt_count, 10);
    assert_eq!(receiver.calls.lock().unwrap().len(), 10);
}

/// Transport failures (nothing listening) classify as retryable
#[tokio::test]
#[serial]
async fn transport_error_schedules_retry() {
    let pool = common::get_test_pool().await;
    common::truncate_delivery_tables(&pool).await;
    let (ctx, _) = scheduler_ctx(pool.clone());
    // Reserved port with no listener
    let (_, _, delivery_id) = seed_delivery(&pool, "http://127.0.0.1:1/hook").await;

    process_delivery(&ctx, delivery_id).await.unwrap();

    let row = load_delivery(&pool, delivery_id).await;
    assert_eq!(row.status, "FAILED");
    assert_eq!(row.attempt_count, 1);
    assert!(row.last_error.unwrap().starts_with("transport:"));
    assert!(row.next_retry_at.is_some());
}

/// Full spine: intake → drainer → queue → scheduler → receiver
#[tokio::test]
#[serial]
async fn event_flows_from_intake_to_receiver() {
    use openpayflow::gateway::MockGatewayConfig;
    use openpayflow::outbox::drainer;
    use openpayflow::webhook::DELIVERY_QUEUE;

    let pool = common::get_test_pool().await;
    common::truncate_delivery_tables(&pool).await;
    let app_ctx = common::TestCtx::new(pool.clone(), MockGatewayConfig::default());
    let (merchant, api_key) = common::seed_merchant(&pool).await;
    let (addr, receiver) = start_receiver(0).await;

    endpoint_repo::insert(
        &pool,
        merchant.id,
        &format!("http://{}/hook", addr),
        SECRET,
        &["payment.created".to_string()],
    )
    .await
    .unwrap();

    let (status, _) = common::post_json(
        app_ctx.router(),
        "/v1/payments",
        Some("idem-spine"),
        &json!({
            "amount": 4242,
            "currency": "USD",
            "gateway": "mock",
            "merchantApiKey": api_key,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    drainer::drain_once(&pool, &*app_ctx.state.queue, drainer::BATCH_SIZE)
        .await
        .unwrap();

    let item = app_ctx
        .queue
        .pop(DELIVERY_QUEUE, Duration::from_millis(200))
        .await
        .unwrap()
        .expect("delivery enqueued");
    let delivery_id: Uuid = String::from_utf8(item).unwrap().parse().unwrap();

    let (sched_ctx, _) = scheduler_ctx(pool.clone());
    process_delivery(&sched_ctx, delivery_id).await.unwrap();

    let row = load_delivery(&pool, delivery_id).await;
    assert_eq!(row.status, "DELIVERED");
    assert_eq!(row.attempt_count, 1);

    let calls = receiver.calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 1);
    let payload: serde_json::Value = serde_json::from_slice(&calls[0].body).unwrap();
    assert_eq!(payload["data"]["paymentSnapshot"]["amount"], 4242);
    assert!(signature::verify(SECRET, &calls[0].body, &calls[0].signature));
}
