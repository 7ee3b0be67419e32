mod common;

use axum::http::StatusCode;
use serde_json::json;
use uuid::Uuid;

use openpayflow::gateway::MockGatewayConfig;

/// Happy path: intake settles succeeded, attempt #1 recorded, outbox row
/// appended in the same transaction
#[tokio::test]
async fn intake_happy_path() {
    let pool = common::get_test_pool().await;
    let ctx = common::TestCtx::new(pool.clone(), MockGatewayConfig::default());
    let (merchant, api_key) = common::seed_merchant(&pool).await;

    let (status, body) = common::post_json(
        ctx.router(),
        "/v1/payments",
        Some("idem-1"),
        &json!({
            "amount": 1999,
            "currency": "USD",
            "gateway": "mock",
            "merchantApiKey": api_key,
            "metadata": {"orderId": "o1"}
        }),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "succeeded");
    assert_eq!(body["data"]["amount"], 1999);
    assert_eq!(body["data"]["currency"], "USD");
    assert_eq!(body["data"]["merchantId"], json!(merchant.id.to_string()));
    assert!(body["data"]["providerPaymentId"]
        .as_str()
        .unwrap()
        .starts_with("mock_pi_"));

    let payment_id: Uuid = body["data"]["id"].as_str().unwrap().parse().unwrap();

    let attempt_status: String = sqlx::query_scalar(
        "SELECT status FROM payment_attempts WHERE payment_id = $1 AND attempt_no = 1",
    )
    .bind(payment_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(attempt_status, "SUCCEEDED");

    let outbox_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM outbox WHERE aggregate_id = $1 AND event_type = 'payment.created'",
    )
    .bind(payment_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(outbox_count, 1);
}

/// Idempotent replay: concurrent identical intakes yield one payment
#[tokio::test]
async fn intake_idempotent_replay() {
    let pool = common::get_test_pool().await;
    let ctx = common::TestCtx::new(pool.clone(), MockGatewayConfig::default());
    let (merchant, api_key) = common::seed_merchant(&pool).await;

    let body = json!({
        "amount": 1999,
        "currency": "USD",
        "gateway": "mock",
        "merchantApiKey": api_key,
    });

    let (r1, r2, r3) = tokio::join!(
        common::post_json(ctx.router(), "/v1/payments", Some("idem-replay"), &body),
        common::post_json(ctx.router(), "/v1/payments", Some("idem-replay"), &body),
        common::post_json(ctx.router(), "/v1/payments", Some("idem-replay"), &body),
    );

    let ids: Vec<&str> = [&r1, &r2, &r3]
        .iter()
        .map(|(status, body)| {
            assert!(
                *status == StatusCode::CREATED,
                "unexpected status {} body {}",
                status,
                body
            );
            body["data"]["id"].as_str().unwrap()
        })
        .collect();
    assert_eq!(ids[0], ids[1]);
    assert_eq!(ids[1], ids[2]);

    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM payments WHERE merchant_id = $1 AND idempotency_key = 'idem-replay'",
    )
    .bind(merchant.id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(count, 1);
}

/// Replay with a different body still returns the original payment
#[tokio::test]
async fn intake_replay_ignores_new_body() {
    let pool = common::get_test_pool().await;
    let ctx = common::TestCtx::new(pool.clone(), MockGatewayConfig::default());
    let (_, api_key) = common::seed_merchant(&pool).await;

    let (_, first) = common::post_json(
        ctx.router(),
        "/v1/payments",
        Some("idem-body"),
        &json!({
            "amount": 1000,
            "currency": "USD",
            "gateway": "mock",
            "merchantApiKey": api_key,
        }),
    )
    .await;

    let (status, second) = common::post_json(
        ctx.router(),
        "/v1/payments",
        Some("idem-body"),
        &json!({
            "amount": 2500,
            "currency": "EUR",
            "gateway": "mock",
            "merchantApiKey": api_key,
        }),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(second["data"]["id"], first["data"]["id"]);
    assert_eq!(second["data"]["amount"], 1000);
    assert_eq!(second["data"]["currency"], "USD");
}

/// Gateway decline: 5xx to the caller, FAILED rows persisted, outbox still
/// appended
#[tokio::test]
async fn intake_gateway_failure() {
    let pool = common::get_test_pool().await;
    let ctx = common::TestCtx::new(
        pool.clone(),
        MockGatewayConfig {
            success_rate: 0.0,
            ..Default::default()
        },
    );
    let (merchant, api_key) = common::seed_merchant(&pool).await;

    let (status, body) = common::post_json(
        ctx.router(),
        "/v1/payments",
        Some("idem-fail"),
        &json!({
            "amount": 1999,
            "currency": "USD",
            "gateway": "mock",
            "merchantApiKey": api_key,
        }),
    )
    .await;

    assert!(status.is_server_error(), "expected 5xx, got {}", status);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "card_declined");
    assert!(body["error"]["correlationId"].is_string());

    #[derive(sqlx::FromRow)]
    struct Row {
        id: Uuid,
        status: String,
    }
    let payment: Row = sqlx::query_as(
        "SELECT id, status FROM payments WHERE merchant_id = $1 AND idempotency_key = 'idem-fail'",
    )
    .bind(merchant.id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(payment.status, "FAILED");

    let (attempt_status, error_code): (String, Option<String>) = sqlx::query_as(
        "SELECT status, error_code FROM payment_attempts WHERE payment_id = $1 AND attempt_no = 1",
    )
    .bind(payment.id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(attempt_status, "FAILED");
    assert_eq!(error_code.as_deref(), Some("card_declined"));

    let outbox_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM outbox WHERE aggregate_id = $1 AND event_type = 'payment.created'",
    )
    .bind(payment.id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(outbox_count, 1);
}

#[tokio::test]
async fn intake_requires_idempotency_key() {
    let pool = common::get_test_pool().await;
    let ctx = common::TestCtx::new(pool.clone(), MockGatewayConfig::default());
    let (_, api_key) = common::seed_merchant(&pool).await;

    let (status, body) = common::post_json(
        ctx.router(),
        "/v1/payments",
        None,
        &json!({
            "amount": 100,
            "currency": "USD",
            "gateway": "mock",
            "merchantApiKey": api_key,
        }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "MISSING_IDEMPOTENCY_KEY");
}

#[tokio::test]
async fn intake_rejects_bad_api_key() {
    let pool = common::get_test_pool().await;
    let ctx = common::TestCtx::new(pool.clone(), MockGatewayConfig::default());

    let (status, body) = common::post_json(
        ctx.router(),
        "/v1/payments",
        Some("idem-auth"),
        &json!({
            "amount": 100,
            "currency": "USD",
            "gateway": "mock",
            "merchantApiKey": "sk_test_unknown",
        }),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "INVALID_API_KEY");
}

#[tokio::test]
async fn intake_validates_amount_currency_gateway() {
    let pool = common::get_test_pool().await;
    let ctx = common::TestCtx::new(pool.clone(), MockGatewayConfig::default());
    let (_, api_key) = common::seed_merchant(&pool).await;

    let cases = [
        (json!({"amount": 0, "currency": "USD", "gateway": "mock", "merchantApiKey": api_key}), "INVALID_AMOUNT"),
        (json!({"amount": -5, "currency": "USD", "gateway": "mock", "merchantApiKey": api_key}), "INVALID_AMOUNT"),
        (json!({"amount": 100, "currency": "DOLLARS", "gateway": "mock", "merchantApiKey": api_key}), "INVALID_CURRENCY"),
        (json!({"amount": 100, "currency": "USD", "gateway": "paypal", "merchantApiKey": api_key}), "UNSUPPORTED_GATEWAY"),
        // stripe is a known kind but not enabled in the test registry
        (json!({"amount": 100, "currency": "USD", "gateway": "stripe", "merchantApiKey": api_key}), "UNSUPPORTED_GATEWAY"),
    ];

    for (body, expected_code) in cases {
        let (status, response) =
            common::post_json(ctx.router(), "/v1/payments", Some(&format!("idem-{}", Uuid::new_v4())), &body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body: {}", body);
        assert_eq!(response["error"]["code"], expected_code, "body: {}", body);
    }
}

#[tokio::test]
async fn get_payment_returns_attempts_and_refunds() {
    let pool = common::get_test_pool().await;
    let ctx = common::TestCtx::new(pool.clone(), MockGatewayConfig::default());
    let (_, api_key) = common::seed_merchant(&pool).await;

    let (_, created) = common::post_json(
        ctx.router(),
        "/v1/payments",
        Some("idem-get"),
        &json!({
            "amount": 1500,
            "currency": "USD",
            "gateway": "mock",
            "merchantApiKey": api_key,
        }),
    )
    .await;
    let payment_id = created["data"]["id"].as_str().unwrap();

    let (status, body) = common::get_json(
        ctx.router(),
        &format!("/v1/payments/{}?merchantApiKey={}", payment_id, api_key),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], created["data"]["id"]);
    assert_eq!(body["data"]["attempts"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["attempts"][0]["attemptNo"], 1);
    assert_eq!(body["data"]["refunds"].as_array().unwrap().len(), 0);

    // Another merchant cannot see it
    let (_, other_key) = common::seed_merchant(&pool).await;
    let (status, body) = common::get_json(
        ctx.router(),
        &format!("/v1/payments/{}?merchantApiKey={}", payment_id, other_key),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "PAYMENT_NOT_FOUND");
}

#[tokio::test]
async fn list_payments_paginates_and_filters() {
    let pool = common::get_test_pool().await;
    let ctx = common::TestCtx::new(pool.clone(), MockGatewayConfig::default());
    let (_, api_key) = common::seed_merchant(&pool).await;

    for i in 0..3 {
        let (status, _) = common::post_json(
            ctx.router(),
            "/v1/payments",
            Some(&format!("idem-list-{}", i)),
            &json!({
                "amount": 100 + i,
                "currency": "USD",
                "gateway": "mock",
                "merchantApiKey": api_key,
            }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = common::get_json(
        ctx.router(),
        &format!("/v1/payments?merchantApiKey={}&limit=2&offset=0", api_key),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
    assert_eq!(body["pagination"]["total"], 3);
    assert_eq!(body["pagination"]["hasMore"], true);

    let (_, page2) = common::get_json(
        ctx.router(),
        &format!("/v1/payments?merchantApiKey={}&limit=2&offset=2", api_key),
    )
    .await;
    assert_eq!(page2["data"].as_array().unwrap().len(), 1);
    assert_eq!(page2["pagination"]["hasMore"], false);

    let (_, filtered) = common::get_json(
        ctx.router(),
        &format!(
            "/v1/payments?merchantApiKey={}&status=succeeded",
            api_key
        ),
    )
    .await;
    assert_eq!(filtered["pagination"]["total"], 3);

    let (_, none) = common::get_json(
        ctx.router(),
        &format!("/v1/payments?merchantApiKey={}&status=failed", api_key),
    )
    .await;
    assert_eq!(none["pagination"]["total"], 0);
}
