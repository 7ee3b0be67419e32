mod common;

use axum::http::StatusCode;
use serde_json::json;

use openpayflow::gateway::MockGatewayConfig;

async fn create_succeeded_payment(
    ctx: &common::TestCtx,
    api_key: &str,
    amount: i64,
    idem: &str,
) -> String {
    let (status, body) = common::post_json(
        ctx.router(),
        "/v1/payments",
        Some(idem),
        &json!({
            "amount": amount,
            "currency": "USD",
            "gateway": "mock",
            "merchantApiKey": api_key,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "payment seed failed: {}", body);
    body["data"]["id"].as_str().unwrap().to_string()
}

/// Partial refund succeeds, the over-refund is rejected with no row
#[tokio::test]
async fn refund_sum_is_bounded_by_payment_amount() {
    let pool = common::get_test_pool().await;
    let ctx = common::TestCtx::new(pool.clone(), MockGatewayConfig::default());
    let (_, api_key) = common::seed_merchant(&pool).await;
    let payment_id = create_succeeded_payment(&ctx, &api_key, 1000, "idem-refund-1").await;

    let (status, body) = common::post_json(
        ctx.router(),
        "/v1/refunds",
        None,
        &json!({
            "paymentId": payment_id,
            "amount": 600,
            "merchantApiKey": api_key,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"], "succeeded");
    assert_eq!(body["data"]["amount"], 600);

    let (status, body) = common::post_json(
        ctx.router(),
        "/v1/refunds",
        None,
        &json!({
            "paymentId": payment_id,
            "amount": 500,
            "merchantApiKey": api_key,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "REFUND_AMOUNT_EXCEEDS_PAYMENT");

    let refund_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM refunds WHERE payment_id = $1::uuid")
            .bind(&payment_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(refund_count, 1, "rejected refund must not leave a row");

    // The remaining 400 still goes through
    let (status, body) = common::post_json(
        ctx.router(),
        "/v1/refunds",
        None,
        &json!({
            "paymentId": payment_id,
            "amount": 400,
            "merchantApiKey": api_key,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"], "succeeded");
}

/// Omitted amount refunds whatever is left
#[tokio::test]
async fn refund_defaults_to_remaining_amount() {
    let pool = common::get_test_pool().await;
    let ctx = common::TestCtx::new(pool.clone(), MockGatewayConfig::default());
    let (_, api_key) = common::seed_merchant(&pool).await;
    let payment_id = create_succeeded_payment(&ctx, &api_key, 2000, "idem-refund-2").await;

    let (status, _) = common::post_json(
        ctx.router(),
        "/v1/refunds",
        None,
        &json!({
            "paymentId": payment_id,
            "amount": 1500,
            "merchantApiKey": api_key,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = common::post_json(
        ctx.router(),
        "/v1/refunds",
        None,
        &json!({
            "paymentId": payment_id,
            "merchantApiKey": api_key,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["amount"], 500);

    // Fully refunded now; a further default-amount refund has nothing left
    let (status, body) = common::post_json(
        ctx.router(),
        "/v1/refunds",
        None,
        &json!({
            "paymentId": payment_id,
            "merchantApiKey": api_key,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "REFUND_AMOUNT_EXCEEDS_PAYMENT");
}

#[tokio::test]
async fn refund_requires_succeeded_parent() {
    let pool = common::get_test_pool().await;
    let failing = common::TestCtx::new(
        pool.clone(),
        MockGatewayConfig {
            success_rate: 0.0,
            ..Default::default()
        },
    );
    let (merchant, api_key) = common::seed_merchant(&pool).await;

    let (status, _) = common::post_json(
        failing.router(),
        "/v1/payments",
        Some("idem-refund-3"),
        &json!({
            "amount": 1000,
            "currency": "USD",
            "gateway": "mock",
            "merchantApiKey": api_key,
        }),
    )
    .await;
    assert!(status.is_server_error());

    let payment_id: uuid::Uuid = sqlx::query_scalar(
        "SELECT id FROM payments WHERE merchant_id = $1 AND idempotency_key = 'idem-refund-3'",
    )
    .bind(merchant.id)
    .fetch_one(&pool)
    .await
    .unwrap();

    let (status, body) = common::post_json(
        failing.router(),
        "/v1/refunds",
        None,
        &json!({
            "paymentId": payment_id,
            "amount": 100,
            "merchantApiKey": api_key,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "PAYMENT_NOT_REFUNDABLE");
}

#[tokio::test]
async fn refund_unknown_payment_is_404() {
    let pool = common::get_test_pool().await;
    let ctx = common::TestCtx::new(pool.clone(), MockGatewayConfig::default());
    let (_, api_key) = common::seed_merchant(&pool).await;

    let (status, body) = common::post_json(
        ctx.router(),
        "/v1/refunds",
        None,
        &json!({
            "paymentId": uuid::Uuid::new_v4(),
            "amount": 100,
            "merchantApiKey": api_key,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "PAYMENT_NOT_FOUND");
}

/// A refund row lands in the outbox in the same transaction as its settle
#[tokio::test]
async fn refund_appends_outbox_row() {
    let pool = common::get_test_pool().await;
    let ctx = common::TestCtx::new(pool.clone(), MockGatewayConfig::default());
    let (_, api_key) = common::seed_merchant(&pool).await;
    let payment_id = create_succeeded_payment(&ctx, &api_key, 800, "idem-refund-4").await;

    let (_, body) = common::post_json(
        ctx.router(),
        "/v1/refunds",
        None,
        &json!({
            "paymentId": payment_id,
            "amount": 800,
            "merchantApiKey": api_key,
        }),
    )
    .await;
    let refund_id = body["data"]["id"].as_str().unwrap();

    let outbox_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM outbox WHERE aggregate_id = $1::uuid AND event_type = 'refund.created'",
    )
    .bind(refund_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(outbox_count, 1);
}
