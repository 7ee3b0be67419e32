use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::models::{GatewayKind, Payment, PaymentAttempt, PaymentStatus};

const PAYMENT_COLUMNS: &str = "id, merchant_id, amount, currency, status, gateway, \
     provider_payment_id, idempotency_key, metadata, created_at, updated_at";

const ATTEMPT_COLUMNS: &str = "id, payment_id, attempt_no, status, error_code, error_message, \
     provider_response, created_at, updated_at";

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Payment>, sqlx::Error> {
    sqlx::query_as::<_, Payment>(&format!(
        "SELECT {} FROM payments WHERE id = $1",
        PAYMENT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn find_for_merchant(
    pool: &PgPool,
    id: Uuid,
    merchant_id: Uuid,
) -> Result<Option<Payment>, sqlx::Error> {
    sqlx::query_as::<_, Payment>(&format!(
        "SELECT {} FROM payments WHERE id = $1 AND merchant_id = $2",
        PAYMENT_COLUMNS
    ))
    .bind(id)
    .bind(merchant_id)
    .fetch_optional(pool)
    .await
}

pub async fn find_by_idempotency_key(
    pool: &PgPool,
    merchant_id: Uuid,
    idempotency_key: &str,
) -> Result<Option<Payment>, sqlx::Error> {
    sqlx::query_as::<_, Payment>(&format!(
        "SELECT {} FROM payments WHERE merchant_id = $1 AND idempotency_key = $2",
        PAYMENT_COLUMNS
    ))
    .bind(merchant_id)
    .bind(idempotency_key)
    .fetch_optional(pool)
    .await
}

#[allow(clippy::too_many_arguments)]
pub async fn insert(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    merchant_id: Uuid,
    amount: i64,
    currency: &str,
    gateway: GatewayKind,
    idempotency_key: &str,
    metadata: Option<&JsonValue>,
) -> Result<Payment, sqlx::Error> {
    sqlx::query_as::<_, Payment>(&format!(
        r#"
        INSERT INTO payments
            (id, merchant_id, amount, currency, status, gateway, idempotency_key, metadata)
        VALUES ($1, $2, $3, $4, 'PENDING', $5, $6, $7)
        RETURNING {}
        "#,
        PAYMENT_COLUMNS
    ))
    .bind(id)
    .bind(merchant_id)
    .bind(amount)
    .bind(currency)
    .bind(gateway)
    .bind(idempotency_key)
    .bind(metadata)
    .fetch_one(&mut **tx)
    .await
}

pub async fn insert_attempt(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    payment_id: Uuid,
    attempt_no: i32,
) -> Result<PaymentAttempt, sqlx::Error> {
    sqlx::query_as::<_, PaymentAttempt>(&format!(
        r#"
        INSERT INTO payment_attempts (id, payment_id, attempt_no, status)
        VALUES ($1, $2, $3, 'PENDING')
        RETURNING {}
        "#,
        ATTEMPT_COLUMNS
    ))
    .bind(id)
    .bind(payment_id)
    .bind(attempt_no)
    .fetch_one(&mut **tx)
    .await
}

/// Advance payment and attempt to PROCESSING ahead of the gateway call
pub async fn mark_processing(
    pool: &PgPool,
    payment_id: Uuid,
    attempt_id: Uuid,
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE payments SET status = 'PROCESSING', updated_at = NOW() WHERE id = $1")
        .bind(payment_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query(
        "UPDATE payment_attempts SET status = 'PROCESSING', updated_at = NOW() WHERE id = $1",
    )
    .bind(attempt_id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(())
}

pub async fn settle(
    tx: &mut Transaction<'_, Postgres>,
    payment_id: Uuid,
    status: PaymentStatus,
    provider_payment_id: Option<&str>,
) -> Result<Payment, sqlx::Error> {
    sqlx::query_as::<_, Payment>(&format!(
        r#"
        UPDATE payments
        SET status = $2, provider_payment_id = COALESCE($3, provider_payment_id),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        PAYMENT_COLUMNS
    ))
    .bind(payment_id)
    .bind(status)
    .bind(provider_payment_id)
    .fetch_one(&mut **tx)
    .await
}

#[allow(clippy::too_many_arguments)]
pub async fn settle_attempt(
    tx: &mut Transaction<'_, Postgres>,
    attempt_id: Uuid,
    status: PaymentStatus,
    provider_response: Option<&JsonValue>,
    error_code: Option<&str>,
    error_message: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE payment_attempts
        SET status = $2, provider_response = $3, error_code = $4, error_message = $5,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(attempt_id)
    .bind(status)
    .bind(provider_response)
    .bind(error_code)
    .bind(error_message)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn recent_attempts(
    pool: &PgPool,
    payment_id: Uuid,
    limit: i64,
) -> Result<Vec<PaymentAttempt>, sqlx::Error> {
    sqlx::query_as::<_, PaymentAttempt>(&format!(
        "SELECT {} FROM payment_attempts WHERE payment_id = $1 ORDER BY attempt_no DESC LIMIT $2",
        ATTEMPT_COLUMNS
    ))
    .bind(payment_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}

#[derive(Debug, Default)]
pub struct PaymentFilter {
    pub status: Option<PaymentStatus>,
    pub gateway: Option<GatewayKind>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

pub async fn list_for_merchant(
    pool: &PgPool,
    merchant_id: Uuid,
    filter: &PaymentFilter,
    limit: i64,
    offset: i64,
) -> Result<(Vec<Payment>, i64), sqlx::Error> {
    // Optional filters collapse via `$n IS NULL OR ...` so one statement
    // covers every combination.
    let predicate = r#"
        merchant_id = $1
          AND ($2::text IS NULL OR status = $2)
          AND ($3::text IS NULL OR gateway = $3)
          AND ($4::timestamptz IS NULL OR created_at >= $4)
          AND ($5::timestamptz IS NULL OR created_at <= $5)
    "#;

    let status = filter.status.map(|s| s.as_db_str());
    let gateway = filter.gateway.map(|g| g.as_db_str());

    let total: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM payments WHERE {}",
        predicate
    ))
    .bind(merchant_id)
    .bind(status)
    .bind(gateway)
    .bind(filter.start_date)
    .bind(filter.end_date)
    .fetch_one(pool)
    .await?;

    let payments = sqlx::query_as::<_, Payment>(&format!(
        "SELECT {} FROM payments WHERE {} ORDER BY created_at DESC LIMIT $6 OFFSET $7",
        PAYMENT_COLUMNS, predicate
    ))
    .bind(merchant_id)
    .bind(status)
    .bind(gateway)
    .bind(filter.start_date)
    .bind(filter.end_date)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok((payments, total))
}
