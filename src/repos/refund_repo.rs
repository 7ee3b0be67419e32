use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::models::{Refund, RefundStatus};

const REFUND_COLUMNS: &str =
    "id, payment_id, amount, status, reason, provider_refund_id, created_at, updated_at";

/// Sum of SUCCEEDED refunds for a payment, read inside the caller's
/// transaction so the over-refund guard observes a consistent snapshot
pub async fn sum_succeeded(
    tx: &mut Transaction<'_, Postgres>,
    payment_id: Uuid,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(amount), 0)::bigint
        FROM refunds
        WHERE payment_id = $1 AND status = 'SUCCEEDED'
        "#,
    )
    .bind(payment_id)
    .fetch_one(&mut **tx)
    .await
}

pub async fn insert(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    payment_id: Uuid,
    amount: i64,
    reason: Option<&str>,
) -> Result<Refund, sqlx::Error> {
    sqlx::query_as::<_, Refund>(&format!(
        r#"
        INSERT INTO refunds (id, payment_id, amount, status, reason)
        VALUES ($1, $2, $3, 'PENDING', $4)
        RETURNING {}
        "#,
        REFUND_COLUMNS
    ))
    .bind(id)
    .bind(payment_id)
    .bind(amount)
    .bind(reason)
    .fetch_one(&mut **tx)
    .await
}

pub async fn mark_processing(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE refunds SET status = 'PROCESSING', updated_at = NOW() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn settle(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    status: RefundStatus,
    provider_refund_id: Option<&str>,
) -> Result<Refund, sqlx::Error> {
    sqlx::query_as::<_, Refund>(&format!(
        r#"
        UPDATE refunds
        SET status = $2, provider_refund_id = COALESCE($3, provider_refund_id),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        REFUND_COLUMNS
    ))
    .bind(id)
    .bind(status)
    .bind(provider_refund_id)
    .fetch_one(&mut **tx)
    .await
}

pub async fn list_for_payment(
    pool: &PgPool,
    payment_id: Uuid,
) -> Result<Vec<Refund>, sqlx::Error> {
    sqlx::query_as::<_, Refund>(&format!(
        "SELECT {} FROM refunds WHERE payment_id = $1 ORDER BY created_at ASC",
        REFUND_COLUMNS
    ))
    .bind(payment_id)
    .fetch_all(pool)
    .await
}
