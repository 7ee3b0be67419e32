use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::models::WebhookDelivery;

const DELIVERY_COLUMNS: &str = "id, endpoint_id, event_id, status, attempt_count, last_error, \
     next_retry_at, created_at, updated_at";

pub async fn insert_pending(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    endpoint_id: Uuid,
    event_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO webhook_deliveries (id, endpoint_id, event_id, status, attempt_count)
        VALUES ($1, $2, $3, 'PENDING', 0)
        "#,
    )
    .bind(id)
    .bind(endpoint_id)
    .bind(event_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn find_by_id(
    pool: &PgPool,
    id: Uuid,
) -> Result<Option<WebhookDelivery>, sqlx::Error> {
    sqlx::query_as::<_, WebhookDelivery>(&format!(
        "SELECT {} FROM webhook_deliveries WHERE id = $1",
        DELIVERY_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Claim one attempt by bumping `attempt_count`, predicated on the count the
/// caller observed
///
/// The increment lands before the HTTP call: a crash between POST and the
/// outcome write still counts the attempt (at-least-once). A `None` return
/// means another consumer won the claim or the delivery already reached a
/// terminal state; the caller drops the work unit.
pub async fn claim_attempt(
    pool: &PgPool,
    id: Uuid,
    observed_attempt_count: i32,
) -> Result<Option<i32>, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        UPDATE webhook_deliveries
        SET attempt_count = attempt_count + 1, updated_at = NOW()
        WHERE id = $1
          AND attempt_count = $2
          AND status IN ('PENDING', 'FAILED')
        RETURNING attempt_count
        "#,
    )
    .bind(id)
    .bind(observed_attempt_count)
    .fetch_optional(pool)
    .await
}

pub async fn mark_delivered(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE webhook_deliveries
        SET status = 'DELIVERED', last_error = NULL, next_retry_at = NULL, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_failed(
    pool: &PgPool,
    id: Uuid,
    last_error: &str,
    next_retry_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE webhook_deliveries
        SET status = 'FAILED', last_error = $2, next_retry_at = $3, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(last_error)
    .bind(next_retry_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Returns false when the row already reached a terminal state, which a
/// racing consumer may have produced; terminal states are never overwritten
pub async fn mark_abandoned(
    pool: &PgPool,
    id: Uuid,
    last_error: Option<&str>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE webhook_deliveries
        SET status = 'ABANDONED', last_error = COALESCE($2, last_error), next_retry_at = NULL,
            updated_at = NOW()
        WHERE id = $1 AND status IN ('PENDING', 'FAILED')
        "#,
    )
    .bind(id)
    .bind(last_error)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// PENDING deliveries that never got a first attempt
///
/// Covers the crash window between the drainer's commit and its queue push;
/// the store stays authoritative over the queue.
pub async fn stale_pending(
    pool: &PgPool,
    older_than_secs: i64,
    limit: i64,
) -> Result<Vec<Uuid>, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT id
        FROM webhook_deliveries
        WHERE status = 'PENDING'
          AND attempt_count = 0
          AND created_at <= NOW() - make_interval(secs => $1::float8)
        ORDER BY created_at ASC
        LIMIT $2
        "#,
    )
    .bind(older_than_secs as f64)
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// FAILED deliveries whose retry time has come, oldest due first
pub async fn due_for_retry(
    pool: &PgPool,
    max_attempts: i32,
    limit: i64,
) -> Result<Vec<Uuid>, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT id
        FROM webhook_deliveries
        WHERE status = 'FAILED' AND next_retry_at <= NOW() AND attempt_count < $1
        ORDER BY next_retry_at ASC
        LIMIT $2
        "#,
    )
    .bind(max_attempts)
    .bind(limit)
    .fetch_all(pool)
    .await
}
