//! Outbox repository for reliable event publication
//!
//! Rows are written in the same transaction as the state change they
//! describe and later promoted into events by the drainer exactly once.

use serde_json::Value as JsonValue;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::models::OutboxRow;

const OUTBOX_COLUMNS: &str =
    "id, aggregate_type, aggregate_id, event_type, payload, processed, created_at";

/// Append an outbox row inside the caller's transaction
pub async fn insert(
    tx: &mut Transaction<'_, Postgres>,
    aggregate_type: &str,
    aggregate_id: Uuid,
    event_type: &str,
    payload: &JsonValue,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO outbox (id, aggregate_type, aggregate_id, event_type, payload)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(aggregate_type)
    .bind(aggregate_id)
    .bind(event_type)
    .bind(payload)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Unprocessed row ids, oldest first
pub async fn unprocessed_ids(pool: &PgPool, limit: i64) -> Result<Vec<Uuid>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT id FROM outbox WHERE processed = FALSE ORDER BY created_at ASC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Claim a single row for draining
///
/// `FOR UPDATE SKIP LOCKED` keeps concurrent drainer instances from
/// double-draining a row; the claim holds until the caller's transaction
/// commits with `processed = true`. Returns `None` when the row is gone,
/// already processed, or locked by another instance.
pub async fn claim_row(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> Result<Option<OutboxRow>, sqlx::Error> {
    sqlx::query_as::<_, OutboxRow>(&format!(
        r#"
        SELECT {}
        FROM outbox
        WHERE id = $1 AND processed = FALSE
        FOR UPDATE SKIP LOCKED
        "#,
        OUTBOX_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut **tx)
    .await
}

pub async fn mark_processed(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE outbox SET processed = TRUE WHERE id = $1")
        .bind(id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}
