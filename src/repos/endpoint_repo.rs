use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::models::WebhookEndpoint;

const ENDPOINT_COLUMNS: &str =
    "id, merchant_id, url, secret, events, is_active, created_at, updated_at";

pub async fn insert(
    pool: &PgPool,
    merchant_id: Uuid,
    url: &str,
    secret: &str,
    events: &[String],
) -> Result<WebhookEndpoint, sqlx::Error> {
    sqlx::query_as::<_, WebhookEndpoint>(&format!(
        r#"
        INSERT INTO webhook_endpoints (id, merchant_id, url, secret, events)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {}
        "#,
        ENDPOINT_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(merchant_id)
    .bind(url)
    .bind(secret)
    .bind(events)
    .fetch_one(pool)
    .await
}

pub async fn find_by_id(
    pool: &PgPool,
    id: Uuid,
) -> Result<Option<WebhookEndpoint>, sqlx::Error> {
    sqlx::query_as::<_, WebhookEndpoint>(&format!(
        "SELECT {} FROM webhook_endpoints WHERE id = $1",
        ENDPOINT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn find_for_merchant(
    pool: &PgPool,
    id: Uuid,
    merchant_id: Uuid,
) -> Result<Option<WebhookEndpoint>, sqlx::Error> {
    sqlx::query_as::<_, WebhookEndpoint>(&format!(
        "SELECT {} FROM webhook_endpoints WHERE id = $1 AND merchant_id = $2",
        ENDPOINT_COLUMNS
    ))
    .bind(id)
    .bind(merchant_id)
    .fetch_optional(pool)
    .await
}

pub async fn list_for_merchant(
    pool: &PgPool,
    merchant_id: Uuid,
) -> Result<Vec<WebhookEndpoint>, sqlx::Error> {
    sqlx::query_as::<_, WebhookEndpoint>(&format!(
        "SELECT {} FROM webhook_endpoints WHERE merchant_id = $1 ORDER BY created_at ASC",
        ENDPOINT_COLUMNS
    ))
    .bind(merchant_id)
    .fetch_all(pool)
    .await
}

pub async fn update(
    pool: &PgPool,
    id: Uuid,
    url: &str,
    secret: &str,
    events: &[String],
    is_active: bool,
) -> Result<WebhookEndpoint, sqlx::Error> {
    sqlx::query_as::<_, WebhookEndpoint>(&format!(
        r#"
        UPDATE webhook_endpoints
        SET url = $2, secret = $3, events = $4, is_active = $5, updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        ENDPOINT_COLUMNS
    ))
    .bind(id)
    .bind(url)
    .bind(secret)
    .bind(events)
    .bind(is_active)
    .fetch_one(pool)
    .await
}

pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM webhook_endpoints WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Active endpoints subscribed to an event type, read inside the drainer's
/// transaction
pub async fn subscribed_to(
    tx: &mut Transaction<'_, Postgres>,
    event_type: &str,
) -> Result<Vec<WebhookEndpoint>, sqlx::Error> {
    sqlx::query_as::<_, WebhookEndpoint>(&format!(
        "SELECT {} FROM webhook_endpoints WHERE is_active AND $1 = ANY(events)",
        ENDPOINT_COLUMNS
    ))
    .bind(event_type)
    .fetch_all(&mut **tx)
    .await
}
