use serde_json::Value as JsonValue;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::models::Event;

const EVENT_COLUMNS: &str = "id, type, payload, created_at";

pub async fn insert(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    event_type: &str,
    payload: &JsonValue,
) -> Result<Event, sqlx::Error> {
    sqlx::query_as::<_, Event>(&format!(
        r#"
        INSERT INTO events (id, type, payload)
        VALUES ($1, $2, $3)
        RETURNING {}
        "#,
        EVENT_COLUMNS
    ))
    .bind(id)
    .bind(event_type)
    .bind(payload)
    .fetch_one(&mut **tx)
    .await
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Event>, sqlx::Error> {
    sqlx::query_as::<_, Event>(&format!(
        "SELECT {} FROM events WHERE id = $1",
        EVENT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}
