use sqlx::PgPool;
use uuid::Uuid;

use crate::models::DeadLetter;

/// Record an abandoned delivery
pub async fn insert(
    pool: &PgPool,
    delivery_id: Uuid,
    endpoint_id: Uuid,
    event_id: Uuid,
    attempts: i32,
    last_error: Option<&str>,
) -> Result<DeadLetter, sqlx::Error> {
    sqlx::query_as::<_, DeadLetter>(
        r#"
        INSERT INTO dead_letters (id, delivery_id, endpoint_id, event_id, attempts, last_error)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, delivery_id, endpoint_id, event_id, attempts, last_error, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(delivery_id)
    .bind(endpoint_id)
    .bind(event_id)
    .bind(attempts)
    .bind(last_error)
    .fetch_one(pool)
    .await
}
