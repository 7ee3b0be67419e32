use sqlx::PgPool;
use uuid::Uuid;

use crate::models::Merchant;

pub async fn find_by_api_key_hash(
    pool: &PgPool,
    api_key_hash: &str,
) -> Result<Option<Merchant>, sqlx::Error> {
    sqlx::query_as::<_, Merchant>(
        r#"
        SELECT id, name, api_key_hash, created_at
        FROM merchants
        WHERE api_key_hash = $1
        "#,
    )
    .bind(api_key_hash)
    .fetch_optional(pool)
    .await
}

pub async fn insert(
    pool: &PgPool,
    name: &str,
    api_key_hash: &str,
) -> Result<Merchant, sqlx::Error> {
    sqlx::query_as::<_, Merchant>(
        r#"
        INSERT INTO merchants (id, name, api_key_hash)
        VALUES ($1, $2, $3)
        RETURNING id, name, api_key_hash, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(api_key_hash)
    .fetch_one(pool)
    .await
}
