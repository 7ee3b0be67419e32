pub mod dead_letter_repo;
pub mod delivery_repo;
pub mod endpoint_repo;
pub mod event_repo;
pub mod merchant_repo;
pub mod outbox_repo;
pub mod payment_repo;
pub mod refund_repo;

/// Postgres unique-constraint violation (SQLSTATE 23505)
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}
