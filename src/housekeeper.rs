//! Periodic reaper for processed outbox rows, delivered webhook rows and
//! aged events
//!
//! All three jobs are idempotent bounded-batch deletes; a pass that dies
//! mid-way just leaves work for the next tick.

use sqlx::PgPool;
use std::time::Duration;
use tokio::sync::watch;

pub const RUN_INTERVAL: Duration = Duration::from_secs(60 * 60);
const BATCH: i64 = 500;

pub const OUTBOX_RETENTION_DAYS: i32 = 7;
pub const DELIVERY_RETENTION_DAYS: i32 = 30;
pub const EVENT_RETENTION_DAYS: i32 = 90;

pub async fn run_housekeeper(
    pool: PgPool,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(interval_ms = interval.as_millis() as u64, "Housekeeper started");
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match run_once(&pool).await {
                    Ok((outbox, deliveries, events)) => {
                        if outbox + deliveries + events > 0 {
                            tracing::info!(
                                outbox_rows = outbox,
                                delivery_rows = deliveries,
                                event_rows = events,
                                "Housekeeping pass reaped rows"
                            );
                        }
                    }
                    Err(e) => tracing::error!(error = %format!("{:#}", e), "Housekeeping pass failed"),
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    tracing::info!("Housekeeper stopped");
}

pub async fn run_once(pool: &PgPool) -> anyhow::Result<(u64, u64, u64)> {
    let outbox = reap_processed_outbox(pool).await?;
    let deliveries = reap_delivered(pool).await?;
    let events = reap_aged_events(pool).await?;
    Ok((outbox, deliveries, events))
}

async fn reap_processed_outbox(pool: &PgPool) -> anyhow::Result<u64> {
    let result = sqlx::query(
        r#"
        DELETE FROM outbox
        WHERE id IN (
            SELECT id FROM outbox
            WHERE processed = TRUE
              AND created_at < NOW() - make_interval(days => $1)
            LIMIT $2
        )
        "#,
    )
    .bind(OUTBOX_RETENTION_DAYS)
    .bind(BATCH)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

async fn reap_delivered(pool: &PgPool) -> anyhow::Result<u64> {
    let result = sqlx::query(
        r#"
        DELETE FROM webhook_deliveries
        WHERE id IN (
            SELECT id FROM webhook_deliveries
            WHERE status = 'DELIVERED'
              AND created_at < NOW() - make_interval(days => $1)
            LIMIT $2
        )
        "#,
    )
    .bind(DELIVERY_RETENTION_DAYS)
    .bind(BATCH)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Events age out once no non-terminal delivery references them; terminal
/// deliveries go with the event via the FK cascade
async fn reap_aged_events(pool: &PgPool) -> anyhow::Result<u64> {
    let result = sqlx::query(
        r#"
        DELETE FROM events
        WHERE id IN (
            SELECT e.id FROM events e
            WHERE e.created_at < NOW() - make_interval(days => $1)
              AND NOT EXISTS (
                  SELECT 1 FROM webhook_deliveries d
                  WHERE d.event_id = e.id
                    AND d.status NOT IN ('DELIVERED', 'ABANDONED')
              )
            LIMIT $2
        )
        "#,
    )
    .bind(EVENT_RETENTION_DAYS)
    .bind(BATCH)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
