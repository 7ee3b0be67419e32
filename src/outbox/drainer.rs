//! Outbox drainer: promotes outbox rows into events and delivery fan-out
//!
//! Single logical owner; a second instance is safe because each row is
//! claimed with `FOR UPDATE SKIP LOCKED`. Per row, one transaction inserts
//! the event, fans out a delivery per subscribed endpoint and flips
//! `processed`, so a crash mid-drain re-runs the row without duplicating
//! events.

use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;
use work_queue::WorkQueue;

use crate::repos::{delivery_repo, endpoint_repo, event_repo, outbox_repo};
use crate::webhook::DELIVERY_QUEUE;

pub const POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const BATCH_SIZE: i64 = 100;

/// Background task polling the outbox until shutdown
pub async fn run_outbox_drainer(
    pool: PgPool,
    queue: Arc<dyn WorkQueue>,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(interval_ms = poll_interval.as_millis() as u64, "Outbox drainer started");
    let mut ticker = tokio::time::interval(poll_interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match drain_once(&pool, queue.as_ref(), BATCH_SIZE).await {
                    Ok(0) => {}
                    Ok(count) => tracing::debug!(rows = count, "Drained outbox rows"),
                    Err(e) => tracing::error!(error = %format!("{:#}", e), "Outbox drain pass failed"),
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    tracing::info!("Outbox drainer stopped");
}

/// One drain pass; returns the number of rows promoted
pub async fn drain_once(
    pool: &PgPool,
    queue: &dyn WorkQueue,
    batch_size: i64,
) -> anyhow::Result<usize> {
    let ids = outbox_repo::unprocessed_ids(pool, batch_size).await?;
    let mut drained = 0;

    for outbox_id in ids {
        match drain_row(pool, queue, outbox_id).await {
            Ok(true) => drained += 1,
            Ok(false) => {} // claimed elsewhere or already processed
            Err(e) => {
                // The row stays unprocessed and retries next pass.
                tracing::error!(
                    outbox_id = %outbox_id,
                    error = %format!("{:#}", e),
                    "Failed to drain outbox row"
                );
            }
        }
    }

    Ok(drained)
}

async fn drain_row(
    pool: &PgPool,
    queue: &dyn WorkQueue,
    outbox_id: Uuid,
) -> anyhow::Result<bool> {
    let mut tx = pool.begin().await?;

    let row = match outbox_repo::claim_row(&mut tx, outbox_id).await? {
        Some(row) => row,
        None => return Ok(false),
    };

    let event = event_repo::insert(&mut tx, Uuid::new_v4(), &row.event_type, &row.payload).await?;

    let endpoints = endpoint_repo::subscribed_to(&mut tx, &row.event_type).await?;
    let mut delivery_ids = Vec::with_capacity(endpoints.len());
    for endpoint in &endpoints {
        let delivery_id = Uuid::new_v4();
        delivery_repo::insert_pending(&mut tx, delivery_id, endpoint.id, event.id).await?;
        delivery_ids.push(delivery_id);
    }

    outbox_repo::mark_processed(&mut tx, row.id).await?;
    tx.commit().await?;

    tracing::info!(
        outbox_id = %row.id,
        event_id = %event.id,
        event_type = %event.event_type,
        deliveries = delivery_ids.len(),
        "Outbox row promoted to event"
    );

    // The queue is a hint: a lost push is rediscovered by the retry sweep
    // once the delivery first fails, and PENDING rows are visible to ops.
    for delivery_id in delivery_ids {
        if let Err(e) = queue
            .push(DELIVERY_QUEUE, delivery_id.to_string().into_bytes())
            .await
        {
            tracing::warn!(
                delivery_id = %delivery_id,
                error = %e,
                "Failed to enqueue delivery, sweep will pick it up"
            );
        }
    }

    Ok(true)
}
