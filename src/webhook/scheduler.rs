//! Webhook scheduler: queue consumer and retry sweep
//!
//! Two input surfaces feed [`process_delivery`]: the work queue (fresh
//! deliveries enqueued by the drainer) and the periodic sweep over the
//! store (due retries plus stale PENDING rows whose enqueue was lost).
//! Concurrent claims are resolved optimistically: the attempt-count bump is
//! predicated on the count the claimant observed, and the loser drops the
//! work unit.

use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;
use work_queue::WorkQueue;

use super::backoff;
use super::sender::WebhookSender;
use super::{DEAD_LETTER_QUEUE, DELIVERY_QUEUE};
use crate::repos::{dead_letter_repo, delivery_repo, endpoint_repo, event_repo};

pub const SWEEP_INTERVAL: Duration = Duration::from_secs(30);
pub const SWEEP_BATCH: i64 = 50;
const STALE_PENDING_AFTER_SECS: i64 = 60;
const POP_WAIT: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct SchedulerContext {
    pub pool: PgPool,
    pub queue: Arc<dyn WorkQueue>,
    pub sender: WebhookSender,
    pub max_attempts: i32,
}

/// Background task draining the work queue until shutdown
pub async fn run_queue_consumer(ctx: SchedulerContext, mut shutdown: watch::Receiver<bool>) {
    tracing::info!("Webhook queue consumer started");

    loop {
        tokio::select! {
            item = ctx.queue.pop(DELIVERY_QUEUE, POP_WAIT) => {
                match item {
                    Ok(Some(bytes)) => {
                        let delivery_id = std::str::from_utf8(&bytes)
                            .ok()
                            .and_then(|s| Uuid::parse_str(s).ok());
                        match delivery_id {
                            Some(id) => {
                                if let Err(e) = process_delivery(&ctx, id).await {
                                    tracing::error!(
                                        delivery_id = %id,
                                        error = %format!("{:#}", e),
                                        "Delivery processing failed"
                                    );
                                }
                            }
                            None => tracing::warn!("Discarding malformed queue item"),
                        }
                    }
                    Ok(None) => {} // wait elapsed, poll again
                    Err(e) => {
                        tracing::error!(error = %e, "Queue pop failed");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    tracing::info!("Webhook queue consumer stopped");
}

/// Background task re-discovering due work from the store until shutdown
pub async fn run_retry_sweep(
    ctx: SchedulerContext,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(interval_ms = interval.as_millis() as u64, "Webhook retry sweep started");
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match sweep_once(&ctx).await {
                    Ok(0) => {}
                    Ok(count) => tracing::debug!(deliveries = count, "Retry sweep processed deliveries"),
                    Err(e) => tracing::error!(error = %format!("{:#}", e), "Retry sweep failed"),
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    tracing::info!("Webhook retry sweep stopped");
}

/// One sweep pass; returns the number of deliveries attempted
pub async fn sweep_once(ctx: &SchedulerContext) -> anyhow::Result<usize> {
    let due = delivery_repo::due_for_retry(&ctx.pool, ctx.max_attempts, SWEEP_BATCH).await?;
    let stale =
        delivery_repo::stale_pending(&ctx.pool, STALE_PENDING_AFTER_SECS, SWEEP_BATCH).await?;

    let mut processed = 0;
    for delivery_id in due.into_iter().chain(stale) {
        match process_delivery(ctx, delivery_id).await {
            Ok(()) => processed += 1,
            Err(e) => tracing::error!(
                delivery_id = %delivery_id,
                error = %format!("{:#}", e),
                "Sweep delivery failed"
            ),
        }
    }
    Ok(processed)
}

/// Attempt one delivery end to end
pub async fn process_delivery(ctx: &SchedulerContext, delivery_id: Uuid) -> anyhow::Result<()> {
    let delivery = match delivery_repo::find_by_id(&ctx.pool, delivery_id).await? {
        Some(delivery) => delivery,
        None => {
            tracing::debug!(delivery_id = %delivery_id, "Delivery row gone, dropping");
            return Ok(());
        }
    };

    if delivery.status.is_terminal() {
        // Idempotent late arrival, e.g. a queue item raced the sweep.
        tracing::debug!(
            delivery_id = %delivery_id,
            status = %delivery.status.as_db_str(),
            "Delivery already terminal, dropping"
        );
        return Ok(());
    }

    if delivery.attempt_count >= ctx.max_attempts {
        abandon(
            ctx,
            delivery.id,
            delivery.endpoint_id,
            delivery.event_id,
            delivery.attempt_count,
            delivery.last_error.as_deref(),
        )
        .await?;
        return Ok(());
    }

    let endpoint = match endpoint_repo::find_by_id(&ctx.pool, delivery.endpoint_id).await? {
        Some(endpoint) => endpoint,
        None => {
            tracing::warn!(
                delivery_id = %delivery_id,
                endpoint_id = %delivery.endpoint_id,
                "Endpoint gone, dropping delivery"
            );
            return Ok(());
        }
    };
    let event = match event_repo::find_by_id(&ctx.pool, delivery.event_id).await? {
        Some(event) => event,
        None => {
            tracing::warn!(
                delivery_id = %delivery_id,
                event_id = %delivery.event_id,
                "Event gone, dropping delivery"
            );
            return Ok(());
        }
    };

    // Persist the attempt before the POST; a crash after the POST still
    // counts it and the receiver tolerates the duplicate.
    let attempt_count =
        match delivery_repo::claim_attempt(&ctx.pool, delivery.id, delivery.attempt_count).await? {
            Some(count) => count,
            None => {
                tracing::debug!(delivery_id = %delivery_id, "Lost attempt claim, dropping");
                return Ok(());
            }
        };

    match ctx.sender.send(&endpoint, &event, delivery.id).await {
        Ok(()) => {
            delivery_repo::mark_delivered(&ctx.pool, delivery.id).await?;
            tracing::info!(
                delivery_id = %delivery.id,
                endpoint_id = %endpoint.id,
                event_id = %event.id,
                attempt = attempt_count,
                "Webhook delivered"
            );
        }
        Err(err) => {
            let last_error = err.to_string();
            if attempt_count >= ctx.max_attempts {
                abandon(
                    ctx,
                    delivery.id,
                    delivery.endpoint_id,
                    delivery.event_id,
                    attempt_count,
                    Some(&last_error),
                )
                .await?;
            } else {
                let delay = backoff::retry_delay(attempt_count);
                let next_retry_at = Utc::now()
                    + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
                delivery_repo::mark_failed(&ctx.pool, delivery.id, &last_error, next_retry_at)
                    .await?;
                tracing::warn!(
                    delivery_id = %delivery.id,
                    endpoint_id = %endpoint.id,
                    attempt = attempt_count,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %last_error,
                    "Webhook attempt failed, retry scheduled"
                );
            }
        }
    }

    Ok(())
}

/// Terminal failure: ABANDONED status plus a dead-letter record
async fn abandon(
    ctx: &SchedulerContext,
    delivery_id: Uuid,
    endpoint_id: Uuid,
    event_id: Uuid,
    attempts: i32,
    last_error: Option<&str>,
) -> anyhow::Result<()> {
    if !delivery_repo::mark_abandoned(&ctx.pool, delivery_id, last_error).await? {
        tracing::debug!(delivery_id = %delivery_id, "Delivery reached a terminal state elsewhere");
        return Ok(());
    }
    let record = dead_letter_repo::insert(
        &ctx.pool,
        delivery_id,
        endpoint_id,
        event_id,
        attempts,
        last_error,
    )
    .await?;

    let message = serde_json::json!({
        "type": "webhook_delivery_abandoned",
        "deliveryId": delivery_id,
        "endpointId": endpoint_id,
        "eventId": event_id,
        "attempts": attempts,
        "lastError": last_error,
        "timestamp": record.created_at.to_rfc3339(),
    });
    if let Err(e) = ctx
        .queue
        .push(DEAD_LETTER_QUEUE, serde_json::to_vec(&message)?)
        .await
    {
        tracing::warn!(delivery_id = %delivery_id, error = %e, "Failed to push dead letter");
    }

    tracing::error!(
        delivery_id = %delivery_id,
        endpoint_id = %endpoint_id,
        event_id = %event_id,
        attempts = attempts,
        last_error = %last_error.unwrap_or("none"),
        "Delivery abandoned after max attempts"
    );
    Ok(())
}
