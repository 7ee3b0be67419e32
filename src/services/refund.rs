use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use super::{authenticate_merchant, map_refund_status};
use crate::cache::Caches;
use crate::error::ApiError;
use crate::gateway::{GatewayRefundRequest, GatewayRegistry};
use crate::models::{
    CreateRefundRequest, PaymentStatus, Refund, RefundCreatedPayload, RefundStatus,
};
use crate::repos::{outbox_repo, payment_repo, refund_repo};

/// Refund lifecycle, mirroring the payment intake
#[derive(Clone)]
pub struct RefundService {
    pool: PgPool,
    caches: Caches,
    gateways: Arc<GatewayRegistry>,
}

impl RefundService {
    pub fn new(pool: PgPool, caches: Caches, gateways: Arc<GatewayRegistry>) -> Self {
        Self {
            pool,
            caches,
            gateways,
        }
    }

    pub async fn create_refund(
        &self,
        req: CreateRefundRequest,
        correlation_id: &str,
    ) -> Result<Refund, ApiError> {
        let merchant = authenticate_merchant(&self.pool, &self.caches, &req.merchant_api_key).await?;

        let payment = payment_repo::find_for_merchant(&self.pool, req.payment_id, merchant.id)
            .await?
            .ok_or_else(|| {
                ApiError::not_found(
                    "PAYMENT_NOT_FOUND",
                    format!("payment {} not found", req.payment_id),
                )
            })?;

        if payment.status != PaymentStatus::Succeeded {
            return Err(ApiError::domain(
                "PAYMENT_NOT_REFUNDABLE",
                format!(
                    "payment {} is {} and cannot be refunded",
                    payment.id,
                    payment.status.as_db_str()
                ),
            ));
        }
        let provider_payment_id = payment.provider_payment_id.clone().ok_or_else(|| {
            ApiError::domain(
                "PAYMENT_NOT_REFUNDABLE",
                "payment has no provider reference to refund against",
            )
        })?;

        if let Some(amount) = req.amount {
            if amount <= 0 {
                return Err(ApiError::validation(
                    "INVALID_AMOUNT",
                    "refund amount must be a positive integer",
                ));
            }
        }

        // Over-refund guard and the PENDING insert commit together; the
        // payment row lock serializes concurrent refunds of one payment.
        let refund_id = Uuid::new_v4();
        let refund = {
            let mut tx = self.pool.begin().await?;
            sqlx::query("SELECT 1 FROM payments WHERE id = $1 FOR UPDATE")
                .bind(payment.id)
                .execute(&mut *tx)
                .await?;

            let already_refunded = refund_repo::sum_succeeded(&mut tx, payment.id).await?;
            let requested = req.amount.unwrap_or(payment.amount - already_refunded);
            if requested <= 0 || already_refunded + requested > payment.amount {
                return Err(ApiError::domain(
                    "REFUND_AMOUNT_EXCEEDS_PAYMENT",
                    format!(
                        "refund of {} exceeds remaining refundable amount {}",
                        requested,
                        payment.amount - already_refunded
                    ),
                ));
            }

            let refund = refund_repo::insert(
                &mut tx,
                refund_id,
                payment.id,
                requested,
                req.reason.as_deref(),
            )
            .await?;
            tx.commit().await?;
            refund
        };

        refund_repo::mark_processing(&self.pool, refund_id).await?;

        let adapter = self.gateways.get(payment.gateway).ok_or_else(|| {
            ApiError::domain(
                "UNSUPPORTED_GATEWAY",
                format!("gateway '{}' is not enabled", payment.gateway.as_db_str()),
            )
        })?;
        let gateway_request = GatewayRefundRequest {
            provider_payment_id,
            amount: Some(refund.amount),
            reason: req.reason.clone(),
            metadata: None,
        };

        match adapter.refund_payment(&gateway_request).await {
            Ok(response) => {
                let settled = self
                    .settle(
                        refund_id,
                        payment.id,
                        payment.amount,
                        map_refund_status(response.status),
                        Some(&response.provider_refund_id),
                        correlation_id,
                    )
                    .await?;
                tracing::info!(
                    refund_id = %refund_id,
                    payment_id = %payment.id,
                    status = %settled.status.as_db_str(),
                    "Refund settled"
                );
                Ok(settled)
            }
            Err(fault) => {
                self.settle(
                    refund_id,
                    payment.id,
                    payment.amount,
                    RefundStatus::Failed,
                    None,
                    correlation_id,
                )
                .await?;
                tracing::warn!(
                    refund_id = %refund_id,
                    payment_id = %payment.id,
                    error = %fault.message,
                    "Gateway rejected refund"
                );
                Err(ApiError::Gateway(fault))
            }
        }
    }

    /// Status write plus the `refund.created` outbox row in one transaction
    ///
    /// SUCCEEDED is re-checked against the refund sum under the payment row
    /// lock: a refund that would push the sum past the payment amount
    /// settles FAILED instead.
    async fn settle(
        &self,
        refund_id: Uuid,
        payment_id: Uuid,
        payment_amount: i64,
        status: RefundStatus,
        provider_refund_id: Option<&str>,
        correlation_id: &str,
    ) -> Result<Refund, ApiError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT 1 FROM payments WHERE id = $1 FOR UPDATE")
            .bind(payment_id)
            .execute(&mut *tx)
            .await?;

        let mut status = status;
        if status == RefundStatus::Succeeded {
            let already_refunded = refund_repo::sum_succeeded(&mut tx, payment_id).await?;
            let this_amount: i64 =
                sqlx::query_scalar("SELECT amount FROM refunds WHERE id = $1")
                    .bind(refund_id)
                    .fetch_one(&mut *tx)
                    .await?;
            if already_refunded + this_amount > payment_amount {
                tracing::error!(
                    refund_id = %refund_id,
                    payment_id = %payment_id,
                    "Concurrent refunds exceeded payment amount, settling FAILED"
                );
                status = RefundStatus::Failed;
            }
        }

        let settled = refund_repo::settle(&mut tx, refund_id, status, provider_refund_id).await?;

        let payload = serde_json::to_value(RefundCreatedPayload {
            refund_snapshot: settled.clone(),
            payment_id,
            correlation_id: correlation_id.to_string(),
        })
        .map_err(|e| ApiError::Internal(e.into()))?;
        outbox_repo::insert(&mut tx, "refund", refund_id, "refund.created", &payload).await?;

        tx.commit().await?;
        Ok(settled)
    }
}
