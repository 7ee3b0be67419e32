use serde_json::Value as JsonValue;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use super::{
    authenticate_merchant, map_attempt_status, map_payment_status, sanitize_metadata,
    validate_currency,
};
use crate::cache::Caches;
use crate::error::ApiError;
use crate::gateway::{GatewayPaymentRequest, GatewayRegistry};
use crate::models::{
    CreatePaymentRequest, GatewayKind, ListPaymentsQuery, Payment, PaymentCreatedPayload,
    PaymentDetail, PaymentStatus,
};
use crate::repos::{is_unique_violation, outbox_repo, payment_repo, refund_repo};

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 100;
const DETAIL_ATTEMPT_LIMIT: i64 = 5;

/// Intake, lookup and listing for payments
#[derive(Clone)]
pub struct PaymentService {
    pool: PgPool,
    caches: Caches,
    gateways: Arc<GatewayRegistry>,
}

impl PaymentService {
    pub fn new(pool: PgPool, caches: Caches, gateways: Arc<GatewayRegistry>) -> Self {
        Self {
            pool,
            caches,
            gateways,
        }
    }

    /// Idempotent payment intake
    ///
    /// Exactly-once effect: replays of the same (merchant, idempotency key)
    /// return the original payment unchanged, whatever the current request
    /// body says. Two concurrent intakes with the same key race on the
    /// unique constraint and the loser reads the winner's row.
    pub async fn create_payment(
        &self,
        req: CreatePaymentRequest,
        idempotency_key: String,
        correlation_id: &str,
    ) -> Result<Payment, ApiError> {
        let merchant = authenticate_merchant(&self.pool, &self.caches, &req.merchant_api_key).await?;

        if let Some(existing) = self
            .replay_by_idempotency_key(merchant.id, &idempotency_key)
            .await?
        {
            tracing::info!(
                payment_id = %existing.id,
                merchant_id = %merchant.id,
                "Idempotent replay, returning existing payment"
            );
            return Ok(existing);
        }

        if req.amount <= 0 {
            return Err(ApiError::validation(
                "INVALID_AMOUNT",
                "amount must be a positive integer in the currency's minor unit",
            ));
        }
        let currency = validate_currency(&req.currency)?;
        let gateway_kind = GatewayKind::from_db_str(&req.gateway.to_lowercase())
            .filter(|kind| self.gateways.is_enabled(*kind))
            .ok_or_else(|| {
                ApiError::validation(
                    "UNSUPPORTED_GATEWAY",
                    format!("gateway '{}' is not enabled", req.gateway),
                )
            })?;
        let metadata = req.metadata.as_ref().and_then(sanitize_metadata);

        // Payment, attempt #1 and the idempotency binding commit together.
        let payment_id = Uuid::new_v4();
        let mut tx = self.pool.begin().await?;
        let payment = match payment_repo::insert(
            &mut tx,
            payment_id,
            merchant.id,
            req.amount,
            &currency,
            gateway_kind,
            &idempotency_key,
            metadata.as_ref(),
        )
        .await
        {
            Ok(payment) => payment,
            Err(err) if is_unique_violation(&err) => {
                // Lost the intake race: the winner's row is the payment.
                drop(tx);
                let winner = payment_repo::find_by_idempotency_key(
                    &self.pool,
                    merchant.id,
                    &idempotency_key,
                )
                .await?
                .ok_or_else(|| {
                    ApiError::Internal(anyhow::anyhow!(
                        "idempotency winner row missing after unique violation"
                    ))
                })?;
                self.caches.idempotency.put(
                    Caches::idempotency_key(merchant.id, &idempotency_key),
                    winner.id,
                );
                return Ok(winner);
            }
            Err(err) => return Err(err.into()),
        };
        let attempt = payment_repo::insert_attempt(&mut tx, Uuid::new_v4(), payment_id, 1).await?;
        tx.commit().await?;

        self.caches.idempotency.put(
            Caches::idempotency_key(merchant.id, &idempotency_key),
            payment_id,
        );

        payment_repo::mark_processing(&self.pool, payment_id, attempt.id).await?;

        let adapter = self.gateways.get(gateway_kind).ok_or_else(|| {
            ApiError::validation(
                "UNSUPPORTED_GATEWAY",
                format!("gateway '{}' is not enabled", gateway_kind.as_db_str()),
            )
        })?;
        let gateway_request = GatewayPaymentRequest {
            amount: payment.amount,
            currency: currency.clone(),
            metadata: metadata.clone(),
            customer_id: None,
            method_id: None,
        };

        match adapter.create_payment(&gateway_request).await {
            Ok(response) => {
                let settled = self
                    .settle_intake(
                        payment_id,
                        attempt.id,
                        map_payment_status(response.status),
                        map_attempt_status(response.status),
                        Some(&response.provider_payment_id),
                        Some(&response.raw),
                        None,
                        None,
                        correlation_id,
                    )
                    .await?;
                tracing::info!(
                    payment_id = %payment_id,
                    status = %settled.status.as_db_str(),
                    provider_payment_id = %response.provider_payment_id,
                    "Payment settled"
                );
                Ok(settled)
            }
            Err(fault) => {
                let error_code = fault
                    .provider_code
                    .clone()
                    .unwrap_or_else(|| "GATEWAY_ERROR".to_string());
                self.settle_intake(
                    payment_id,
                    attempt.id,
                    PaymentStatus::Failed,
                    PaymentStatus::Failed,
                    None,
                    None,
                    Some(&error_code),
                    Some(&fault.message),
                    correlation_id,
                )
                .await?;
                tracing::warn!(
                    payment_id = %payment_id,
                    error_code = %error_code,
                    error = %fault.message,
                    "Gateway rejected payment"
                );
                Err(ApiError::Gateway(fault))
            }
        }
    }

    /// Write the gateway outcome and the `payment.created` outbox row in one
    /// transaction
    #[allow(clippy::too_many_arguments)]
    async fn settle_intake(
        &self,
        payment_id: Uuid,
        attempt_id: Uuid,
        payment_status: PaymentStatus,
        attempt_status: PaymentStatus,
        provider_payment_id: Option<&str>,
        provider_response: Option<&JsonValue>,
        error_code: Option<&str>,
        error_message: Option<&str>,
        correlation_id: &str,
    ) -> Result<Payment, ApiError> {
        let mut tx = self.pool.begin().await?;
        payment_repo::settle_attempt(
            &mut tx,
            attempt_id,
            attempt_status,
            provider_response,
            error_code,
            error_message,
        )
        .await?;
        let settled =
            payment_repo::settle(&mut tx, payment_id, payment_status, provider_payment_id).await?;

        let payload = serde_json::to_value(PaymentCreatedPayload {
            payment_snapshot: settled.clone(),
            correlation_id: correlation_id.to_string(),
        })
        .map_err(|e| ApiError::Internal(e.into()))?;
        outbox_repo::insert(&mut tx, "payment", payment_id, "payment.created", &payload).await?;

        tx.commit().await?;
        Ok(settled)
    }

    /// The idempotency cache maps key → payment id; the payment itself is
    /// always read from the store
    async fn replay_by_idempotency_key(
        &self,
        merchant_id: Uuid,
        idempotency_key: &str,
    ) -> Result<Option<Payment>, ApiError> {
        let cache_key = Caches::idempotency_key(merchant_id, idempotency_key);

        if let Some(payment_id) = self.caches.idempotency.get(&cache_key) {
            if let Some(payment) = payment_repo::find_by_id(&self.pool, payment_id).await? {
                return Ok(Some(payment));
            }
            self.caches.idempotency.invalidate(&cache_key);
        }

        let payment =
            payment_repo::find_by_idempotency_key(&self.pool, merchant_id, idempotency_key)
                .await?;
        if let Some(payment) = &payment {
            self.caches.idempotency.put(cache_key, payment.id);
        }
        Ok(payment)
    }

    pub async fn get_payment(
        &self,
        api_key: &str,
        payment_id: Uuid,
    ) -> Result<PaymentDetail, ApiError> {
        let merchant = authenticate_merchant(&self.pool, &self.caches, api_key).await?;

        let payment = payment_repo::find_for_merchant(&self.pool, payment_id, merchant.id)
            .await?
            .ok_or_else(|| {
                ApiError::not_found(
                    "PAYMENT_NOT_FOUND",
                    format!("payment {} not found", payment_id),
                )
            })?;

        let attempts =
            payment_repo::recent_attempts(&self.pool, payment_id, DETAIL_ATTEMPT_LIMIT).await?;
        let refunds = refund_repo::list_for_payment(&self.pool, payment_id).await?;

        Ok(PaymentDetail {
            payment,
            attempts,
            refunds,
        })
    }

    pub async fn list_payments(
        &self,
        query: ListPaymentsQuery,
    ) -> Result<(Vec<Payment>, i64, i64, i64), ApiError> {
        let merchant =
            authenticate_merchant(&self.pool, &self.caches, &query.merchant_api_key).await?;

        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = query.offset.unwrap_or(0).max(0);

        let status = query
            .status
            .as_deref()
            .map(|s| {
                PaymentStatus::from_db_str(&s.to_uppercase()).ok_or_else(|| {
                    ApiError::validation("INVALID_STATUS", format!("unknown status '{}'", s))
                })
            })
            .transpose()?;
        let gateway = query
            .gateway
            .as_deref()
            .map(|g| {
                GatewayKind::from_db_str(&g.to_lowercase()).ok_or_else(|| {
                    ApiError::validation("UNSUPPORTED_GATEWAY", format!("unknown gateway '{}'", g))
                })
            })
            .transpose()?;

        let filter = payment_repo::PaymentFilter {
            status,
            gateway,
            start_date: query.start_date,
            end_date: query.end_date,
        };

        let (payments, total) =
            payment_repo::list_for_merchant(&self.pool, merchant.id, &filter, limit, offset)
                .await?;
        Ok((payments, total, limit, offset))
    }
}
