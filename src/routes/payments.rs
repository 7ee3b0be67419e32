use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use uuid::Uuid;

use crate::error::ApiError;
use crate::middleware::request_id::CorrelationId;
use crate::models::{
    ApiResponse, CreatePaymentRequest, ErrorEnvelope, ListPaymentsQuery, ListResponse,
    MerchantKeyQuery, Payment, PaymentDetail,
};
use crate::services::hash_api_key;
use crate::state::AppState;

type Failure = (StatusCode, Json<ErrorEnvelope>);

/// POST /v1/payments - Idempotent payment intake
pub async fn create(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    headers: HeaderMap,
    Json(req): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Payment>>), Failure> {
    let idempotency_key = headers
        .get("Idempotency-Key")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            ApiError::validation(
                "MISSING_IDEMPOTENCY_KEY",
                "Idempotency-Key header is required",
            )
            .respond(&correlation.0)
        })?;

    if state
        .limiter
        .check(&hash_api_key(&req.merchant_api_key))
        .is_err()
    {
        return Err(ApiError::RateLimited.respond(&correlation.0));
    }

    let payment = state
        .payment_service()
        .create_payment(req, idempotency_key, &correlation.0)
        .await
        .map_err(|e| e.respond(&correlation.0))?;

    Ok((StatusCode::CREATED, Json(ApiResponse::new(payment))))
}

/// GET /v1/payments/:id - Payment with recent attempts and refunds
pub async fn get(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Path(id): Path<Uuid>,
    Query(query): Query<MerchantKeyQuery>,
) -> Result<Json<ApiResponse<PaymentDetail>>, Failure> {
    let detail = state
        .payment_service()
        .get_payment(&query.merchant_api_key, id)
        .await
        .map_err(|e| e.respond(&correlation.0))?;

    Ok(Json(ApiResponse::new(detail)))
}

/// GET /v1/payments - Filtered, paginated listing
pub async fn list(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Query(query): Query<ListPaymentsQuery>,
) -> Result<Json<ListResponse<Payment>>, Failure> {
    let (payments, total, limit, offset) = state
        .payment_service()
        .list_payments(query)
        .await
        .map_err(|e| e.respond(&correlation.0))?;

    Ok(Json(ListResponse::new(payments, total, limit, offset)))
}
