use axum::{
    extract::State,
    http::StatusCode,
    Extension, Json,
};

use crate::error::ApiError;
use crate::middleware::request_id::CorrelationId;
use crate::models::{ApiResponse, CreateRefundRequest, ErrorEnvelope, Refund};
use crate::services::hash_api_key;
use crate::state::AppState;

type Failure = (StatusCode, Json<ErrorEnvelope>);

/// POST /v1/refunds - Refund a succeeded payment
pub async fn create(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Json(req): Json<CreateRefundRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Refund>>), Failure> {
    if state
        .limiter
        .check(&hash_api_key(&req.merchant_api_key))
        .is_err()
    {
        return Err(ApiError::RateLimited.respond(&correlation.0));
    }

    let refund = state
        .refund_service()
        .create_refund(req, &correlation.0)
        .await
        .map_err(|e| e.respond(&correlation.0))?;

    Ok((StatusCode::CREATED, Json(ApiResponse::new(refund))))
}
