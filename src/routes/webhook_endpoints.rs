use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::error::ApiError;
use crate::middleware::request_id::CorrelationId;
use crate::models::{
    ApiResponse, CreateEndpointRequest, ErrorEnvelope, MerchantKeyQuery, UpdateEndpointRequest,
    WebhookEndpoint, KNOWN_EVENT_TYPES,
};
use crate::repos::endpoint_repo;
use crate::services::authenticate_merchant;
use crate::state::AppState;

type Failure = (StatusCode, Json<ErrorEnvelope>);

const MIN_SECRET_LEN: usize = 8;

fn validate_url(url: &str) -> Result<(), ApiError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(ApiError::validation(
            "INVALID_URL",
            "url must be an absolute http(s) URL",
        ))
    }
}

fn validate_secret(secret: &str) -> Result<(), ApiError> {
    if secret.len() >= MIN_SECRET_LEN {
        Ok(())
    } else {
        Err(ApiError::validation(
            "INVALID_SECRET",
            format!("secret must be at least {} characters", MIN_SECRET_LEN),
        ))
    }
}

fn validate_events(events: &[String]) -> Result<(), ApiError> {
    if events.is_empty() {
        return Err(ApiError::validation(
            "INVALID_EVENTS",
            "at least one event type must be subscribed",
        ));
    }
    for event in events {
        if !KNOWN_EVENT_TYPES.contains(&event.as_str()) {
            return Err(ApiError::validation(
                "INVALID_EVENTS",
                format!("unknown event type '{}'", event),
            ));
        }
    }
    Ok(())
}

/// POST /v1/webhook-endpoints - Register an endpoint
pub async fn create(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Json(req): Json<CreateEndpointRequest>,
) -> Result<(StatusCode, Json<ApiResponse<WebhookEndpoint>>), Failure> {
    let result = async {
        let merchant =
            authenticate_merchant(&state.db, &state.caches, &req.merchant_api_key).await?;
        validate_url(&req.url)?;
        validate_secret(&req.secret)?;
        validate_events(&req.events)?;

        let endpoint =
            endpoint_repo::insert(&state.db, merchant.id, &req.url, &req.secret, &req.events)
                .await?;
        Ok::<_, ApiError>(endpoint)
    }
    .await
    .map_err(|e| e.respond(&correlation.0))?;

    Ok((StatusCode::CREATED, Json(ApiResponse::new(result))))
}

/// GET /v1/webhook-endpoints - List the merchant's endpoints
pub async fn list(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Query(query): Query<MerchantKeyQuery>,
) -> Result<Json<ApiResponse<Vec<WebhookEndpoint>>>, Failure> {
    let endpoints = async {
        let merchant =
            authenticate_merchant(&state.db, &state.caches, &query.merchant_api_key).await?;
        Ok::<_, ApiError>(endpoint_repo::list_for_merchant(&state.db, merchant.id).await?)
    }
    .await
    .map_err(|e| e.respond(&correlation.0))?;

    Ok(Json(ApiResponse::new(endpoints)))
}

async fn load_owned(
    state: &AppState,
    api_key: &str,
    id: Uuid,
) -> Result<WebhookEndpoint, ApiError> {
    let merchant = authenticate_merchant(&state.db, &state.caches, api_key).await?;
    endpoint_repo::find_for_merchant(&state.db, id, merchant.id)
        .await?
        .ok_or_else(|| {
            ApiError::not_found("ENDPOINT_NOT_FOUND", format!("endpoint {} not found", id))
        })
}

/// GET /v1/webhook-endpoints/:id
pub async fn get(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Path(id): Path<Uuid>,
    Query(query): Query<MerchantKeyQuery>,
) -> Result<Json<ApiResponse<WebhookEndpoint>>, Failure> {
    let endpoint = load_owned(&state, &query.merchant_api_key, id)
        .await
        .map_err(|e| e.respond(&correlation.0))?;
    Ok(Json(ApiResponse::new(endpoint)))
}

/// PATCH /v1/webhook-endpoints/:id - Partial update
pub async fn update(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Path(id): Path<Uuid>,
    Query(query): Query<MerchantKeyQuery>,
    Json(req): Json<UpdateEndpointRequest>,
) -> Result<Json<ApiResponse<WebhookEndpoint>>, Failure> {
    let updated = async {
        let existing = load_owned(&state, &query.merchant_api_key, id).await?;

        let url = req.url.unwrap_or(existing.url);
        let secret = req.secret.unwrap_or(existing.secret);
        let events = req.events.unwrap_or(existing.events);
        let is_active = req.is_active.unwrap_or(existing.is_active);

        validate_url(&url)?;
        validate_secret(&secret)?;
        validate_events(&events)?;

        Ok::<_, ApiError>(
            endpoint_repo::update(&state.db, id, &url, &secret, &events, is_active).await?,
        )
    }
    .await
    .map_err(|e| e.respond(&correlation.0))?;

    Ok(Json(ApiResponse::new(updated)))
}

/// DELETE /v1/webhook-endpoints/:id
pub async fn remove(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Path(id): Path<Uuid>,
    Query(query): Query<MerchantKeyQuery>,
) -> Result<Json<ApiResponse<serde_json::Value>>, Failure> {
    async {
        load_owned(&state, &query.merchant_api_key, id).await?;
        endpoint_repo::delete(&state.db, id).await?;
        Ok::<_, ApiError>(())
    }
    .await
    .map_err(|e| e.respond(&correlation.0))?;

    Ok(Json(ApiResponse::new(json!({ "deleted": true, "id": id }))))
}
