use axum::http::StatusCode;
use axum::Json;
use thiserror::Error;

use crate::gateway::GatewayFault;
use crate::models::ErrorEnvelope;

/// Error taxonomy surfaced at the HTTP boundary
///
/// Local faults (validation, auth, domain) reject before any state change
/// and are never retried. Gateway faults are persisted on the attempt before
/// being re-raised. Internal faults are logged with the correlation id and
/// returned with a sanitized message.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Validation { code: &'static str, message: String },

    #[error("invalid API key")]
    Auth,

    #[error("{message}")]
    Domain { code: &'static str, message: String },

    #[error("{message}")]
    NotFound { code: &'static str, message: String },

    #[error("rate limit exceeded")]
    RateLimited,

    #[error(transparent)]
    Gateway(#[from] GatewayFault),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(code: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            code,
            message: message.into(),
        }
    }

    pub fn domain(code: &'static str, message: impl Into<String>) -> Self {
        Self::Domain {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self::NotFound {
            code,
            message: message.into(),
        }
    }

    /// Translate into the error envelope, stamping the correlation id
    pub fn respond(self, correlation_id: &str) -> (StatusCode, Json<ErrorEnvelope>) {
        match self {
            Self::Validation { code, message } => (
                StatusCode::BAD_REQUEST,
                Json(ErrorEnvelope::new(code, message, correlation_id)),
            ),
            Self::Auth => (
                StatusCode::UNAUTHORIZED,
                Json(ErrorEnvelope::new(
                    "INVALID_API_KEY",
                    "API key not recognized",
                    correlation_id,
                )),
            ),
            Self::Domain { code, message } => (
                StatusCode::BAD_REQUEST,
                Json(ErrorEnvelope::new(code, message, correlation_id)),
            ),
            Self::NotFound { code, message } => (
                StatusCode::NOT_FOUND,
                Json(ErrorEnvelope::new(code, message, correlation_id)),
            ),
            Self::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                Json(ErrorEnvelope::new(
                    "RATE_LIMITED",
                    "Too many requests",
                    correlation_id,
                )),
            ),
            Self::Gateway(fault) => {
                let status = fault
                    .http_status
                    .and_then(|s| StatusCode::from_u16(s).ok())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                let code = fault
                    .provider_code
                    .clone()
                    .unwrap_or_else(|| "GATEWAY_ERROR".to_string());
                (
                    status,
                    Json(ErrorEnvelope::new(code, fault.message, correlation_id)),
                )
            }
            Self::Internal(err) => {
                tracing::error!(
                    correlation_id = %correlation_id,
                    error = %format!("{:#}", err),
                    "Internal error"
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorEnvelope::new(
                        "INTERNAL_ERROR",
                        "An internal error occurred",
                        correlation_id,
                    )),
                )
            }
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        Self::Internal(anyhow::Error::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_fault_without_status_maps_to_500() {
        let err = ApiError::Gateway(GatewayFault::new("declined").with_code("card_declined"));
        let (status, body) = err.respond("corr-1");
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error.code, "card_declined");
        assert_eq!(body.error.correlation_id, "corr-1");
    }

    #[test]
    fn gateway_fault_keeps_provider_status() {
        let err = ApiError::Gateway(GatewayFault::new("upstream").with_status(502));
        let (status, _) = err.respond("corr-2");
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn internal_message_is_sanitized() {
        let err = ApiError::Internal(anyhow::anyhow!("secret connection string"));
        let (status, body) = err.respond("corr-3");
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error.message, "An internal error occurred");
    }
}
