pub mod payment;
pub mod refund;

pub use payment::PaymentService;
pub use refund::RefundService;

use serde_json::{Map, Value as JsonValue};
use sha2::{Digest, Sha256};
use sqlx::PgPool;

use crate::cache::Caches;
use crate::error::ApiError;
use crate::gateway::{GatewayPaymentStatus, GatewayRefundStatus};
use crate::models::{Merchant, PaymentStatus, RefundStatus};
use crate::repos::merchant_repo;

pub fn hash_api_key(api_key: &str) -> String {
    format!("{:x}", Sha256::digest(api_key.as_bytes()))
}

/// Authenticate a merchant by API key via the read-through merchant cache
pub async fn authenticate_merchant(
    pool: &PgPool,
    caches: &Caches,
    api_key: &str,
) -> Result<Merchant, ApiError> {
    let hash = hash_api_key(api_key);
    let cache_key = Caches::merchant_key(&hash);

    if let Some(merchant) = caches.merchants.get(&cache_key) {
        return Ok(merchant);
    }

    let merchant = merchant_repo::find_by_api_key_hash(pool, &hash)
        .await?
        .ok_or(ApiError::Auth)?;
    caches.merchants.put(cache_key, merchant.clone());
    Ok(merchant)
}

/// Validate an ISO-4217 alphabetic currency code, upper-casing for storage
pub fn validate_currency(currency: &str) -> Result<String, ApiError> {
    if currency.len() == 3 && currency.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(currency.to_uppercase())
    } else {
        Err(ApiError::validation(
            "INVALID_CURRENCY",
            format!("'{}' is not a 3-letter ISO-4217 currency code", currency),
        ))
    }
}

/// Reduce metadata to primitives plus one level of nested object
///
/// Arrays and deeper nesting are dropped. Non-object input yields `None`.
pub fn sanitize_metadata(value: &JsonValue) -> Option<JsonValue> {
    let map = value.as_object()?;

    let mut sanitized = Map::new();
    for (key, entry) in map {
        match entry {
            JsonValue::Object(nested) => {
                let mut inner = Map::new();
                for (nested_key, nested_value) in nested {
                    if is_primitive(nested_value) {
                        inner.insert(nested_key.clone(), nested_value.clone());
                    }
                }
                sanitized.insert(key.clone(), JsonValue::Object(inner));
            }
            primitive if is_primitive(primitive) => {
                sanitized.insert(key.clone(), primitive.clone());
            }
            _ => {}
        }
    }
    Some(JsonValue::Object(sanitized))
}

fn is_primitive(value: &JsonValue) -> bool {
    matches!(
        value,
        JsonValue::String(_) | JsonValue::Number(_) | JsonValue::Bool(_) | JsonValue::Null
    )
}

/// Gateway status → payment status
pub fn map_payment_status(status: GatewayPaymentStatus) -> PaymentStatus {
    match status {
        GatewayPaymentStatus::Succeeded => PaymentStatus::Succeeded,
        GatewayPaymentStatus::Processing => PaymentStatus::Processing,
        GatewayPaymentStatus::RequiresAction => PaymentStatus::RequiresAction,
        GatewayPaymentStatus::Failed | GatewayPaymentStatus::Unknown => PaymentStatus::Failed,
    }
}

/// Gateway status → attempt status (requires_action is still in flight from
/// the attempt's point of view)
pub fn map_attempt_status(status: GatewayPaymentStatus) -> PaymentStatus {
    match status {
        GatewayPaymentStatus::Succeeded => PaymentStatus::Succeeded,
        GatewayPaymentStatus::Processing | GatewayPaymentStatus::RequiresAction => {
            PaymentStatus::Processing
        }
        GatewayPaymentStatus::Failed | GatewayPaymentStatus::Unknown => PaymentStatus::Failed,
    }
}

pub fn map_refund_status(status: GatewayRefundStatus) -> RefundStatus {
    match status {
        GatewayRefundStatus::Succeeded => RefundStatus::Succeeded,
        GatewayRefundStatus::Pending => RefundStatus::Processing,
        GatewayRefundStatus::Failed | GatewayRefundStatus::Unknown => RefundStatus::Failed,
    }
}
