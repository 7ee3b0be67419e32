use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::time::Duration;

use super::error::GatewayFault;
use super::{
    GatewayPaymentRequest, GatewayPaymentResponse, GatewayPaymentStatus, GatewayRefundRequest,
    GatewayRefundResponse, GatewayRefundStatus, GatewayStatusResponse, PaymentGateway,
};
use crate::models::GatewayKind;

const BASE_PATH: &str = "https://api.stripe.com";

/// Stripe adapter built on PaymentIntents
///
/// Requests are form-encoded per the Stripe API; nested metadata keys use
/// the `metadata[key]` bracket convention.
pub struct StripeGateway {
    secret_key: String,
    http_client: Client,
}

impl StripeGateway {
    pub fn new(secret_key: String) -> Result<Self, GatewayFault> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| GatewayFault::new("Failed to build HTTP client").with_cause(e))?;

        Ok(Self {
            secret_key,
            http_client,
        })
    }

    async fn post_form(
        &self,
        path: &str,
        form: &HashMap<String, String>,
    ) -> Result<JsonValue, GatewayFault> {
        let url = format!("{}{}", BASE_PATH, path);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .form(form)
            .send()
            .await
            .map_err(|e| GatewayFault::new(format!("stripe request failed: {}", e)).with_cause(e))?;

        Self::handle_response(response).await
    }

    async fn get(&self, path: &str) -> Result<JsonValue, GatewayFault> {
        let url = format!("{}{}", BASE_PATH, path);
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| GatewayFault::new(format!("stripe request failed: {}", e)).with_cause(e))?;

        Self::handle_response(response).await
    }

    async fn handle_response(response: reqwest::Response) -> Result<JsonValue, GatewayFault> {
        let status = response.status();
        let body: JsonValue = response
            .json()
            .await
            .map_err(|e| GatewayFault::new("stripe response was not JSON").with_cause(e))?;

        if status.is_success() {
            return Ok(body);
        }

        let message = body
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .unwrap_or("stripe request rejected")
            .to_string();
        let mut fault = GatewayFault::new(message).with_status(status.as_u16());
        if let Some(code) = body.pointer("/error/code").and_then(|v| v.as_str()) {
            fault = fault.with_code(code);
        }
        Err(fault)
    }

    fn map_intent_status(status: &str) -> GatewayPaymentStatus {
        match status {
            "succeeded" => GatewayPaymentStatus::Succeeded,
            "processing" => GatewayPaymentStatus::Processing,
            "requires_action" | "requires_confirmation" | "requires_payment_method"
            | "requires_capture" => GatewayPaymentStatus::RequiresAction,
            "canceled" => GatewayPaymentStatus::Failed,
            _ => GatewayPaymentStatus::Unknown,
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Stripe
    }

    async fn create_payment(
        &self,
        req: &GatewayPaymentRequest,
    ) -> Result<GatewayPaymentResponse, GatewayFault> {
        let mut form = HashMap::new();
        form.insert("amount".to_string(), req.amount.to_string());
        form.insert("currency".to_string(), req.currency.to_lowercase());
        form.insert("confirm".to_string(), "true".to_string());
        form.insert(
            "automatic_payment_methods[enabled]".to_string(),
            "true".to_string(),
        );

        if let Some(customer) = &req.customer_id {
            form.insert("customer".to_string(), customer.clone());
        }
        if let Some(method) = &req.method_id {
            form.insert("payment_method".to_string(), method.clone());
        }
        if let Some(JsonValue::Object(map)) = &req.metadata {
            for (key, value) in map {
                let rendered = match value {
                    JsonValue::String(s) => s.clone(),
                    other => other.to_string(),
                };
                form.insert(format!("metadata[{}]", key), rendered);
            }
        }

        let raw = self.post_form("/v1/payment_intents", &form).await?;

        let provider_payment_id = raw
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| GatewayFault::new("stripe response missing intent id"))?
            .to_string();
        let status = raw
            .get("status")
            .and_then(|v| v.as_str())
            .map(Self::map_intent_status)
            .unwrap_or(GatewayPaymentStatus::Unknown);

        Ok(GatewayPaymentResponse {
            provider_payment_id,
            status,
            client_secret: raw
                .get("client_secret")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            next_action: raw.get("next_action").filter(|v| !v.is_null()).cloned(),
            raw,
        })
    }

    async fn refund_payment(
        &self,
        req: &GatewayRefundRequest,
    ) -> Result<GatewayRefundResponse, GatewayFault> {
        let mut form = HashMap::new();
        form.insert(
            "payment_intent".to_string(),
            req.provider_payment_id.clone(),
        );
        if let Some(amount) = req.amount {
            form.insert("amount".to_string(), amount.to_string());
        }
        if let Some(reason) = &req.reason {
            form.insert("reason".to_string(), reason.clone());
        }

        let raw = self.post_form("/v1/refunds", &form).await?;

        let provider_refund_id = raw
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| GatewayFault::new("stripe response missing refund id"))?
            .to_string();
        let status = match raw.get("status").and_then(|v| v.as_str()) {
            Some("succeeded") => GatewayRefundStatus::Succeeded,
            Some("pending") => GatewayRefundStatus::Pending,
            Some("failed") | Some("canceled") => GatewayRefundStatus::Failed,
            _ => GatewayRefundStatus::Unknown,
        };

        Ok(GatewayRefundResponse {
            provider_refund_id,
            status,
            raw,
        })
    }

    async fn get_payment_status(
        &self,
        provider_payment_id: &str,
    ) -> Result<GatewayStatusResponse, GatewayFault> {
        let raw = self
            .get(&format!("/v1/payment_intents/{}", provider_payment_id))
            .await?;

        let status = raw
            .get("status")
            .and_then(|v| v.as_str())
            .map(Self::map_intent_status)
            .unwrap_or(GatewayPaymentStatus::Unknown);

        Ok(GatewayStatusResponse {
            status,
            amount: raw.get("amount").and_then(|v| v.as_i64()),
            currency: raw
                .get("currency")
                .and_then(|v| v.as_str())
                .map(|s| s.to_uppercase()),
            metadata: raw.get("metadata").filter(|v| !v.is_null()).cloned(),
            raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_intent_statuses() {
        assert_eq!(
            StripeGateway::map_intent_status("succeeded"),
            GatewayPaymentStatus::Succeeded
        );
        assert_eq!(
            StripeGateway::map_intent_status("requires_action"),
            GatewayPaymentStatus::RequiresAction
        );
        assert_eq!(
            StripeGateway::map_intent_status("canceled"),
            GatewayPaymentStatus::Failed
        );
        assert_eq!(
            StripeGateway::map_intent_status("something_new"),
            GatewayPaymentStatus::Unknown
        );
    }
}
