use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value as JsonValue};
use std::time::Duration;

use super::error::GatewayFault;
use super::{
    GatewayPaymentRequest, GatewayPaymentResponse, GatewayPaymentStatus, GatewayRefundRequest,
    GatewayRefundResponse, GatewayRefundStatus, GatewayStatusResponse, PaymentGateway,
};
use crate::models::GatewayKind;

const BASE_PATH: &str = "https://api.razorpay.com";

/// Razorpay adapter built on the Orders API
///
/// An order is created server-side and completed by the merchant's client,
/// so a fresh order always reports `requires_action`.
pub struct RazorpayGateway {
    key_id: String,
    key_secret: String,
    http_client: Client,
}

impl RazorpayGateway {
    pub fn new(key_id: String, key_secret: String) -> Result<Self, GatewayFault> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| GatewayFault::new("Failed to build HTTP client").with_cause(e))?;

        Ok(Self {
            key_id,
            key_secret,
            http_client,
        })
    }

    async fn post(&self, path: &str, body: &JsonValue) -> Result<JsonValue, GatewayFault> {
        let url = format!("{}{}", BASE_PATH, path);
        let response = self
            .http_client
            .post(&url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(body)
            .send()
            .await
            .map_err(|e| {
                GatewayFault::new(format!("razorpay request failed: {}", e)).with_cause(e)
            })?;

        Self::handle_response(response).await
    }

    async fn get(&self, path: &str) -> Result<JsonValue, GatewayFault> {
        let url = format!("{}{}", BASE_PATH, path);
        let response = self
            .http_client
            .get(&url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .send()
            .await
            .map_err(|e| {
                GatewayFault::new(format!("razorpay request failed: {}", e)).with_cause(e)
            })?;

        Self::handle_response(response).await
    }

    async fn handle_response(response: reqwest::Response) -> Result<JsonValue, GatewayFault> {
        let status = response.status();
        let body: JsonValue = response
            .json()
            .await
            .map_err(|e| GatewayFault::new("razorpay response was not JSON").with_cause(e))?;

        if status.is_success() {
            return Ok(body);
        }

        let message = body
            .pointer("/error/description")
            .and_then(|v| v.as_str())
            .unwrap_or("razorpay request rejected")
            .to_string();
        let mut fault = GatewayFault::new(message).with_status(status.as_u16());
        if let Some(code) = body.pointer("/error/code").and_then(|v| v.as_str()) {
            fault = fault.with_code(code);
        }
        Err(fault)
    }

    fn map_order_status(status: &str) -> GatewayPaymentStatus {
        match status {
            "paid" => GatewayPaymentStatus::Succeeded,
            "attempted" => GatewayPaymentStatus::Processing,
            // Orders never self-resolve; they wait for client-side checkout.
            "created" => GatewayPaymentStatus::RequiresAction,
            _ => GatewayPaymentStatus::Unknown,
        }
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Razorpay
    }

    async fn create_payment(
        &self,
        req: &GatewayPaymentRequest,
    ) -> Result<GatewayPaymentResponse, GatewayFault> {
        let mut body = json!({
            "amount": req.amount,
            "currency": req.currency.to_uppercase(),
        });
        if let Some(metadata) = &req.metadata {
            body["notes"] = metadata.clone();
        }

        let raw = self.post("/v1/orders", &body).await?;

        let provider_payment_id = raw
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| GatewayFault::new("razorpay response missing order id"))?
            .to_string();
        let status = raw
            .get("status")
            .and_then(|v| v.as_str())
            .map(Self::map_order_status)
            .unwrap_or(GatewayPaymentStatus::Unknown);

        Ok(GatewayPaymentResponse {
            provider_payment_id,
            status,
            client_secret: None,
            next_action: Some(json!({ "type": "razorpay_checkout" })),
            raw,
        })
    }

    async fn refund_payment(
        &self,
        req: &GatewayRefundRequest,
    ) -> Result<GatewayRefundResponse, GatewayFault> {
        let mut body = json!({});
        if let Some(amount) = req.amount {
            body["amount"] = json!(amount);
        }
        if let Some(metadata) = &req.metadata {
            body["notes"] = metadata.clone();
        }

        let raw = self
            .post(
                &format!("/v1/payments/{}/refund", req.provider_payment_id),
                &body,
            )
            .await?;

        let provider_refund_id = raw
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| GatewayFault::new("razorpay response missing refund id"))?
            .to_string();
        let status = match raw.get("status").and_then(|v| v.as_str()) {
            Some("processed") => GatewayRefundStatus::Succeeded,
            Some("pending") => GatewayRefundStatus::Pending,
            Some("failed") => GatewayRefundStatus::Failed,
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
            .get(&format!("/v1/orders/{}", provider_payment_id))
            .await?;

        let status = raw
            .get("status")
            .and_then(|v| v.as_str())
            .map(Self::map_order_status)
            .unwrap_or(GatewayPaymentStatus::Unknown);

        Ok(GatewayStatusResponse {
            status,
            amount: raw.get("amount").and_then(|v| v.as_i64()),
            currency: raw
                .get("currency")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            metadata: raw.get("notes").filter(|v| !v.is_null()).cloned(),
            raw,
        })
    }
}
