//! Signed webhook POSTs and outcome classification

use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use super::signature;
use crate::models::{Event, WebhookEndpoint};

pub const USER_AGENT: &str = "OpenPayFlow/1.0";
pub const SIGNATURE_HEADER: &str = "X-OpenPayFlow-Signature";
pub const EVENT_TYPE_HEADER: &str = "X-OpenPayFlow-Event-Type";
pub const DELIVERY_ID_HEADER: &str = "X-OpenPayFlow-Delivery-Id";

/// Non-2xx outcome of a delivery attempt; always retryable
///
/// Rendered as `<kind>:<detail>` for the delivery's `last_error` column.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("http_status:{0}")]
    HttpStatus(u16),
    #[error("transport:{0}")]
    Transport(String),
}

#[derive(Clone)]
pub struct WebhookSender {
    client: Client,
}

impl WebhookSender {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }

    /// Body POSTed to receivers; the signature covers these exact bytes
    pub fn build_payload(event: &Event) -> Vec<u8> {
        let body = json!({
            "id": event.id,
            "type": event.event_type,
            "created": event.created_at.timestamp(),
            "data": event.payload,
        });
        serde_json::to_vec(&body).expect("event payload serializes")
    }

    /// One signed POST; `Ok` on any 2xx
    pub async fn send(
        &self,
        endpoint: &WebhookEndpoint,
        event: &Event,
        delivery_id: Uuid,
    ) -> Result<(), DeliveryError> {
        let body = Self::build_payload(event);
        let sig = signature::sign(&endpoint.secret, &body);

        let response = self
            .client
            .post(&endpoint.url)
            .header("Content-Type", "application/json")
            .header(SIGNATURE_HEADER, sig)
            .header(EVENT_TYPE_HEADER, &event.event_type)
            .header(DELIVERY_ID_HEADER, delivery_id.to_string())
            .body(body)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(DeliveryError::HttpStatus(status.as_u16()))
        }
    }
}
