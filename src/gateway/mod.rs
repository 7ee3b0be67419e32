pub mod error;
pub mod mock;
pub mod razorpay;
pub mod stripe;

pub use error::GatewayFault;
pub use mock::{MockGateway, MockGatewayConfig};
pub use razorpay::RazorpayGateway;
pub use stripe::StripeGateway;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Config;
use crate::models::GatewayKind;

/// Provider-side payment status, normalized across adapters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayPaymentStatus {
    Succeeded,
    Processing,
    RequiresAction,
    Failed,
    Unknown,
}

/// Provider-side refund status, normalized across adapters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayRefundStatus {
    Succeeded,
    Pending,
    Failed,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct GatewayPaymentRequest {
    /// Amount in the minor unit of `currency`
    pub amount: i64,
    /// ISO-4217 alphabetic code; adapters lowercase it where the provider requires
    pub currency: String,
    pub metadata: Option<JsonValue>,
    pub customer_id: Option<String>,
    pub method_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GatewayPaymentResponse {
    pub provider_payment_id: String,
    pub status: GatewayPaymentStatus,
    pub client_secret: Option<String>,
    pub next_action: Option<JsonValue>,
    pub raw: JsonValue,
}

#[derive(Debug, Clone)]
pub struct GatewayRefundRequest {
    pub provider_payment_id: String,
    pub amount: Option<i64>,
    pub reason: Option<String>,
    pub metadata: Option<JsonValue>,
}

#[derive(Debug, Clone)]
pub struct GatewayRefundResponse {
    pub provider_refund_id: String,
    pub status: GatewayRefundStatus,
    pub raw: JsonValue,
}

#[derive(Debug, Clone)]
pub struct GatewayStatusResponse {
    pub status: GatewayPaymentStatus,
    pub amount: Option<i64>,
    pub currency: Option<String>,
    pub metadata: Option<JsonValue>,
    pub raw: JsonValue,
}

/// Capability set required of every payment gateway adapter
///
/// Adapters are stateless across calls and constructed once per process.
/// Failures are signalled uniformly as a [`GatewayFault`].
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn kind(&self) -> GatewayKind;

    async fn create_payment(
        &self,
        req: &GatewayPaymentRequest,
    ) -> Result<GatewayPaymentResponse, GatewayFault>;

    async fn refund_payment(
        &self,
        req: &GatewayRefundRequest,
    ) -> Result<GatewayRefundResponse, GatewayFault>;

    async fn get_payment_status(
        &self,
        provider_payment_id: &str,
    ) -> Result<GatewayStatusResponse, GatewayFault>;

    /// Verify an inbound provider webhook; `None` when unsupported or invalid
    fn verify_webhook(&self, _payload: &[u8], _signature: &str, _secret: &str) -> Option<JsonValue> {
        None
    }

    async fn health_check(&self) -> bool {
        true
    }
}

/// The set of adapters enabled by configuration
pub struct GatewayRegistry {
    gateways: HashMap<GatewayKind, Arc<dyn PaymentGateway>>,
}

impl GatewayRegistry {
    pub fn from_config(config: &Config) -> Result<Self, GatewayFault> {
        let mut gateways: HashMap<GatewayKind, Arc<dyn PaymentGateway>> = HashMap::new();

        if config.enable_stripe {
            let key = config
                .stripe_secret_key
                .clone()
                .ok_or_else(|| GatewayFault::new("Missing STRIPE_SECRET_KEY"))?;
            gateways.insert(GatewayKind::Stripe, Arc::new(StripeGateway::new(key)?));
        }

        if config.enable_razorpay {
            let key_id = config
                .razorpay_key_id
                .clone()
                .ok_or_else(|| GatewayFault::new("Missing RAZORPAY_KEY_ID"))?;
            let key_secret = config
                .razorpay_key_secret
                .clone()
                .ok_or_else(|| GatewayFault::new("Missing RAZORPAY_KEY_SECRET"))?;
            gateways.insert(
                GatewayKind::Razorpay,
                Arc::new(RazorpayGateway::new(key_id, key_secret)?),
            );
        }

        if config.enable_mock {
            let mock_config = MockGatewayConfig {
                success_rate: config.mock_success_rate,
                average_latency_ms: config.mock_average_latency_ms,
                enable_chaos: config.mock_enable_chaos,
                chaos_rate: config.mock_chaos_rate,
            };
            gateways.insert(GatewayKind::Mock, Arc::new(MockGateway::new(mock_config)));
        }

        Ok(Self { gateways })
    }

    /// Build a registry from pre-constructed adapters (used by tests)
    pub fn from_adapters(adapters: Vec<Arc<dyn PaymentGateway>>) -> Self {
        let mut gateways: HashMap<GatewayKind, Arc<dyn PaymentGateway>> = HashMap::new();
        for adapter in adapters {
            gateways.insert(adapter.kind(), adapter);
        }
        Self { gateways }
    }

    pub fn get(&self, kind: GatewayKind) -> Option<Arc<dyn PaymentGateway>> {
        self.gateways.get(&kind).cloned()
    }

    pub fn is_enabled(&self, kind: GatewayKind) -> bool {
        self.gateways.contains_key(&kind)
    }
}
