use async_trait::async_trait;
use dashmap::DashMap;
use rand::Rng;
use serde_json::{json, Value as JsonValue};
use std::time::Duration;
use uuid::Uuid;

use super::error::GatewayFault;
use super::{
    GatewayPaymentRequest, GatewayPaymentResponse, GatewayPaymentStatus, GatewayRefundRequest,
    GatewayRefundResponse, GatewayRefundStatus, GatewayStatusResponse, PaymentGateway,
};
use crate::models::GatewayKind;
use crate::webhook::signature;

/// Tunable behavior for the mock gateway
#[derive(Debug, Clone)]
pub struct MockGatewayConfig {
    /// Probability in [0, 1] that a payment or refund is approved
    pub success_rate: f64,
    /// Mean simulated provider latency; actual latency is jittered ±50%
    pub average_latency_ms: u64,
    /// When set, a `chaos_rate` fraction of calls fail with transport-style faults
    pub enable_chaos: bool,
    pub chaos_rate: f64,
}

impl Default for MockGatewayConfig {
    fn default() -> Self {
        Self {
            success_rate: 1.0,
            average_latency_ms: 0,
            enable_chaos: false,
            chaos_rate: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
struct MockPayment {
    amount: i64,
    currency: String,
    metadata: Option<JsonValue>,
    status: GatewayPaymentStatus,
}

/// Mock payment gateway for development and testing
///
/// The only adapter with observable state: approved payments and refunds
/// are kept in in-memory maps so `get_payment_status` and refund flows
/// behave like a real provider within one process.
pub struct MockGateway {
    config: MockGatewayConfig,
    payments: DashMap<String, MockPayment>,
    refunds: DashMap<String, i64>,
}

impl MockGateway {
    pub fn new(config: MockGatewayConfig) -> Self {
        Self {
            config,
            payments: DashMap::new(),
            refunds: DashMap::new(),
        }
    }

    /// Number of payments the mock has recorded (approved or declined)
    pub fn payment_count(&self) -> usize {
        self.payments.len()
    }

    async fn simulate_latency(&self) {
        if self.config.average_latency_ms == 0 {
            return;
        }
        let jittered = {
            let mut rng = rand::thread_rng();
            let factor: f64 = rng.gen_range(0.5..1.5);
            (self.config.average_latency_ms as f64 * factor) as u64
        };
        tokio::time::sleep(Duration::from_millis(jittered)).await;
    }

    /// Roll the chaos and approval dice up front so no RNG is held across awaits
    fn roll(&self) -> Roll {
        let mut rng = rand::thread_rng();
        if self.config.enable_chaos && rng.gen::<f64>() < self.config.chaos_rate {
            return Roll::Chaos;
        }
        if rng.gen::<f64>() < self.config.success_rate {
            Roll::Approved
        } else {
            Roll::Declined
        }
    }

    fn chaos_fault() -> GatewayFault {
        GatewayFault::new("mock gateway chaos: connection reset by provider")
            .with_code("provider_unreachable")
            .with_status(502)
    }
}

enum Roll {
    Approved,
    Declined,
    Chaos,
}

#[async_trait]
impl PaymentGateway for MockGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Mock
    }

    async fn create_payment(
        &self,
        req: &GatewayPaymentRequest,
    ) -> Result<GatewayPaymentResponse, GatewayFault> {
        let roll = self.roll();
        self.simulate_latency().await;

        let provider_payment_id = format!("mock_pi_{}", Uuid::new_v4().simple());

        match roll {
            Roll::Chaos => Err(Self::chaos_fault()),
            Roll::Declined => {
                self.payments.insert(
                    provider_payment_id.clone(),
                    MockPayment {
                        amount: req.amount,
                        currency: req.currency.clone(),
                        metadata: req.metadata.clone(),
                        status: GatewayPaymentStatus::Failed,
                    },
                );
                Err(GatewayFault::new("Payment declined by mock provider")
                    .with_code("card_declined"))
            }
            Roll::Approved => {
                self.payments.insert(
                    provider_payment_id.clone(),
                    MockPayment {
                        amount: req.amount,
                        currency: req.currency.clone(),
                        metadata: req.metadata.clone(),
                        status: GatewayPaymentStatus::Succeeded,
                    },
                );
                let raw = json!({
                    "id": provider_payment_id,
                    "status": "succeeded",
                    "amount": req.amount,
                    "currency": req.currency,
                });
                Ok(GatewayPaymentResponse {
                    provider_payment_id,
                    status: GatewayPaymentStatus::Succeeded,
                    client_secret: None,
                    next_action: None,
                    raw,
                })
            }
        }
    }

    async fn refund_payment(
        &self,
        req: &GatewayRefundRequest,
    ) -> Result<GatewayRefundResponse, GatewayFault> {
        let roll = self.roll();
        self.simulate_latency().await;

        let payment = self
            .payments
            .get(&req.provider_payment_id)
            .ok_or_else(|| {
                GatewayFault::new("No such payment")
                    .with_code("resource_missing")
                    .with_status(404)
            })?
            .clone();

        match roll {
            Roll::Chaos => Err(Self::chaos_fault()),
            Roll::Declined => Err(GatewayFault::new("Refund rejected by mock provider")
                .with_code("refund_rejected")),
            Roll::Approved => {
                let amount = req.amount.unwrap_or(payment.amount);
                let provider_refund_id = format!("mock_re_{}", Uuid::new_v4().simple());
                self.refunds.insert(provider_refund_id.clone(), amount);

                let raw = json!({
                    "id": provider_refund_id,
                    "status": "succeeded",
                    "amount": amount,
                    "payment": req.provider_payment_id,
                });
                Ok(GatewayRefundResponse {
                    provider_refund_id,
                    status: GatewayRefundStatus::Succeeded,
                    raw,
                })
            }
        }
    }

    async fn get_payment_status(
        &self,
        provider_payment_id: &str,
    ) -> Result<GatewayStatusResponse, GatewayFault> {
        self.simulate_latency().await;

        let payment = self
            .payments
            .get(provider_payment_id)
            .ok_or_else(|| {
                GatewayFault::new("No such payment")
                    .with_code("resource_missing")
                    .with_status(404)
            })?
            .clone();

        let status_str = match payment.status {
            GatewayPaymentStatus::Succeeded => "succeeded",
            GatewayPaymentStatus::Failed => "failed",
            _ => "processing",
        };

        Ok(GatewayStatusResponse {
            status: payment.status,
            amount: Some(payment.amount),
            currency: Some(payment.currency.clone()),
            metadata: payment.metadata.clone(),
            raw: json!({
                "id": provider_payment_id,
                "status": status_str,
                "amount": payment.amount,
            }),
        })
    }

    fn verify_webhook(&self, payload: &[u8], sig: &str, secret: &str) -> Option<JsonValue> {
        if signature::verify(secret, payload, sig) {
            serde_json::from_slice(payload).ok()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(amount: i64) -> GatewayPaymentRequest {
        GatewayPaymentRequest {
            amount,
            currency: "USD".to_string(),
            metadata: None,
            customer_id: None,
            method_id: None,
        }
    }

    #[tokio::test]
    async fn approves_at_full_success_rate() {
        let gateway = MockGateway::new(MockGatewayConfig::default());
        let response = gateway.create_payment(&request(1999)).await.unwrap();

        assert_eq!(response.status, GatewayPaymentStatus::Succeeded);
        assert!(response.provider_payment_id.starts_with("mock_pi_"));
        assert_eq!(gateway.payment_count(), 1);
    }

    #[tokio::test]
    async fn declines_at_zero_success_rate() {
        let gateway = MockGateway::new(MockGatewayConfig {
            success_rate: 0.0,
            ..Default::default()
        });

        let fault = gateway.create_payment(&request(1999)).await.unwrap_err();
        assert_eq!(fault.provider_code.as_deref(), Some("card_declined"));
        assert!(fault.http_status.is_none());
    }

    #[tokio::test]
    async fn chaos_raises_transport_fault() {
        let gateway = MockGateway::new(MockGatewayConfig {
            enable_chaos: true,
            chaos_rate: 1.0,
            ..Default::default()
        });

        let fault = gateway.create_payment(&request(500)).await.unwrap_err();
        assert_eq!(fault.http_status, Some(502));
        assert!(fault.is_server_error());
    }

    #[tokio::test]
    async fn status_lookup_reads_own_store() {
        let gateway = MockGateway::new(MockGatewayConfig::default());
        let created = gateway.create_payment(&request(750)).await.unwrap();

        let status = gateway
            .get_payment_status(&created.provider_payment_id)
            .await
            .unwrap();
        assert_eq!(status.status, GatewayPaymentStatus::Succeeded);
        assert_eq!(status.amount, Some(750));

        let missing = gateway.get_payment_status("mock_pi_nope").await.unwrap_err();
        assert_eq!(missing.provider_code.as_deref(), Some("resource_missing"));
    }

    #[tokio::test]
    async fn refund_requires_known_payment() {
        let gateway = MockGateway::new(MockGatewayConfig::default());
        let created = gateway.create_payment(&request(1000)).await.unwrap();

        let refund = gateway
            .refund_payment(&GatewayRefundRequest {
                provider_payment_id: created.provider_payment_id.clone(),
                amount: Some(400),
                reason: None,
                metadata: None,
            })
            .await
            .unwrap();
        assert_eq!(refund.status, GatewayRefundStatus::Succeeded);

        let missing = gateway
            .refund_payment(&GatewayRefundRequest {
                provider_payment_id: "mock_pi_nope".to_string(),
                amount: None,
                reason: None,
                metadata: None,
            })
            .await
            .unwrap_err();
        assert_eq!(missing.http_status, Some(404));
    }
}
