use sqlx::PgPool;
use std::sync::Arc;
use std::time::Instant;
use work_queue::WorkQueue;

use crate::cache::Caches;
use crate::gateway::GatewayRegistry;
use crate::rate_limit::ApiKeyLimiter;
use crate::services::{PaymentService, RefundService};

/// Shared handles threaded through the HTTP surface and background tasks
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub queue: Arc<dyn WorkQueue>,
    pub gateways: Arc<GatewayRegistry>,
    pub caches: Caches,
    pub limiter: ApiKeyLimiter,
    pub started_at: Instant,
}

impl AppState {
    pub fn payment_service(&self) -> PaymentService {
        PaymentService::new(self.db.clone(), self.caches.clone(), self.gateways.clone())
    }

    pub fn refund_service(&self) -> RefundService {
        RefundService::new(self.db.clone(), self.caches.clone(), self.gateways.clone())
    }
}
