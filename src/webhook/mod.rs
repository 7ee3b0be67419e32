pub mod backoff;
pub mod scheduler;
pub mod sender;
pub mod signature;

pub use scheduler::{run_queue_consumer, run_retry_sweep, SchedulerContext};
pub use sender::WebhookSender;

/// Live delivery work list
pub const DELIVERY_QUEUE: &str = "webhook:delivery";
/// Abandoned delivery records
pub const DEAD_LETTER_QUEUE: &str = "dead:letter";
