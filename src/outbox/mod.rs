pub mod drainer;

pub use drainer::run_outbox_drainer;
