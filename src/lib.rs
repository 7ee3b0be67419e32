//! OpenPayFlow: a payment-orchestration sandbox
//!
//! Merchants submit payment intents, the orchestrator routes them to a
//! payment gateway, persists the lifecycle durably and pushes state changes
//! to merchant webhook endpoints with at-least-once, signed delivery.
//!
//! The reliable spine is intake → outbox → scheduler: intake commits the
//! payment and its outbox row together, the drainer promotes outbox rows to
//! events and delivery fan-out exactly once, and the scheduler retries
//! deliveries with capped exponential backoff until DELIVERED or ABANDONED.

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod housekeeper;
pub mod middleware;
pub mod models;
pub mod outbox;
pub mod rate_limit;
pub mod repos;
pub mod routes;
pub mod services;
pub mod state;
pub mod webhook;
