//! Taskfabric - event-driven multi-user task manager
//!
//! The core is the coordination layer around task state changes:
//! - Database-first mutations: commit one transaction (business rows plus
//!   outbox rows), then publish to the bus
//! - Three topics (`task-events`, `reminders`, `task-updates`) carrying a
//!   versioned envelope, partitioned by `user_id`
//! - Idempotent consumers: audit trail, recurring-task generation,
//!   reminder scheduling, live-update broadcast
//! - A durable wall-clock job scheduler with lease-based claims
//! - Per-user WebSocket fan-out with JWT-authenticated attach

pub mod adapters;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export key types for convenience
pub use domain::errors::{CoreError, CoreResult};
pub use domain::models::{EventEnvelope, EventKind, Task, Topic};
