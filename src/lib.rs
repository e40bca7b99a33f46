//! Ingress controller sync core.
//!
//! - [`queue`]: deduplicating, rate-limited work queue with one sync worker
//! - [`certs`]: wildcard hostname matching and the fallback credential
//! - [`key`]: queue keys and `namespace/name` parsing

// Core
pub mod certs;
pub mod key;
pub mod queue;

// Controller wiring
pub mod controller;
pub mod store;
pub mod upstream;

// Cross-cutting concerns
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod observability;

pub use config::ControllerConfig;
pub use controller::Controller;
pub use lifecycle::Shutdown;
pub use queue::{TaskQueue, WorkQueue};
