//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ControllerConfig (validated, immutable)
//!
//! On file change (Controller::watch_config):
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → atomic swap of the live config
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - A rejected reload keeps the previous config

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::load_config;
pub use schema::{BackoffKind, ControllerConfig, LogFormat, ObservabilityConfig, QueueConfig};
