//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → supervised loops stop restarting
//!     → TaskQueue::shutdown drains and waits for the worker
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
