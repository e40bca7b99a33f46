//! Work queue subsystem.
//!
//! # Data Flow
//! ```text
//! Watcher notices a change
//!     → task.rs (derive key, enqueue)
//!     → work_queue.rs (dedup: one pending entry per key)
//!     → worker (single task) → sync(key)
//!         → Ok:  forget (clear failures), done
//!         → Err: rate_limit.rs (next delay) → delayed → queued again, done
//! ```
//!
//! # Design Decisions
//! - One worker per queue; a key is never synced twice concurrently
//! - A key added while it is being synced is marked dirty and redelivered
//! - Backoff is per key, never a global throttle
//! - Only shutdown ends the worker; other exits are logged and restarted

pub mod rate_limit;
pub mod task;
pub mod work_queue;

pub use rate_limit::{ExponentialBackoff, FixedDelay, LinearBackoff, RateLimiter};
pub use task::TaskQueue;
pub use work_queue::{KeyState, WorkQueue};
