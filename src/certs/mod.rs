//! Certificate selection.
//!
//! # Data Flow
//! ```text
//! Request host + certificate names (CN/SANs)
//!     → hostname.rs (leftmost-wildcard match)
//!     → matched certificate, or
//!     → fallback.rs (snake oil pair, possibly empty)
//! ```

pub mod fallback;
pub mod hostname;

pub use fallback::{fake_ssl_cert, read_credential, FallbackCredential};
pub use hostname::{first_match, is_host_valid, matches};
