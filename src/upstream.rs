//! Upstream model shared with the sync callback.

use serde::{Deserialize, Serialize};

/// Address of the built-in default backend.
pub const DEFAULT_BACKEND_ADDRESS: &str = "127.0.0.1";

/// Port of the built-in default backend.
pub const DEFAULT_BACKEND_PORT: &str = "8181";

/// A single backend endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct UpstreamServer {
    pub address: String,
    pub port: String,
}

impl UpstreamServer {
    pub fn new(address: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            port: port.into(),
        }
    }
}

/// A named group of backends.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Upstream {
    pub name: String,
    pub backends: Vec<UpstreamServer>,
}

impl Upstream {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            backends: Vec::new(),
        }
    }
}

/// True when the upstream's first backend is the built-in default backend.
pub fn is_default_upstream(upstream: Option<&Upstream>) -> bool {
    upstream
        .and_then(|ups| ups.backends.first())
        .is_some_and(|first| {
            first.address == DEFAULT_BACKEND_ADDRESS && first.port == DEFAULT_BACKEND_PORT
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_default_upstream() {
        assert!(!is_default_upstream(None));
        assert!(!is_default_upstream(Some(&Upstream::new("empty"))));

        let mut ups = Upstream::new("upstream-default-backend");
        ups.backends.push(UpstreamServer::new("127.0.0.1", "8181"));
        assert!(is_default_upstream(Some(&ups)));

        let mut other = Upstream::new("default-web-80");
        other.backends.push(UpstreamServer::new("10.0.0.7", "8080"));
        other.backends.push(UpstreamServer::new("127.0.0.1", "8181"));
        assert!(!is_default_upstream(Some(&other)));
    }
}
