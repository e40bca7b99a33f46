//! Fallback ("snake oil") TLS credential.
//!
//! The files are produced by
//! `make-ssl-cert generate-default-snakeoil --force-overwrite`. Absence is
//! normal; callers check [`FallbackCredential::is_empty`] instead of handling
//! an error.

use std::fs;
use std::path::Path;

/// Default snake oil certificate path.
pub const SNAKE_OIL_PEM: &str = "/etc/ssl/certs/ssl-cert-snakeoil.pem";

/// Default snake oil private key path.
pub const SNAKE_OIL_KEY: &str = "/etc/ssl/private/ssl-cert-snakeoil.key";

/// Raw PEM contents of a certificate and its key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FallbackCredential {
    pub cert: String,
    pub key: String,
}

impl FallbackCredential {
    /// True when no credential was loaded.
    pub fn is_empty(&self) -> bool {
        self.cert.is_empty() || self.key.is_empty()
    }

    /// True when the PEM data holds at least one certificate and a private key.
    pub fn has_certificate(&self) -> bool {
        if self.is_empty() {
            return false;
        }
        let has_cert = rustls_pemfile::certs(&mut self.cert.as_bytes())
            .filter_map(Result::ok)
            .next()
            .is_some();
        let has_key = matches!(
            rustls_pemfile::private_key(&mut self.key.as_bytes()),
            Ok(Some(_))
        );
        has_cert && has_key
    }
}

/// Read a certificate/key pair; any read failure yields an empty credential.
pub fn read_credential(cert_path: &Path, key_path: &Path) -> FallbackCredential {
    let cert = match fs::read_to_string(cert_path) {
        Ok(cert) => cert,
        Err(e) => {
            tracing::debug!(path = ?cert_path, error = %e, "Fallback certificate not readable");
            return FallbackCredential::default();
        }
    };
    let key = match fs::read_to_string(key_path) {
        Ok(key) => key,
        Err(e) => {
            tracing::debug!(path = ?key_path, error = %e, "Fallback private key not readable");
            return FallbackCredential::default();
        }
    };
    FallbackCredential { cert, key }
}

/// The snake oil certificate and key, or two empty strings.
pub fn fake_ssl_cert() -> (String, String) {
    let credential = read_credential(Path::new(SNAKE_OIL_PEM), Path::new(SNAKE_OIL_KEY));
    (credential.cert, credential.key)
}
