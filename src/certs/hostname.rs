//! Wildcard hostname matching for certificate selection.
//!
//! # Design Decisions
//! - Only the leftmost label may be the wildcard `*`
//! - A wildcard stands for exactly one label
//! - One trailing root dot is ignored on both sides
//! - Comparison is exact; callers normalise case beforehand

/// Returns true if `host` is covered by the certificate name `pattern`.
pub fn matches(pattern: &str, host: &str) -> bool {
    let host = host.strip_suffix('.').unwrap_or(host);
    let pattern = pattern.strip_suffix('.').unwrap_or(pattern);

    if pattern.is_empty() || host.is_empty() {
        return false;
    }

    let pattern_labels: Vec<&str> = pattern.split('.').collect();
    let host_labels: Vec<&str> = host.split('.').collect();

    if pattern_labels.len() != host_labels.len() {
        return false;
    }

    pattern_labels
        .iter()
        .zip(&host_labels)
        .enumerate()
        .all(|(i, (p, h))| (i == 0 && *p == "*") || p == h)
}

/// Returns true if any of `patterns` covers `host`.
pub fn is_host_valid<S: AsRef<str>>(host: &str, patterns: &[S]) -> bool {
    first_match(host, patterns).is_some()
}

/// The first of `patterns`, in order, that covers `host`.
pub fn first_match<'a, S: AsRef<str>>(host: &str, patterns: &'a [S]) -> Option<&'a str> {
    patterns
        .iter()
        .map(AsRef::as_ref)
        .find(|pattern| matches(pattern, host))
}
