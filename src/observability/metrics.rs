//! Queue and sync metrics.
//!
//! # Metrics
//! - `ingress_queue_adds_total` (counter): keys newly queued or marked dirty
//! - `ingress_queue_retries_total` (counter): rate-limited requeues
//! - `ingress_queue_depth` (gauge): keys ready to be handed out
//! - `ingress_sync_total` (counter): sync attempts by result
//! - `ingress_sync_duration_seconds` (histogram): sync latency by result
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its HTTP scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_queue_add() {
    ::metrics::counter!("ingress_queue_adds_total").increment(1);
}

pub fn record_retry() {
    ::metrics::counter!("ingress_queue_retries_total").increment(1);
}

pub fn record_queue_depth(depth: usize) {
    ::metrics::gauge!("ingress_queue_depth").set(depth as f64);
}

pub fn record_sync(result: &'static str, start: Instant) {
    ::metrics::counter!("ingress_sync_total", "result" => result).increment(1);
    ::metrics::histogram!("ingress_sync_duration_seconds", "result" => result)
        .record(start.elapsed().as_secs_f64());
}
