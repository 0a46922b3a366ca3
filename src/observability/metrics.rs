//! Metrics collection and exposition.
//!
//! # Metrics
//! - `governor_bulkhead_in_flight` (gauge): held slots per dependency
//! - `governor_bulkhead_rejections_total` (counter): by dependency, reason
//! - `governor_breaker_state` (gauge): 0=closed, 1=half_open, 2=open
//! - `governor_breaker_rejections_total` (counter): calls refused by an open breaker
//! - `governor_retries_total` (counter): retry sleeps started per dependency
//! - `governor_calls_total` (counter): governed calls by dependency, outcome
//! - `governor_call_duration_seconds` (histogram): end-to-end governed call time
//!
//! Without an installed recorder every call here is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::resilience::circuit_breaker::BreakerState;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_bulkhead_in_flight(dependency: &str, in_flight: usize) {
    metrics::gauge!("governor_bulkhead_in_flight", "dependency" => dependency.to_owned())
        .set(in_flight as f64);
}

pub fn record_bulkhead_rejection(dependency: &str, reason: &'static str) {
    metrics::counter!(
        "governor_bulkhead_rejections_total",
        "dependency" => dependency.to_owned(),
        "reason" => reason
    )
    .increment(1);
}

pub fn record_breaker_rejection(dependency: &str) {
    metrics::counter!(
        "governor_breaker_rejections_total",
        "dependency" => dependency.to_owned()
    )
    .increment(1);
}

pub fn record_breaker_state(dependency: &str, state: BreakerState) {
    let value = match state {
        BreakerState::Closed => 0.0,
        BreakerState::HalfOpen => 1.0,
        BreakerState::Open => 2.0,
    };
    metrics::gauge!("governor_breaker_state", "dependency" => dependency.to_owned()).set(value);
}

pub fn record_retry(dependency: &str) {
    metrics::counter!("governor_retries_total", "dependency" => dependency.to_owned()).increment(1);
}

pub fn record_call(dependency: &str, outcome: &'static str, start: Instant) {
    metrics::counter!(
        "governor_calls_total",
        "dependency" => dependency.to_owned(),
        "outcome" => outcome
    )
    .increment(1);
    metrics::histogram!(
        "governor_call_duration_seconds",
        "dependency" => dependency.to_owned()
    )
    .record(start.elapsed().as_secs_f64());
}
