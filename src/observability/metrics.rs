//! Metrics collection and exposition.
//!
//! # Metrics
//! - `failover_pool_host_up` (gauge): 1=alive, 0=down, per host
//! - `failover_pool_acquire_total` (counter): acquisitions by host, result
//! - `failover_pool_release_total` (counter): releases by host, outcome
//! - `failover_pool_connections_closed_total` (counter): discarded connections by host
//! - `failover_pool_monitor_checks_total` (counter): monitor checks by host, result
//!
//! Recording is a no-op until a recorder is installed.

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::pool::Outcome;
use crate::transport::HostAddress;

/// Install the Prometheus recorder and its scrape endpoint.
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_host_state(host: &HostAddress, up: bool) {
    gauge!("failover_pool_host_up", "host" => host.to_string()).set(if up { 1.0 } else { 0.0 });
}

pub fn record_acquire(host: &HostAddress, result: &'static str) {
    counter!("failover_pool_acquire_total", "host" => host.to_string(), "result" => result)
        .increment(1);
}

pub fn record_release(host: &HostAddress, outcome: Outcome) {
    counter!("failover_pool_release_total", "host" => host.to_string(), "outcome" => outcome.as_str())
        .increment(1);
}

pub fn record_connections_closed(host: &HostAddress, count: usize) {
    if count > 0 {
        counter!("failover_pool_connections_closed_total", "host" => host.to_string())
            .increment(count as u64);
    }
}

pub fn record_monitor_check(host: &HostAddress, result: &'static str) {
    counter!("failover_pool_monitor_checks_total", "host" => host.to_string(), "result" => result)
        .increment(1);
}
