//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the pool.
//! All types derive Serde traits for deserialization from config files.

use std::net::IpAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::transport::{AddressError, HostAddress, ProxyAddress};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct FailoverConfig {
    /// Pool timeouts and limits.
    pub pool: PoolConfig,

    /// Liveness probe settings.
    pub probe: ProbeConfig,

    /// Hosts, in round-robin order.
    pub hosts: Vec<HostConfig>,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,
}

/// Pool timeouts and limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// A free connection checked longer ago than this is probed before reuse.
    pub max_check_delay_ms: u64,

    /// Timeout for opening a connection during acquisition.
    pub connect_timeout_ms: u64,

    /// Timeout for liveness probes, and for connects made by the monitor.
    pub is_alive_timeout_ms: u64,

    /// Operation timeout set on connections handed to callers.
    pub applicative_timeout_ms: u64,

    /// Bound on the acquisition loop.
    pub acquisition_retry_limit: u32,

    /// Pause between two monitor checks.
    pub monitor_pause_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_check_delay_ms: 1000,
            connect_timeout_ms: 500,
            is_alive_timeout_ms: 500,
            applicative_timeout_ms: 5000,
            acquisition_retry_limit: 10,
            monitor_pause_ms: 50,
        }
    }
}

impl PoolConfig {
    pub fn max_check_delay(&self) -> Duration {
        Duration::from_millis(self.max_check_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn is_alive_timeout(&self) -> Duration {
        Duration::from_millis(self.is_alive_timeout_ms)
    }

    pub fn applicative_timeout(&self) -> Duration {
        Duration::from_millis(self.applicative_timeout_ms)
    }

    pub fn monitor_pause(&self) -> Duration {
        Duration::from_millis(self.monitor_pause_ms)
    }
}

/// Liveness probe configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Path requested on the host.
    pub path: String,

    /// Statuses at or above this mean "not alive".
    pub error_status: u16,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            path: "/isAlive".to_string(),
            error_status: 400,
        }
    }
}

/// One backend host.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HostConfig {
    /// Host URL (e.g., "http://10.0.0.1:8080").
    pub address: String,

    /// Consecutive round-robin turns (default: 1).
    #[serde(default = "default_weight")]
    pub weight: u32,

    /// Local address to bind outgoing connections to.
    #[serde(default)]
    pub local_address: Option<IpAddr>,

    /// HTTP proxy, as `host:port`.
    #[serde(default)]
    pub proxy: Option<String>,
}

fn default_weight() -> u32 {
    1
}

impl HostConfig {
    pub fn new(address: impl Into<String>, weight: u32) -> Self {
        Self {
            address: address.into(),
            weight,
            local_address: None,
            proxy: None,
        }
    }

    /// Build the host identity the pool keys on.
    pub fn to_address(&self) -> Result<HostAddress, AddressError> {
        let mut address = HostAddress::parse(&self.address)?;
        if let Some(local) = self.local_address {
            address = address.with_local_address(local);
        }
        if let Some(proxy) = &self.proxy {
            address = address.with_proxy(ProxyAddress::parse(proxy)?);
        }
        Ok(address)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Expose a Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
