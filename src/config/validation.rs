//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, weights > 0, status threshold)
//! - Detect unparsable and duplicate host addresses
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: FailoverConfig → Result<(), Vec<ValidationError>>

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::config::schema::FailoverConfig;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("pool.{0} must be greater than zero")]
    ZeroValue(&'static str),
    #[error("host `{address}`: {reason}")]
    InvalidHost { address: String, reason: String },
    #[error("host `{0}` is listed more than once")]
    DuplicateHost(String),
    #[error("host `{0}` has weight 0")]
    ZeroWeight(String),
    #[error("probe.path `{0}` must start with '/'")]
    ProbePath(String),
    #[error("probe.error_status {0} is not an HTTP status between 100 and 599")]
    ProbeStatus(u16),
    #[error("observability.metrics_address `{0}` is not a socket address")]
    MetricsAddress(String),
}

/// Check a parsed configuration, collecting every problem.
pub fn validate_config(config: &FailoverConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let pool = &config.pool;
    for (name, value) in [
        ("connect_timeout_ms", pool.connect_timeout_ms),
        ("is_alive_timeout_ms", pool.is_alive_timeout_ms),
        ("applicative_timeout_ms", pool.applicative_timeout_ms),
        ("acquisition_retry_limit", u64::from(pool.acquisition_retry_limit)),
        ("monitor_pause_ms", pool.monitor_pause_ms),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroValue(name));
        }
    }

    let mut seen = HashSet::new();
    for host in &config.hosts {
        if host.weight == 0 {
            errors.push(ValidationError::ZeroWeight(host.address.clone()));
        }
        match host.to_address() {
            Ok(address) => {
                if address.scheme() != "http" {
                    errors.push(ValidationError::InvalidHost {
                        address: host.address.clone(),
                        reason: format!("unsupported scheme `{}`", address.scheme()),
                    });
                }
                if !seen.insert(address) {
                    errors.push(ValidationError::DuplicateHost(host.address.clone()));
                }
            }
            Err(e) => errors.push(ValidationError::InvalidHost {
                address: host.address.clone(),
                reason: e.to_string(),
            }),
        }
    }

    if !config.probe.path.starts_with('/') {
        errors.push(ValidationError::ProbePath(config.probe.path.clone()));
    }
    if !(100..=599).contains(&config.probe.error_status) {
        errors.push(ValidationError::ProbeStatus(config.probe.error_status));
    }

    let observability = &config.observability;
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
