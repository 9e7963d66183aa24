//! Pool error types.

use crate::transport::{AddressError, HostAddress, TransportError};

/// Internal accounting failure. Always a bug, never a transient condition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("monitor queues hold {queued} hosts but {hosts} are registered")]
    SchedulerAccounting { queued: usize, hosts: usize },
    #[error("acquisition on {address} gave up after {attempts} attempts")]
    RetriesExhausted { address: HostAddress, attempts: u32 },
}

/// Errors returned by the connection pool.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// The host is excluded from dispatch until the monitor sees it alive.
    #[error("host {address} is down")]
    HostDown { address: HostAddress },

    #[error("all hosts are down")]
    AllHostsDown,

    #[error("no hosts registered")]
    NoHosts,

    /// Opening a connection failed; the host has been marked down.
    #[error("could not connect to {address}: {source}")]
    Connect {
        address: HostAddress,
        #[source]
        source: TransportError,
    },

    /// The liveness probe answered with an error status; the host has been marked down.
    #[error("host {address} is not alive (status {status})")]
    NotAlive { address: HostAddress, status: u16 },

    /// The liveness probe hung; the host has been marked down.
    #[error("liveness probe on {address} timed out")]
    ProbeTimeout { address: HostAddress },

    #[error("host {address} is not part of this pool")]
    UnknownHost { address: HostAddress },

    #[error("host {address} is already registered")]
    DuplicateHost { address: HostAddress },

    #[error("host {address} has weight 0")]
    InvalidWeight { address: HostAddress },

    #[error(transparent)]
    InvalidAddress(#[from] AddressError),

    #[error("connection pool is shut down")]
    ShutDown,

    #[error("internal invariant violated: {0}")]
    Internal(#[from] InvariantViolation),
}

impl PoolError {
    /// The failure is tied to a host: try another host, not this one again.
    pub fn is_host_failure(&self) -> bool {
        matches!(
            self,
            PoolError::HostDown { .. }
                | PoolError::AllHostsDown
                | PoolError::Connect { .. }
                | PoolError::NotAlive { .. }
                | PoolError::ProbeTimeout { .. }
        )
    }

    /// Short label for metrics.
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            PoolError::HostDown { .. } => "host_down",
            PoolError::AllHostsDown => "all_hosts_down",
            PoolError::NoHosts => "no_hosts",
            PoolError::Connect { .. } => "connect_error",
            PoolError::NotAlive { .. } => "not_alive",
            PoolError::ProbeTimeout { .. } => "probe_timeout",
            PoolError::UnknownHost { .. } => "unknown_host",
            PoolError::DuplicateHost { .. } => "duplicate_host",
            PoolError::InvalidWeight { .. } => "invalid_weight",
            PoolError::InvalidAddress(_) => "invalid_address",
            PoolError::ShutDown => "shut_down",
            PoolError::Internal(_) => "internal",
        }
    }
}
