//! Client-side failover connection pool.
//!
//! Keeps persistent connections to a set of interchangeable hosts, spreads
//! requests over them by weighted round robin, and takes hosts out of
//! rotation as soon as they look dead. A background monitor brings them back.
//!
//! ```text
//!   caller ──select_host──▶ pool ──acquire──▶ connection ──request──▶ host
//!     ▲                      ▲                                  │
//!     └──────release(outcome)┘◀─────────────────────────────────┘
//!                            │
//!                   monitor task probes hosts
//!                   (scheduler order, priority rechecks)
//! ```

pub mod config;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod observability;
pub mod pool;
pub mod transport;

pub use config::FailoverConfig;
pub use error::{InvariantViolation, PoolError};
pub use health::{CheckResult, MonitorCheck};
pub use pool::{ConnectionPool, HostSnapshot, Outcome, PoolSnapshot};
pub use transport::{HostAddress, HttpConnection, HttpTransport, Probe, Transport, TransportError};
