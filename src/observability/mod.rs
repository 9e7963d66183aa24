//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! pool and monitor produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges)
//! ```
//!
//! # Design Decisions
//! - Host state transitions are logged once, not on every fast-fail
//! - Metrics are cheap (atomic increments) and no-ops without a recorder

pub mod logging;
pub mod metrics;
