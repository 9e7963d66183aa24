//! Connection pool subsystem.
//!
//! # Data Flow
//! ```text
//! caller → select_host() (round_robin.rs, weighted, skips down hosts)
//!     → acquire(host) (connection_pool.rs)
//!         → fresh free connection?            reuse as is
//!         → only stale free connections?      probe inline, then reuse
//!         → no free connection?               connect
//!     → caller executes its request on the raw connection
//!     → release(conn, outcome) (outcome.rs)
//!         → Ok:         back to the free list (host.rs), stamped as checked
//!         → Timeout:    close it, mark the host's free connections unchecked
//!         → OtherError: close it, fast-kill stale ones, schedule host for monitoring
//! ```
//!
//! # Design Decisions
//! - Host state lives behind one pool-wide lock, shared with the monitor
//! - A connection is in exactly one place: checked out, free, or closed
//! - A down host never keeps free connections

pub mod connection_pool;
pub(crate) mod host;
pub mod outcome;
pub mod round_robin;

pub use connection_pool::{ConnectionPool, HostSnapshot, PoolSnapshot};
pub use outcome::Outcome;
