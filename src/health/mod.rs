//! Health monitoring subsystem.
//!
//! # Data Flow
//! ```text
//! Background monitor (monitor.rs):
//!     scheduler.rs picks the next host
//!     → probe its oldest free connection (or a fresh one)
//!     → update host state: alive, down, or recheck immediately
//!
//! Request path (pool):
//!     failed request on a host
//!     → scheduler moves the host to the front of the queue
//! ```
//!
//! # Design Decisions
//! - One monitor task per pool; checks are serialized
//! - Every host is checked once per epoch unless a failure reprioritizes it
//! - Down hosts are only brought back by a successful monitor probe

pub mod monitor;
pub mod scheduler;

pub use monitor::{CheckResult, MonitorCheck, MonitorLoop};
pub use scheduler::MonitorScheduler;
