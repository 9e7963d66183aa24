//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     ConnectionPool::shutdown → close free connections → trigger signal
//!     → monitor task leaves its loop
//! ```
//!
//! # Design Decisions
//! - Checked-out connections are not reclaimed; they are closed when released
//! - Shutdown is idempotent

pub mod shutdown;

pub use shutdown::Shutdown;
