//! Transport subsystem.
//!
//! # Data Flow
//! ```text
//! pool asks for a connection to a host
//!     → Transport::connect (bounded by connect/isAlive timeout)
//!     → Transport::probe for synchronous and background liveness checks
//!     → Transport::is_stale for non-blocking fast-kill of idle connections
//!     → caller executes requests on the raw connection
//!     → Transport::close when the pool discards it
//! ```
//!
//! # Design Decisions
//! - The pool is generic over [`Transport`]; it never touches sockets itself
//! - `close` and `is_stale` never block, so the pool may call them while
//!   holding its lock
//! - `connect` and `probe` are async and only ever called with the lock released

pub mod address;
pub mod connection;
pub mod http;

#[cfg(test)]
pub(crate) mod testing;

use std::time::Duration;

use async_trait::async_trait;

pub use address::{AddressError, HostAddress, ProxyAddress};
pub use connection::{ConnectionId, ConnectionTracker};
pub use http::{HttpConnection, HttpTransport};

/// Error type for transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connect to {address} failed: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("http error: {0}")]
    Http(#[from] hyper::Error),
    #[error("invalid request: {0}")]
    Request(#[from] axum::http::Error),
    #[error("unsupported scheme `{0}`")]
    UnsupportedScheme(String),
    #[error("connection closed")]
    Closed,
}

/// Result of a liveness probe on one connection.
#[derive(Debug)]
pub enum Probe {
    /// Host answered below the error threshold.
    Alive,
    /// Host answered, but says it should not get traffic.
    NotAlive { status: u16 },
    /// No answer within the isAlive timeout. Treated as a hung host.
    Timeout,
    /// The connection itself failed (reset, EOF). May be local to this socket.
    Failed(TransportError),
}

/// The capability the pool consumes to open, check and close connections.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Connection: Send + 'static;

    /// Open a new connection to `address`, giving up after `timeout`.
    async fn connect(
        &self,
        address: &HostAddress,
        timeout: Duration,
    ) -> Result<Self::Connection, TransportError>;

    /// Issue an out-of-band liveness request on `conn`.
    async fn probe(&self, conn: &mut Self::Connection, timeout: Duration) -> Probe;

    /// Timeout applied to requests the caller executes on `conn`.
    fn set_operation_timeout(&self, conn: &mut Self::Connection, timeout: Duration);

    /// Non-blocking check that the peer has not already closed or reset `conn`.
    fn is_stale(&self, conn: &mut Self::Connection) -> bool;

    fn close(&self, conn: Self::Connection);

    /// Host the connection was opened to.
    fn address_of(&self, conn: &Self::Connection) -> HostAddress;
}
