//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;

use failover_pool::config::{FailoverConfig, HostConfig, PoolConfig};

/// Mock backend with a switchable liveness answer.
#[derive(Clone)]
pub struct MockBackend {
    pub addr: SocketAddr,
    alive_status: Arc<AtomicU16>,
    probes: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl MockBackend {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Status returned by `/isAlive` from now on.
    pub fn set_alive_status(&self, status: u16) {
        self.alive_status.store(status, Ordering::SeqCst);
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

/// Start a keep-alive HTTP backend on an ephemeral port.
///
/// `/isAlive` answers with the switchable status, `/` with `hello`.
pub async fn start_mock_backend() -> MockBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend = MockBackend {
        addr: listener.local_addr().unwrap(),
        alive_status: Arc::new(AtomicU16::new(200)),
        probes: Arc::new(AtomicUsize::new(0)),
    };

    let app = Router::new()
        .route("/isAlive", get(is_alive))
        .route("/", get(|| async { "hello" }))
        .with_state(backend.clone());

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    backend
}

async fn is_alive(State(backend): State<MockBackend>) -> StatusCode {
    backend.probes.fetch_add(1, Ordering::SeqCst);
    let status = backend.alive_status.load(Ordering::SeqCst);
    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// An address nothing listens on.
#[allow(dead_code)]
pub async fn dead_address() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Config over `urls` with short timeouts, weight 1 each.
#[allow(dead_code)]
pub fn config_for(urls: &[String]) -> FailoverConfig {
    FailoverConfig {
        pool: PoolConfig {
            connect_timeout_ms: 200,
            is_alive_timeout_ms: 200,
            applicative_timeout_ms: 1000,
            monitor_pause_ms: 10,
            ..PoolConfig::default()
        },
        hosts: urls.iter().map(|url| HostConfig::new(url.as_str(), 1)).collect(),
        ..FailoverConfig::default()
    }
}
