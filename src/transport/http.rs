//! HTTP/1.1 keep-alive transport.
//!
//! # Responsibilities
//! - Open TCP connections (optionally bound to a local address, optionally via a proxy)
//! - Run the hyper HTTP/1.1 handshake and drive the connection in a background task
//! - Probe the liveness path and classify the answer
//! - Execute caller requests under the operation timeout
//!
//! TLS is not supported; `https` addresses fail at connect time.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderValue, Request, Response, Uri};
use hyper::body::Incoming;
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tokio::task::JoinHandle;
use tokio::time;

use crate::config::ProbeConfig;
use crate::transport::connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
use crate::transport::{HostAddress, Probe, Transport, TransportError};

/// Probe responses larger than this are treated as a broken connection.
const MAX_PROBE_BODY: usize = 64 * 1024;

/// Default operation timeout until the pool sets the applicative one.
const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(5);

/// A persistent HTTP/1.1 connection to one host.
///
/// Dropping it closes the socket.
#[derive(Debug)]
pub struct HttpConnection {
    address: HostAddress,
    sender: http1::SendRequest<Body>,
    driver: JoinHandle<()>,
    operation_timeout: Duration,
    guard: ConnectionGuard,
}

impl HttpConnection {
    pub fn id(&self) -> ConnectionId {
        self.guard.id()
    }

    pub fn address(&self) -> &HostAddress {
        &self.address
    }

    pub fn operation_timeout(&self) -> Duration {
        self.operation_timeout
    }

    /// URI for `path_and_query` on this connection's host.
    ///
    /// Origin-form when talking to the host directly, absolute-form through a proxy.
    pub fn uri_for(&self, path_and_query: &str) -> Result<Uri, TransportError> {
        let uri = if self.address.proxy().is_some() {
            format!(
                "{}://{}{}",
                self.address.scheme(),
                self.address.authority(),
                path_and_query
            )
        } else {
            path_and_query.to_string()
        };
        Uri::try_from(uri).map_err(|e| TransportError::Request(e.into()))
    }

    /// Execute a caller request under the operation timeout.
    ///
    /// The response body must be consumed before the connection is released,
    /// otherwise the next request on it waits for the previous one to finish.
    pub async fn execute(
        &mut self,
        request: Request<Body>,
    ) -> Result<Response<Incoming>, TransportError> {
        let timeout = self.operation_timeout;
        self.send(request, timeout).await
    }

    async fn send(
        &mut self,
        mut request: Request<Body>,
        timeout: Duration,
    ) -> Result<Response<Incoming>, TransportError> {
        if !request.headers().contains_key(header::HOST) {
            let host = HeaderValue::from_str(&self.address.authority())
                .map_err(|e| TransportError::Request(e.into()))?;
            request.headers_mut().insert(header::HOST, host);
        }

        let sender = &mut self.sender;
        let exchange = async move {
            sender.ready().await?;
            sender.send_request(request).await
        };
        match time::timeout(timeout, exchange).await {
            Ok(result) => result.map_err(TransportError::from),
            Err(_) => Err(TransportError::Timeout(timeout)),
        }
    }
}

impl Drop for HttpConnection {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

/// [`Transport`] over plain HTTP/1.1.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    probe: ProbeConfig,
    tracker: ConnectionTracker,
}

impl HttpTransport {
    pub fn new(probe: ProbeConfig) -> Self {
        Self {
            probe,
            tracker: ConnectionTracker::new(),
        }
    }

    /// Connections opened by this transport that are not closed yet.
    pub fn open_connections(&self) -> u64 {
        self.tracker.open_count()
    }

    async fn probe_once(&self, conn: &mut HttpConnection, timeout: Duration) -> Probe {
        let request = match conn.uri_for(&self.probe.path).and_then(|uri| {
            Request::get(uri)
                .header(header::USER_AGENT, "failover-pool-probe")
                .body(Body::empty())
                .map_err(TransportError::from)
        }) {
            Ok(request) => request,
            Err(e) => return Probe::Failed(e),
        };

        let started = time::Instant::now();
        let response = match conn.send(request, timeout).await {
            Ok(response) => response,
            Err(TransportError::Timeout(_)) => return Probe::Timeout,
            Err(e) => return Probe::Failed(e),
        };
        let status = response.status().as_u16();

        // Drain the body so the connection can carry the next request.
        let remaining = timeout.saturating_sub(started.elapsed());
        let body = axum::body::to_bytes(Body::new(response.into_body()), MAX_PROBE_BODY);
        match time::timeout(remaining, body).await {
            Ok(Ok(_)) => {}
            Ok(Err(_)) => return Probe::Failed(TransportError::Closed),
            Err(_) => return Probe::Timeout,
        }

        if status < self.probe.error_status {
            Probe::Alive
        } else {
            Probe::NotAlive { status }
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    type Connection = HttpConnection;

    async fn connect(
        &self,
        address: &HostAddress,
        timeout: Duration,
    ) -> Result<HttpConnection, TransportError> {
        if address.scheme() != "http" {
            return Err(TransportError::UnsupportedScheme(address.scheme().to_string()));
        }

        let (host, port) = address.connect_target();
        let stream = match time::timeout(timeout, open_stream(host, port, address.local_address())).await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(TransportError::Connect {
                    address: address.to_string(),
                    source,
                })
            }
            Err(_) => return Err(TransportError::Timeout(timeout)),
        };
        let _ = stream.set_nodelay(true);

        let (sender, connection) = http1::handshake(TokioIo::new(stream)).await?;
        let guard = self.tracker.track();
        let id = guard.id();
        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::trace!(connection_id = %id, error = %e, "Connection driver exited");
            }
        });

        tracing::debug!(host = %address, connection_id = %id, "Connection opened");
        Ok(HttpConnection {
            address: address.clone(),
            sender,
            driver,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            guard,
        })
    }

    async fn probe(&self, conn: &mut HttpConnection, timeout: Duration) -> Probe {
        self.probe_once(conn, timeout).await
    }

    fn set_operation_timeout(&self, conn: &mut HttpConnection, timeout: Duration) {
        conn.operation_timeout = timeout;
    }

    fn is_stale(&self, conn: &mut HttpConnection) -> bool {
        conn.sender.is_closed() || conn.driver.is_finished()
    }

    fn close(&self, conn: HttpConnection) {
        drop(conn);
    }

    fn address_of(&self, conn: &HttpConnection) -> HostAddress {
        conn.address.clone()
    }
}

async fn open_stream(host: &str, port: u16, local: Option<IpAddr>) -> io::Result<TcpStream> {
    let Some(local) = local else {
        return TcpStream::connect((host, port)).await;
    };

    let mut last_error = None;
    for remote in lookup_host((host, port)).await? {
        if remote.is_ipv4() != local.is_ipv4() {
            continue;
        }
        let socket = if remote.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.bind(SocketAddr::new(local, 0))?;
        match socket.connect(remote).await {
            Ok(stream) => return Ok(stream),
            Err(e) => last_error = Some(e),
        }
    }
    Err(last_error.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("no address of {} matches local address {}", host, local),
        )
    }))
}
