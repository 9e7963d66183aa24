//! The failover connection pool.
//!
//! # Responsibilities
//! - Register hosts and dispatch between them by weighted round robin
//! - Hand out a live connection per request, checking stale ones inline
//! - Apply the caller's outcome at release time (reuse, recheck, or fast-kill)
//! - Own the monitor scheduler driven by the background monitor task
//!
//! # Design Decisions
//! - One mutex guards every host, free list and the scheduler
//! - The lock is never held across an `.await`; connect and probe run unlocked
//! - A host-level failure is recorded in shared state before it is returned,
//!   so the next caller fails fast instead of probing again

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::{FailoverConfig, PoolConfig};
use crate::error::{InvariantViolation, PoolError};
use crate::health::{MonitorCheck, MonitorLoop, MonitorScheduler};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::pool::host::{HostState, MonitoredConnection};
use crate::pool::outcome::{self, Outcome};
use crate::pool::round_robin::RoundRobin;
use crate::transport::{HostAddress, Probe, Transport};

/// Index of a host in registration order. Hosts are never removed.
pub(crate) type HostId = usize;

/// Everything guarded by the pool lock.
#[derive(Debug)]
pub(crate) struct PoolState<C> {
    pub(crate) hosts: Vec<HostState<C>>,
    pub(crate) hosts_by_address: HashMap<HostAddress, HostId>,
    pub(crate) round_robin: RoundRobin,
    pub(crate) scheduler: MonitorScheduler<HostId>,
    pub(crate) closed: bool,
}

impl<C> PoolState<C> {
    fn new() -> Self {
        Self {
            hosts: Vec::new(),
            hosts_by_address: HashMap::new(),
            round_robin: RoundRobin::new(),
            scheduler: MonitorScheduler::new(),
            closed: false,
        }
    }
}

/// Point-in-time view of one host.
#[derive(Debug, Clone, Serialize)]
pub struct HostSnapshot {
    pub address: HostAddress,
    pub weight: u32,
    pub down: bool,
    pub in_flight: usize,
    pub free_connections: usize,
    /// Milliseconds since the monitor last validated the host.
    pub last_checked_ms_ago: Option<u64>,
    /// Milliseconds since an idle connection last served a request.
    pub last_used_ms_ago: Option<u64>,
}

/// Point-in-time view of the pool.
#[derive(Debug, Clone, Serialize)]
pub struct PoolSnapshot {
    pub shut_down: bool,
    pub hosts: Vec<HostSnapshot>,
}

/// Client-side pool of persistent connections to interchangeable hosts.
pub struct ConnectionPool<T: Transport> {
    transport: T,
    config: PoolConfig,
    state: Mutex<PoolState<T::Connection>>,
    shutdown: Shutdown,
}

impl<T: Transport> ConnectionPool<T> {
    pub fn new(transport: T, config: PoolConfig) -> Self {
        Self {
            transport,
            config,
            state: Mutex::new(PoolState::new()),
            shutdown: Shutdown::new(),
        }
    }

    /// Build a pool and register every configured host, in order.
    pub fn from_config(transport: T, config: &FailoverConfig) -> Result<Self, PoolError> {
        let pool = Self::new(transport, config.pool.clone());
        for host in &config.hosts {
            pool.add_host(host.to_address()?, host.weight)?;
        }
        Ok(pool)
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, PoolState<T::Connection>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown.subscribe()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_triggered()
    }

    /// Register a host. It starts alive and joins the end of the round-robin order.
    pub fn add_host(&self, address: HostAddress, weight: u32) -> Result<(), PoolError> {
        if weight == 0 {
            return Err(PoolError::InvalidWeight { address });
        }

        let mut state = self.lock();
        if state.closed {
            return Err(PoolError::ShutDown);
        }
        if state.hosts_by_address.contains_key(&address) {
            return Err(PoolError::DuplicateHost { address });
        }

        let id = state.hosts.len();
        state.hosts.push(HostState::new(address.clone(), weight));
        state.hosts_by_address.insert(address.clone(), id);
        state.scheduler.register(id);
        drop(state);

        metrics::record_host_state(&address, true);
        tracing::info!(host = %address, weight, "Host registered");
        Ok(())
    }

    /// Next alive host by weighted round robin.
    pub fn select_host(&self) -> Result<HostAddress, PoolError> {
        let mut state = self.lock();
        if state.closed {
            return Err(PoolError::ShutDown);
        }
        if state.hosts.is_empty() {
            return Err(PoolError::NoHosts);
        }

        let PoolState {
            hosts, round_robin, ..
        } = &mut *state;
        let index = round_robin
            .next_index(hosts.len(), |i| (!hosts[i].down).then_some(hosts[i].weight))
            .ok_or(PoolError::AllHostsDown)?;
        Ok(hosts[index].address.clone())
    }

    fn host_id(&self, address: &HostAddress) -> Result<HostId, PoolError> {
        self.lock()
            .hosts_by_address
            .get(address)
            .copied()
            .ok_or_else(|| PoolError::UnknownHost {
                address: address.clone(),
            })
    }

    /// Get a live connection to `address`.
    ///
    /// Reuses a recently checked free connection when there is one, otherwise
    /// probes an older one inline, otherwise connects. The connection comes
    /// back with the applicative timeout set and must be returned through
    /// [`release`](Self::release) or [`release_with_outcome`](Self::release_with_outcome).
    pub async fn acquire(&self, address: &HostAddress) -> Result<T::Connection, PoolError> {
        let result = self.acquire_inner(address).await;
        match &result {
            Ok(_) => metrics::record_acquire(address, "ok"),
            Err(e) => metrics::record_acquire(address, e.kind()),
        }
        result
    }

    async fn acquire_inner(&self, address: &HostAddress) -> Result<T::Connection, PoolError> {
        let id = self.host_id(address)?;
        let limit = self.config.acquisition_retry_limit.max(1);

        for attempt in 1..=limit {
            let (candidate, needs_check) = {
                let mut state = self.lock();
                if state.closed {
                    return Err(PoolError::ShutDown);
                }
                let host = &mut state.hosts[id];
                if host.down {
                    return Err(PoolError::HostDown {
                        address: address.clone(),
                    });
                }
                match host.take_recently_checked(Instant::now(), self.config.max_check_delay()) {
                    Some(fresh) => (Some(fresh), false),
                    None => {
                        // Nothing fresh: take the oldest so the monitor has one less to check.
                        let oldest = host.take_oldest();
                        let needs_check = oldest.is_some();
                        (oldest, needs_check)
                    }
                }
            };

            let mut conn = match candidate {
                Some(monitored) => monitored.conn,
                None => match self
                    .transport
                    .connect(address, self.config.connect_timeout())
                    .await
                {
                    Ok(conn) => conn,
                    Err(source) => {
                        // Connections opened concurrently by other callers may
                        // be fine, but a failed connect is strong enough to drop them all.
                        self.host_failed(id, "connect failed");
                        tracing::warn!(host = %address, error = %source, "Connect failed");
                        return Err(PoolError::Connect {
                            address: address.clone(),
                            source,
                        });
                    }
                },
            };

            if needs_check {
                match self
                    .transport
                    .probe(&mut conn, self.config.is_alive_timeout())
                    .await
                {
                    Probe::Alive => {}
                    Probe::NotAlive { status } => {
                        self.transport.close(conn);
                        self.host_failed(id, "not alive");
                        return Err(PoolError::NotAlive {
                            address: address.clone(),
                            status,
                        });
                    }
                    Probe::Timeout => {
                        // A hung host would hang every other probe too.
                        self.transport.close(conn);
                        self.host_failed(id, "liveness probe timed out");
                        return Err(PoolError::ProbeTimeout {
                            address: address.clone(),
                        });
                    }
                    Probe::Failed(error) => {
                        // Possibly just this socket. Drop it and any other dead
                        // ones, then retry with what is left or a new connect.
                        self.transport.close(conn);
                        let killed = self.lock().hosts[id].kill_stale(&self.transport);
                        metrics::record_connections_closed(address, killed + 1);
                        tracing::debug!(
                            host = %address,
                            attempt,
                            killed,
                            error = %error,
                            "Synchronous check failed, retrying"
                        );
                        continue;
                    }
                }
            }

            self.transport
                .set_operation_timeout(&mut conn, self.config.applicative_timeout());
            let mut state = self.lock();
            if state.closed {
                drop(state);
                self.transport.close(conn);
                return Err(PoolError::ShutDown);
            }
            state.hosts[id].in_flight += 1;
            return Ok(conn);
        }

        let violation = InvariantViolation::RetriesExhausted {
            address: address.clone(),
            attempts: limit,
        };
        tracing::error!(host = %address, attempts = limit, "Acquisition retry limit exceeded");
        Err(PoolError::Internal(violation))
    }

    /// Mark a host down and close its free connections. Logs the transition once.
    fn host_failed(&self, id: HostId, reason: &'static str) {
        let mut state = self.lock();
        let host = &mut state.hosts[id];
        let was_down = host.down;
        let closed = host.mark_down(&self.transport);
        metrics::record_connections_closed(&host.address, closed);
        if !was_down {
            metrics::record_host_state(&host.address, false);
            tracing::warn!(host = %host.address, reason, closed, "Host marked down");
        }
    }

    /// Park the outcome of the request this thread just made, for the next
    /// [`release`](Self::release) on this thread.
    pub fn report_failure(&self, address: &HostAddress, outcome: Outcome) {
        tracing::debug!(host = %address, outcome = outcome.as_str(), "Outcome reported");
        outcome::set_next_release_outcome(outcome);
    }

    /// Return a connection, applying the outcome parked by
    /// [`report_failure`](Self::report_failure) (`Ok` when none was).
    pub fn release(&self, conn: T::Connection) -> Result<(), PoolError> {
        self.release_with_outcome(conn, outcome::take_next_release_outcome())
    }

    /// Return a connection together with the outcome of the request made on it.
    pub fn release_with_outcome(
        &self,
        conn: T::Connection,
        outcome: Outcome,
    ) -> Result<(), PoolError> {
        let address = self.transport.address_of(&conn);
        let mut state = self.lock();
        let id = state.hosts_by_address.get(&address).copied();
        let Some(id) = id else {
            drop(state);
            self.transport.close(conn);
            tracing::warn!(host = %address, "Released connection to an unknown host");
            return Err(PoolError::UnknownHost { address });
        };

        let closed = state.closed;
        let PoolState {
            hosts, scheduler, ..
        } = &mut *state;
        let host = &mut hosts[id];
        host.in_flight = host.in_flight.saturating_sub(1);
        metrics::record_release(&address, outcome);

        match outcome {
            Outcome::Ok => {
                if closed || host.down {
                    self.transport.close(conn);
                    metrics::record_connections_closed(&address, 1);
                } else {
                    host.add_free(MonitoredConnection::used_at(conn, Instant::now()));
                }
            }
            Outcome::Timeout => {
                // Slow request or hung host: recheck everything before reuse.
                host.mark_connections_unchecked();
                self.transport.close(conn);
                metrics::record_connections_closed(&address, 1);
                tracing::debug!(host = %address, "Request timed out, free connections marked unchecked");
            }
            Outcome::OtherError => {
                let killed = host.kill_stale(&self.transport);
                scheduler.request_immediate(&id);
                self.transport.close(conn);
                metrics::record_connections_closed(&address, killed + 1);
                tracing::debug!(host = %address, killed, "Request failed, host scheduled for immediate check");
            }
        }
        Ok(())
    }

    /// Close every free connection and stop the monitor.
    ///
    /// Connections checked out at this point are closed when released.
    pub fn shutdown(&self) {
        let closed = {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            let mut closed = 0;
            for host in &mut state.hosts {
                let count = host.kill_all(&self.transport);
                metrics::record_connections_closed(&host.address, count);
                closed += count;
            }
            closed
        };
        self.shutdown.trigger();
        tracing::info!(closed_connections = closed, "Connection pool shut down");
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        let state = self.lock();
        let now = Instant::now();
        PoolSnapshot {
            shut_down: state.closed,
            hosts: state
                .hosts
                .iter()
                .map(|host| HostSnapshot {
                    address: host.address.clone(),
                    weight: host.weight,
                    down: host.down,
                    in_flight: host.in_flight,
                    free_connections: host.free_count(),
                    last_checked_ms_ago: host.last_checked.map(|t| millis_since(now, t)),
                    last_used_ms_ago: host.last_used().map(|t| millis_since(now, t)),
                })
                .collect(),
        }
    }

    /// Start the background monitor task.
    pub fn spawn_monitor(self: &Arc<Self>) -> JoinHandle<Result<(), PoolError>> {
        MonitorLoop::new(Arc::clone(self)).spawn()
    }

    /// Check hosts in scheduler order until every registered host was checked.
    ///
    /// A host whose probe hit a connection error is rechecked right away, so it
    /// may appear more than once. The pass gives up after
    /// `hosts * acquisition_retry_limit` checks.
    pub async fn monitor_once(self: &Arc<Self>) -> Result<Vec<MonitorCheck>, PoolError> {
        let monitor = MonitorLoop::new(Arc::clone(self));
        let hosts = self.lock().scheduler.len();
        let budget = hosts * self.config.acquisition_retry_limit.max(1) as usize;

        let mut checked = HashSet::with_capacity(hosts);
        let mut checks = Vec::with_capacity(hosts);
        while checked.len() < hosts && checks.len() < budget {
            let Some(check) = monitor.check_next().await? else {
                break;
            };
            checked.insert(check.address.clone());
            checks.push(check);
        }

        if checked.len() < hosts {
            tracing::warn!(
                checked = checked.len(),
                hosts,
                "Monitor pass ended before every host was checked"
            );
        }
        Ok(checks)
    }
}

fn millis_since(now: Instant, then: Instant) -> u64 {
    now.saturating_duration_since(then).as_millis() as u64
}
