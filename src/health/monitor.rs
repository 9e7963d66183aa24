//! Background host monitoring.
//!
//! # Responsibilities
//! - Visit hosts in scheduler order and probe each one
//! - Bring down hosts back once they answer
//! - Declare hung or failing hosts down and close their connections
//! - Stop on pool shutdown

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::error::PoolError;
use crate::observability::metrics;
use crate::pool::host::MonitoredConnection;
use crate::pool::ConnectionPool;
use crate::transport::{HostAddress, Probe, Transport};

/// What one monitor check concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckResult {
    Alive,
    /// Could not open a connection; host marked down.
    ConnectFailed,
    /// Probe answered with an error status; host marked down.
    NotAlive { status: u16 },
    /// Probe hung; host marked down.
    Timeout,
    /// The probed connection broke; host queued for an immediate recheck.
    ConnectionError,
}

impl CheckResult {
    fn as_str(&self) -> &'static str {
        match self {
            CheckResult::Alive => "alive",
            CheckResult::ConnectFailed => "connect_failed",
            CheckResult::NotAlive { .. } => "not_alive",
            CheckResult::Timeout => "timeout",
            CheckResult::ConnectionError => "connection_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorCheck {
    pub address: HostAddress,
    pub result: CheckResult,
}

/// The single background task re-validating hosts.
pub struct MonitorLoop<T: Transport> {
    pool: Arc<ConnectionPool<T>>,
}

impl<T: Transport> MonitorLoop<T> {
    pub fn new(pool: Arc<ConnectionPool<T>>) -> Self {
        Self { pool }
    }

    pub fn spawn(self) -> JoinHandle<Result<(), PoolError>> {
        tokio::spawn(self.run())
    }

    /// Check hosts until the pool shuts down.
    ///
    /// Only returns an error for an internal invariant violation.
    pub async fn run(self) -> Result<(), PoolError> {
        let mut shutdown = self.pool.subscribe_shutdown();
        let pause = self.pool.config().monitor_pause();

        tracing::info!(pause_ms = pause.as_millis() as u64, "Monitor loop starting");

        while !self.pool.is_shut_down() {
            // Not raced against shutdown: the connection held by a check must
            // end up back in the pool or in `Transport::close`.
            if let Err(e) = self.check_next().await {
                tracing::error!(error = %e, "Monitor loop stopped");
                return Err(e);
            }

            tokio::select! {
                _ = time::sleep(jittered(pause)) => {}
                _ = shutdown.recv() => break,
            }
        }

        tracing::info!("Monitor loop received shutdown signal, exiting loop");
        Ok(())
    }

    /// Check the next scheduled host. `None` when there is nothing to check.
    pub async fn check_next(&self) -> Result<Option<MonitorCheck>, PoolError> {
        let pool = &self.pool;
        let transport = pool.transport();
        let timeout = pool.config().is_alive_timeout();

        let (id, address, candidate) = {
            let mut state = pool.lock();
            if state.closed {
                return Ok(None);
            }
            let Some(id) = state.scheduler.next()? else {
                return Ok(None);
            };
            let host = &mut state.hosts[id];
            (id, host.address.clone(), host.take_oldest())
        };

        let mut conn = match candidate {
            Some(monitored) => monitored.conn,
            None => match transport.connect(&address, timeout).await {
                Ok(conn) => conn,
                Err(error) => {
                    tracing::debug!(host = %address, error = %error, "Monitor could not connect");
                    self.mark_down(id, &address, "connect failed");
                    return Ok(Some(self.finish(address, CheckResult::ConnectFailed)));
                }
            },
        };

        let result = match transport.probe(&mut conn, timeout).await {
            Probe::Alive => {
                let mut state = pool.lock();
                if state.closed {
                    drop(state);
                    transport.close(conn);
                } else {
                    let now = Instant::now();
                    let host = &mut state.hosts[id];
                    let was_down = host.down;
                    host.mark_alive(now);
                    host.add_free(MonitoredConnection::checked_at(conn, now));
                    if was_down {
                        metrics::record_host_state(&address, true);
                        tracing::info!(host = %address, "Host is alive again");
                    }
                }
                CheckResult::Alive
            }
            Probe::Failed(error) => {
                // Rarely just this socket: prune the other dead ones and look again right away.
                let mut state = pool.lock();
                transport.close(conn);
                let killed = state.hosts[id].kill_stale(transport);
                state.scheduler.request_immediate(&id);
                drop(state);
                metrics::record_connections_closed(&address, killed + 1);
                tracing::debug!(host = %address, killed, error = %error, "Monitor probe failed, rechecking");
                CheckResult::ConnectionError
            }
            Probe::NotAlive { status } => {
                transport.close(conn);
                self.mark_down(id, &address, "not alive");
                CheckResult::NotAlive { status }
            }
            Probe::Timeout => {
                // Checking each connection of a hung host would be too slow.
                transport.close(conn);
                self.mark_down(id, &address, "liveness probe timed out");
                CheckResult::Timeout
            }
        };

        Ok(Some(self.finish(address, result)))
    }

    fn mark_down(&self, id: usize, address: &HostAddress, reason: &'static str) {
        let mut state = self.pool.lock();
        let host = &mut state.hosts[id];
        let was_down = host.down;
        let closed = host.mark_down(self.pool.transport());
        drop(state);

        metrics::record_connections_closed(address, closed);
        if !was_down {
            metrics::record_host_state(address, false);
            tracing::warn!(host = %address, reason, closed, "Host marked down by monitor");
        }
    }

    fn finish(&self, address: HostAddress, result: CheckResult) -> MonitorCheck {
        metrics::record_monitor_check(&address, result.as_str());
        tracing::trace!(host = %address, result = result.as_str(), "Monitor check done");
        MonitorCheck { address, result }
    }
}

/// `base` plus up to 10% jitter, so several pools do not probe in lockstep.
fn jittered(base: Duration) -> Duration {
    let jitter_range = base.as_millis() as u64 / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };
    base + Duration::from_millis(jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::pool::Outcome;
    use crate::transport::testing::{ProbeScript, ScriptedTransport};

    fn addr(name: &str) -> HostAddress {
        HostAddress::new(name, 80)
    }

    fn monitor_with(hosts: &[&str]) -> MonitorLoop<ScriptedTransport> {
        let pool = ConnectionPool::new(ScriptedTransport::new(), PoolConfig::default());
        for name in hosts {
            pool.add_host(addr(name), 1).unwrap();
        }
        MonitorLoop::new(Arc::new(pool))
    }

    async fn check(monitor: &MonitorLoop<ScriptedTransport>) -> MonitorCheck {
        monitor.check_next().await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn visits_hosts_in_turn_and_keeps_probed_connection() {
        let monitor = monitor_with(&["a", "b"]);

        let first = check(&monitor).await;
        let second = check(&monitor).await;
        assert_eq!(first, MonitorCheck { address: addr("a"), result: CheckResult::Alive });
        assert_eq!(second.address, addr("b"));

        let snapshot = monitor.pool.snapshot();
        assert!(snapshot.hosts.iter().all(|h| h.free_connections == 1));
        assert!(snapshot.hosts.iter().all(|h| h.last_checked_ms_ago.is_some()));

        // next epoch reuses the free connection instead of connecting again
        check(&monitor).await;
        assert_eq!(monitor.pool.transport().connects(&addr("a")), 1);
    }

    #[tokio::test]
    async fn recovers_a_down_host() {
        let monitor = monitor_with(&["a"]);
        let transport = monitor.pool.transport();
        transport.refuse_connect(&addr("a"), true);
        assert!(monitor.pool.acquire(&addr("a")).await.is_err());
        assert!(monitor.pool.snapshot().hosts[0].down);

        assert_eq!(check(&monitor).await.result, CheckResult::ConnectFailed);
        assert!(monitor.pool.snapshot().hosts[0].down);

        transport.refuse_connect(&addr("a"), false);
        assert_eq!(check(&monitor).await.result, CheckResult::Alive);
        assert!(!monitor.pool.snapshot().hosts[0].down);
        assert_eq!(monitor.pool.select_host().unwrap(), addr("a"));

        // the probed connection is fresh, so acquiring needs no extra probe
        let conn = monitor.pool.acquire(&addr("a")).await.unwrap();
        assert_eq!(transport.probes(), 1);
        monitor.pool.release(conn).unwrap();
    }

    #[tokio::test]
    async fn connection_error_reschedules_same_host() {
        let monitor = monitor_with(&["a", "b", "c"]);
        monitor.pool.transport().push_probe(&addr("a"), ProbeScript::Failed);

        let first = check(&monitor).await;
        assert_eq!(first, MonitorCheck { address: addr("a"), result: CheckResult::ConnectionError });
        assert!(!monitor.pool.snapshot().hosts[0].down);
        assert_eq!(monitor.pool.transport().open_connections(), 0);

        assert_eq!(check(&monitor).await, MonitorCheck { address: addr("a"), result: CheckResult::Alive });
        assert_eq!(check(&monitor).await.address, addr("b"));
    }

    #[tokio::test]
    async fn timeout_and_not_alive_mark_host_down() {
        let monitor = monitor_with(&["a", "b"]);
        let transport = monitor.pool.transport();
        check(&monitor).await;
        check(&monitor).await;

        transport.push_probe(&addr("a"), ProbeScript::Timeout);
        transport.push_probe(&addr("b"), ProbeScript::NotAlive(500));
        assert_eq!(check(&monitor).await.result, CheckResult::Timeout);
        assert_eq!(check(&monitor).await.result, CheckResult::NotAlive { status: 500 });

        let snapshot = monitor.pool.snapshot();
        assert!(snapshot.hosts.iter().all(|h| h.down && h.free_connections == 0));
        assert_eq!(transport.open_connections(), 0);
        assert!(matches!(monitor.pool.select_host(), Err(PoolError::AllHostsDown)));
    }

    #[tokio::test]
    async fn failed_request_preempts_the_epoch() {
        let monitor = monitor_with(&["a", "b", "c"]);
        let conn = monitor.pool.acquire(&addr("b")).await.unwrap();
        assert_eq!(check(&monitor).await.address, addr("a"));

        monitor.pool.release_with_outcome(conn, Outcome::OtherError).unwrap();
        assert_eq!(check(&monitor).await.address, addr("b"));
        assert_eq!(check(&monitor).await.address, addr("c"));
    }

    #[tokio::test]
    async fn nothing_to_check() {
        let monitor = monitor_with(&[]);
        assert_eq!(monitor.check_next().await.unwrap(), None);

        let monitor = monitor_with(&["a"]);
        monitor.pool.shutdown();
        assert_eq!(monitor.check_next().await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_shutdown() {
        let monitor = monitor_with(&["a", "b"]);
        let pool = Arc::clone(&monitor.pool);
        let handle = monitor.spawn();

        time::sleep(Duration::from_millis(500)).await;
        assert!(pool.snapshot().hosts.iter().all(|h| h.free_connections == 1));

        pool.shutdown();
        assert!(handle.await.unwrap().is_ok());
        assert_eq!(pool.transport().open_connections(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_lets_the_running_check_close_its_connection() {
        let monitor = monitor_with(&["a"]);
        let pool = Arc::clone(&monitor.pool);
        pool.transport().set_probe_delay(Duration::from_millis(100));
        let handle = monitor.spawn();

        // the monitor is now waiting on its first probe
        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(pool.transport().open_connections(), 1);
        pool.shutdown();

        assert!(handle.await.unwrap().is_ok());
        assert_eq!(pool.transport().probes(), 1);
        assert_eq!(pool.transport().open_connections(), 0);
        assert_eq!(pool.snapshot().hosts[0].free_connections, 0);
    }

    #[test]
    fn jitter_stays_within_ten_percent() {
        for _ in 0..100 {
            let pause = jittered(Duration::from_millis(50));
            assert!(pause >= Duration::from_millis(50));
            assert!(pause < Duration::from_millis(55));
        }
        assert_eq!(jittered(Duration::ZERO), Duration::ZERO);
    }
}
