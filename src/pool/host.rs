//! Per-host state.
//!
//! # Responsibilities
//! - Represent a single backend host and its alive/down flag
//! - Keep the free connections ordered by check recency
//! - Close connections on down transitions and fast-kill stale ones
//!
//! Every method here runs with the pool lock held and never blocks.

use std::time::Duration;

use tokio::time::Instant;

use crate::transport::{HostAddress, Transport};

/// A pool-owned idle connection plus its bookkeeping.
#[derive(Debug)]
pub(crate) struct MonitoredConnection<C> {
    pub(crate) conn: C,
    /// Last successful probe or successful use. `None` forces a synchronous check.
    pub(crate) last_checked: Option<Instant>,
    pub(crate) last_used: Option<Instant>,
}

impl<C> MonitoredConnection<C> {
    /// A connection that has just been validated.
    pub(crate) fn checked_at(conn: C, now: Instant) -> Self {
        Self {
            conn,
            last_checked: Some(now),
            last_used: None,
        }
    }

    /// A connection that has just been used successfully.
    pub(crate) fn used_at(conn: C, now: Instant) -> Self {
        Self {
            conn,
            last_checked: Some(now),
            last_used: Some(now),
        }
    }

    fn checked_within(&self, now: Instant, max_delay: Duration) -> bool {
        self.last_checked
            .is_some_and(|checked| now.saturating_duration_since(checked) <= max_delay)
    }
}

/// A single backend host.
#[derive(Debug)]
pub(crate) struct HostState<C> {
    /// Identity of the host.
    pub(crate) address: HostAddress,
    /// Consecutive round-robin turns.
    pub(crate) weight: u32,
    /// Excluded from acquisitions until the monitor sees it alive.
    pub(crate) down: bool,
    /// Connections currently checked out.
    pub(crate) in_flight: usize,
    /// Idle connections, oldest-checked first. Unchecked ones sort first.
    free: Vec<MonitoredConnection<C>>,
    /// Last time the monitor validated this host.
    pub(crate) last_checked: Option<Instant>,
}

impl<C> HostState<C> {
    pub(crate) fn new(address: HostAddress, weight: u32) -> Self {
        Self {
            address,
            weight,
            down: false,
            in_flight: 0,
            free: Vec::new(),
            last_checked: None,
        }
    }

    pub(crate) fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Most recent successful use among the idle connections.
    pub(crate) fn last_used(&self) -> Option<Instant> {
        self.free.iter().filter_map(|c| c.last_used).max()
    }

    /// Take the oldest-checked connection validated within `max_delay`.
    ///
    /// Preferring the oldest fresh one spreads staleness evenly over the free list.
    pub(crate) fn take_recently_checked(
        &mut self,
        now: Instant,
        max_delay: Duration,
    ) -> Option<MonitoredConnection<C>> {
        let index = self
            .free
            .iter()
            .position(|c| c.checked_within(now, max_delay))?;
        Some(self.free.remove(index))
    }

    pub(crate) fn take_oldest(&mut self) -> Option<MonitoredConnection<C>> {
        if self.free.is_empty() {
            None
        } else {
            Some(self.free.remove(0))
        }
    }

    /// Insert keeping the free list sorted by `last_checked`.
    pub(crate) fn add_free(&mut self, conn: MonitoredConnection<C>) {
        let index = self
            .free
            .partition_point(|c| c.last_checked <= conn.last_checked);
        self.free.insert(index, conn);
    }

    /// Force a synchronous check before any free connection is reused.
    pub(crate) fn mark_connections_unchecked(&mut self) {
        for conn in &mut self.free {
            conn.last_checked = None;
        }
    }

    pub(crate) fn kill_all<T>(&mut self, transport: &T) -> usize
    where
        T: Transport<Connection = C>,
    {
        let count = self.free.len();
        for conn in self.free.drain(..) {
            transport.close(conn.conn);
        }
        count
    }

    /// Close every free connection the transport reports as stale.
    pub(crate) fn kill_stale<T>(&mut self, transport: &T) -> usize
    where
        T: Transport<Connection = C>,
    {
        let before = self.free.len();
        let mut kept = Vec::with_capacity(before);
        for mut conn in self.free.drain(..) {
            if transport.is_stale(&mut conn.conn) {
                transport.close(conn.conn);
            } else {
                kept.push(conn);
            }
        }
        self.free = kept;
        before - self.free.len()
    }

    /// Declare the host down and close its free connections.
    pub(crate) fn mark_down<T>(&mut self, transport: &T) -> usize
    where
        T: Transport<Connection = C>,
    {
        self.down = true;
        self.kill_all(transport)
    }

    pub(crate) fn mark_alive(&mut self, now: Instant) {
        self.down = false;
        self.last_checked = Some(now);
    }

    #[cfg(test)]
    pub(crate) fn free_connections(&self) -> impl Iterator<Item = &MonitoredConnection<C>> {
        self.free.iter()
    }
}
