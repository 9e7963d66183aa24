//! In-memory transport with scripted behavior, for unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::transport::{HostAddress, Probe, Transport, TransportError};

/// Scripted answer to a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProbeScript {
    Alive,
    NotAlive(u16),
    Timeout,
    Failed,
}

#[derive(Debug)]
pub(crate) struct FakeConnection {
    pub(crate) id: u64,
    pub(crate) address: HostAddress,
    pub(crate) operation_timeout: Option<Duration>,
}

#[derive(Debug, Default)]
struct HostScript {
    refuse_connect: bool,
    probes: VecDeque<ProbeScript>,
    default_probe: Option<ProbeScript>,
    connects: usize,
}

#[derive(Debug, Default)]
struct Script {
    hosts: HashMap<HostAddress, HostScript>,
    next_id: u64,
    open: HashSet<u64>,
    stale: HashSet<u64>,
    probes: usize,
    probe_delay: Duration,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut Script) -> R) -> R {
        let mut script = self.script.lock().unwrap();
        f(&mut script)
    }

    pub(crate) fn refuse_connect(&self, address: &HostAddress, refuse: bool) {
        self.with(|s| s.hosts.entry(address.clone()).or_default().refuse_connect = refuse);
    }

    pub(crate) fn push_probe(&self, address: &HostAddress, probe: ProbeScript) {
        self.with(|s| s.hosts.entry(address.clone()).or_default().probes.push_back(probe));
    }

    pub(crate) fn set_default_probe(&self, address: &HostAddress, probe: ProbeScript) {
        self.with(|s| s.hosts.entry(address.clone()).or_default().default_probe = Some(probe));
    }

    /// Every probe takes `delay` before answering.
    pub(crate) fn set_probe_delay(&self, delay: Duration) {
        self.with(|s| s.probe_delay = delay);
    }

    pub(crate) fn mark_stale(&self, id: u64) {
        self.with(|s| s.stale.insert(id));
    }

    pub(crate) fn connects(&self, address: &HostAddress) -> usize {
        self.with(|s| s.hosts.get(address).map_or(0, |h| h.connects))
    }

    pub(crate) fn probes(&self) -> usize {
        self.with(|s| s.probes)
    }

    pub(crate) fn open_connections(&self) -> usize {
        self.with(|s| s.open.len())
    }

    pub(crate) fn is_open(&self, id: u64) -> bool {
        self.with(|s| s.open.contains(&id))
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    type Connection = FakeConnection;

    async fn connect(
        &self,
        address: &HostAddress,
        _timeout: Duration,
    ) -> Result<FakeConnection, TransportError> {
        self.with(|s| {
            let host = s.hosts.entry(address.clone()).or_default();
            host.connects += 1;
            if host.refuse_connect {
                return Err(TransportError::Connect {
                    address: address.to_string(),
                    source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
                });
            }
            s.next_id += 1;
            let id = s.next_id;
            s.open.insert(id);
            Ok(FakeConnection {
                id,
                address: address.clone(),
                operation_timeout: None,
            })
        })
    }

    async fn probe(&self, conn: &mut FakeConnection, _timeout: Duration) -> Probe {
        let (script, delay) = self.with(|s| {
            s.probes += 1;
            let host = s.hosts.entry(conn.address.clone()).or_default();
            let script = host
                .probes
                .pop_front()
                .or(host.default_probe)
                .unwrap_or(ProbeScript::Alive);
            (script, s.probe_delay)
        });
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match script {
            ProbeScript::Alive => Probe::Alive,
            ProbeScript::NotAlive(status) => Probe::NotAlive { status },
            ProbeScript::Timeout => Probe::Timeout,
            ProbeScript::Failed => Probe::Failed(TransportError::Closed),
        }
    }

    fn set_operation_timeout(&self, conn: &mut FakeConnection, timeout: Duration) {
        conn.operation_timeout = Some(timeout);
    }

    fn is_stale(&self, conn: &mut FakeConnection) -> bool {
        self.with(|s| s.stale.contains(&conn.id))
    }

    fn close(&self, conn: FakeConnection) {
        self.with(|s| {
            assert!(s.open.remove(&conn.id), "connection {} closed twice", conn.id);
        });
    }

    fn address_of(&self, conn: &FakeConnection) -> HostAddress {
        conn.address.clone()
    }
}
