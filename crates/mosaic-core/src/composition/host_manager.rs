//! Tracks the live composition hosts of a registry.
use std::sync::{Mutex, Weak};

use crate::composition::host::{CompositionHost, HostId, HostInner};
use crate::utils::lock;

/// Live hosts, held weakly so the manager never keeps a host alive.
#[derive(Default)]
pub struct HostManager {
    hosts: Mutex<Vec<(HostId, Weak<HostInner>)>>,
}

impl HostManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, id: HostId, host: Weak<HostInner>) {
        let mut hosts = lock(&self.hosts);
        hosts.retain(|(_, weak)| weak.strong_count() > 0);
        hosts.push((id, host));
        log::debug!("Registered host {} ({} live)", id, hosts.len());
    }

    pub(crate) fn deregister(&self, id: HostId) {
        lock(&self.hosts).retain(|(existing, _)| *existing != id);
    }

    /// Handles to every host that is still alive and not disposed.
    pub fn live_hosts(&self) -> Vec<CompositionHost> {
        // Upgrade outside the lock: dropping the last handle of a host
        // deregisters it, which takes the lock again.
        let weak: Vec<Weak<HostInner>> = lock(&self.hosts).iter().map(|(_, w)| w.clone()).collect();
        weak.iter()
            .filter_map(Weak::upgrade)
            .map(CompositionHost::from_inner)
            .filter(|host| !host.is_disposed())
            .collect()
    }

    pub fn host_count(&self) -> usize {
        lock(&self.hosts)
            .iter()
            .filter(|(_, weak)| weak.strong_count() > 0)
            .count()
    }
}

impl std::fmt::Debug for HostManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostManager")
            .field("hosts", &self.host_count())
            .finish()
    }
}
