use relay_common::error::Result;
use relay_common::types::{ClusterStatusEntry, NodeAddress, DEFAULT_API_PORT};
use std::collections::HashMap;

/// Bare host -> reachable API port, built from one status report.
/// Hosts without an entry resolve to the default port.
#[derive(Debug, Clone, PartialEq)]
pub struct PortMap {
    ports: HashMap<String, u16>,
    default_port: u16,
}

impl Default for PortMap {
    fn default() -> Self {
        Self::new(DEFAULT_API_PORT)
    }
}

impl PortMap {
    pub fn new(default_port: u16) -> Self {
        Self {
            ports: HashMap::new(),
            default_port,
        }
    }

    /// Only entries whose address names a port contribute a mapping.
    pub fn from_entries(entries: &[ClusterStatusEntry], default_port: u16) -> Self {
        let mut map = Self::new(default_port);
        for entry in entries {
            if let Ok((host, Some(port))) = NodeAddress::split_port(&entry.ip) {
                map.ports.insert(host, port);
            }
        }
        map
    }

    pub fn port_for(&self, host: &str) -> u16 {
        self.ports.get(host).copied().unwrap_or(self.default_port)
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}

pub fn build_port_map(entries: &[ClusterStatusEntry]) -> PortMap {
    PortMap::from_entries(entries, DEFAULT_API_PORT)
}

/// Total and pure: unknown hosts get the map's default port.
pub fn resolve(host: &str, map: &PortMap) -> NodeAddress {
    NodeAddress::new(host, map.port_for(host))
}

/// Keeps an explicit port, otherwise looks the host up in the map.
pub fn resolve_raw(raw: &str, map: &PortMap) -> Result<NodeAddress> {
    let (host, port) = NodeAddress::split_port(raw)?;
    Ok(match port {
        Some(port) => NodeAddress::new(host, port),
        None => resolve(&host, map),
    })
}
