use crate::error::{RelayError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type AppName = String;

/// Port every node's management API listens on unless told otherwise.
pub const DEFAULT_API_PORT: u16 = 16127;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeAddress {
    pub host: String,
    pub port: u16,
}

impl NodeAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parses `host`, `host:port` or `http(s)://host[:port][/path]`.
    pub fn parse(raw: &str) -> Result<Self> {
        let (host, port) = Self::split_port(raw)?;
        Ok(Self::new(host, port.unwrap_or(DEFAULT_API_PORT)))
    }

    /// Splits an address into its host and the port it names, if any.
    pub fn split_port(raw: &str) -> Result<(String, Option<u16>)> {
        let trimmed = raw.trim();
        let without_scheme = trimmed
            .strip_prefix("http://")
            .or_else(|| trimmed.strip_prefix("https://"))
            .unwrap_or(trimmed);
        let authority = without_scheme.split('/').next().unwrap_or_default();

        if authority.is_empty() {
            return Err(RelayError::InvalidAddress(raw.to_string()));
        }

        match authority.rsplit_once(':') {
            Some((host, port)) => {
                if host.is_empty() {
                    return Err(RelayError::InvalidAddress(raw.to_string()));
                }
                let port = port
                    .parse::<u16>()
                    .map_err(|_| RelayError::InvalidAddress(raw.to_string()))?;
                Ok((host.to_string(), Some(port)))
            }
            None => Ok((authority.to_string(), None)),
        }
    }

    /// Two addresses are the same node when their hosts match; ports may
    /// differ between discovery paths.
    pub fn same_node(&self, other: &NodeAddress) -> bool {
        self.host == other.host
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for NodeAddress {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// One row of an application's self-reported cluster status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterStatusEntry {
    pub ip: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default, rename = "seqNo")]
    pub seq_no: Option<i64>,
    #[serde(default, rename = "staticIp")]
    pub static_ip: Option<bool>,
    #[serde(default, rename = "osUptime")]
    pub os_uptime: Option<i64>,
    #[serde(default, rename = "masterIP")]
    pub master_ip: Option<String>,
}

impl ClusterStatusEntry {
    pub fn host(&self) -> &str {
        match self.ip.rsplit_once(':') {
            Some((host, _)) => host,
            None => &self.ip,
        }
    }
}

/// Payload of an application's `/status` endpoint and of the domain manager.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusReport {
    #[serde(default)]
    pub status: String,
    #[serde(default, rename = "masterIP")]
    pub master_ip: Option<String>,
    #[serde(default, rename = "clusterStatus")]
    pub cluster_status: Vec<ClusterStatusEntry>,
    #[serde(default)]
    pub region: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MasterSource {
    Fdm,
    Haproxy,
}

impl fmt::Display for MasterSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MasterSource::Fdm => write!(f, "FDM"),
            MasterSource::Haproxy => write!(f, "HAPROXY"),
        }
    }
}

/// The observed master of an application. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MasterCandidate {
    master_address: NodeAddress,
    all_addresses: Vec<NodeAddress>,
    source: MasterSource,
    region: Option<String>,
}

impl MasterCandidate {
    pub fn new(
        master_address: NodeAddress,
        all_addresses: Vec<NodeAddress>,
        source: MasterSource,
        region: Option<String>,
    ) -> Self {
        Self {
            master_address,
            all_addresses,
            source,
            region,
        }
    }

    pub fn master_address(&self) -> &NodeAddress {
        &self.master_address
    }

    pub fn all_addresses(&self) -> &[NodeAddress] {
        &self.all_addresses
    }

    pub fn source(&self) -> MasterSource {
        self.source
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }
}

/// An application, optionally narrowed to one component of a multi-component
/// deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppTarget {
    pub app: AppName,
    pub component: Option<String>,
}

impl AppTarget {
    pub fn new(app: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            component: None,
        }
    }

    pub fn with_component(app: impl Into<String>, component: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            component: Some(component.into()),
        }
    }

    /// Name the node API expects: `component_app` for components.
    pub fn wire_name(&self) -> String {
        match &self.component {
            Some(component) if !component.is_empty() => format!("{}_{}", component, self.app),
            _ => self.app.clone(),
        }
    }
}
