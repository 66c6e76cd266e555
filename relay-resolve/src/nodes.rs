use crate::master::MasterResolver;
use crate::ports::{resolve, PortMap};
use crate::status::StatusClient;
use relay_common::config::RelayConfig;
use relay_common::error::Result;
use relay_common::types::{MasterCandidate, NodeAddress};
use std::time::Duration;
use tracing::{info, warn};

/// Preference-ordered nodes for one operation.
#[derive(Debug, Clone)]
pub struct ResolvedNodes {
    pub nodes: Vec<NodeAddress>,
    pub master: Option<MasterCandidate>,
}

/// Master first, then its fellow replicas, then caller-supplied nodes.
/// Duplicates are dropped by host, ignoring ports.
pub fn preference_order(
    master: Option<&MasterCandidate>,
    supplied: &[NodeAddress],
) -> Vec<NodeAddress> {
    let mut ordered: Vec<NodeAddress> = Vec::new();
    let mut push = |addr: &NodeAddress| {
        if !ordered.iter().any(|known| known.same_node(addr)) {
            ordered.push(addr.clone());
        }
    };

    if let Some(candidate) = master {
        push(candidate.master_address());
        candidate.all_addresses().iter().for_each(&mut push);
    }
    supplied.iter().for_each(&mut push);

    ordered
}

pub struct NodeResolver {
    master: MasterResolver,
    status: StatusClient,
    budget: Duration,
    default_port: u16,
}

impl NodeResolver {
    pub fn new(
        master: MasterResolver,
        status: StatusClient,
        budget: Duration,
        default_port: u16,
    ) -> Self {
        Self {
            master,
            status,
            budget,
            default_port,
        }
    }

    pub fn from_config(client: reqwest::Client, config: &RelayConfig) -> Self {
        let budget = Duration::from_millis(config.fdm.timeout_ms + config.haproxy.timeout_ms);
        Self::new(
            MasterResolver::from_config(client.clone(), config),
            StatusClient::new(client, &config.status),
            budget,
            config.default_port,
        )
    }

    pub fn master_resolver(&self) -> &MasterResolver {
        &self.master
    }

    /// Master lookup and the port-map fetch are independent and run
    /// concurrently. Neither failing is fatal: without a master the
    /// supplied nodes are used as given, without a port map bare hosts get
    /// the default port.
    pub async fn resolve(&self, app: &str, supplied: &[String]) -> Result<ResolvedNodes> {
        let parsed = supplied
            .iter()
            .map(|raw| NodeAddress::split_port(raw))
            .collect::<Result<Vec<_>>>()?;

        let (report, ports) = tokio::join!(
            self.master.resolve_report(app, self.budget),
            self.status.fetch_port_map(app, self.default_port)
        );

        let ports = ports.unwrap_or_else(|e| {
            warn!(app = %app, "port map unavailable, using default port: {}", e);
            PortMap::new(self.default_port)
        });

        let master = match report {
            Ok(report) => match report.into_candidate(&ports) {
                Ok(candidate) => Some(candidate),
                Err(e) => {
                    warn!(app = %app, "discarding master report: {}", e);
                    None
                }
            },
            Err(e) => {
                info!(app = %app, "continuing without master preference: {}", e);
                None
            }
        };

        let supplied: Vec<NodeAddress> = parsed
            .into_iter()
            .map(|(host, port)| match port {
                Some(port) => NodeAddress::new(host, port),
                None => resolve(&host, &ports),
            })
            .collect();

        let nodes = preference_order(master.as_ref(), &supplied);
        Ok(ResolvedNodes { nodes, master })
    }
}
