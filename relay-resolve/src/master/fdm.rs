use super::{MasterReport, MasterStrategy};
use crate::get_json;
use async_trait::async_trait;
use relay_common::config::expand_template;
use relay_common::error::{RelayError, Result};
use relay_common::types::{ClusterStatusEntry, MasterSource, NodeAddress, StatusReport};
use tracing::debug;

/// Asks the domain manager for the application's cluster state.
pub struct FdmStrategy {
    client: reqwest::Client,
    url_template: String,
}

impl FdmStrategy {
    pub fn new(client: reqwest::Client, url_template: &str) -> Self {
        Self {
            client,
            url_template: url_template.to_string(),
        }
    }
}

#[async_trait]
impl MasterStrategy for FdmStrategy {
    fn source(&self) -> MasterSource {
        MasterSource::Fdm
    }

    async fn locate(&self, app: &str) -> Result<MasterReport> {
        let url = expand_template(&self.url_template, app);
        debug!(app = %app, url = %url, "querying domain manager");
        let report: StatusReport = get_json(&self.client, &url).await?;
        pick_master(&report).ok_or_else(|| {
            RelayError::NoMasterDetected(format!("{} (domain manager reported no master)", app))
        })
    }
}

/// The entry named by `masterIP` wins; otherwise the active entry with the
/// lowest sequence number.
pub fn pick_master(report: &StatusReport) -> Option<MasterReport> {
    let entries = &report.cluster_status;

    let named = report
        .master_ip
        .as_deref()
        .filter(|ip| !ip.is_empty())
        .and_then(|master_ip| find_named(entries, master_ip));

    let winner = named.or_else(|| {
        entries
            .iter()
            .filter(|e| e.active)
            .min_by_key(|e| e.seq_no.unwrap_or(i64::MAX))
    })?;

    let mut members: Vec<String> = entries
        .iter()
        .filter(|e| e.active)
        .map(|e| e.ip.clone())
        .collect();
    if !members.contains(&winner.ip) {
        members.insert(0, winner.ip.clone());
    }

    Some(MasterReport {
        master: winner.ip.clone(),
        members,
        source: MasterSource::Fdm,
        region: report.region.clone(),
    })
}

fn find_named<'a>(
    entries: &'a [ClusterStatusEntry],
    master_ip: &str,
) -> Option<&'a ClusterStatusEntry> {
    entries.iter().find(|e| e.ip == master_ip).or_else(|| {
        let host = NodeAddress::split_port(master_ip).ok()?.0;
        entries.iter().find(|e| e.host() == host)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::master::MasterResolver;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn entry(ip: &str, active: bool, seq_no: Option<i64>) -> ClusterStatusEntry {
        ClusterStatusEntry {
            ip: ip.into(),
            active,
            seq_no,
            static_ip: None,
            os_uptime: None,
            master_ip: None,
        }
    }

    #[test]
    fn test_master_ip_field_wins() {
        let report = StatusReport {
            status: "success".into(),
            master_ip: Some("10.0.0.2:16127".into()),
            cluster_status: vec![
                entry("10.0.0.1:16127", true, Some(1)),
                entry("10.0.0.2:16127", true, Some(2)),
            ],
            region: None,
        };
        let picked = pick_master(&report).unwrap();
        assert_eq!(picked.master, "10.0.0.2:16127");
        assert_eq!(picked.members, vec!["10.0.0.1:16127", "10.0.0.2:16127"]);
    }

    #[test]
    fn test_master_ip_matches_by_host() {
        let report = StatusReport {
            master_ip: Some("10.0.0.2".into()),
            cluster_status: vec![
                entry("10.0.0.1:16127", true, Some(1)),
                entry("10.0.0.2:16137", true, Some(2)),
            ],
            ..Default::default()
        };
        assert_eq!(pick_master(&report).unwrap().master, "10.0.0.2:16137");
    }

    #[test]
    fn test_lowest_active_seq_no_without_master_ip() {
        let report = StatusReport {
            cluster_status: vec![
                entry("10.0.0.1:16127", false, Some(0)),
                entry("10.0.0.2:16127", true, Some(7)),
                entry("10.0.0.3:16127", true, Some(3)),
                entry("10.0.0.4:16127", true, None),
            ],
            ..Default::default()
        };
        let picked = pick_master(&report).unwrap();
        assert_eq!(picked.master, "10.0.0.3:16127");
        assert_eq!(picked.members.len(), 3);
    }

    #[test]
    fn test_no_active_entries() {
        let report = StatusReport {
            cluster_status: vec![entry("10.0.0.1:16127", false, Some(1))],
            ..Default::default()
        };
        assert!(pick_master(&report).is_none());
    }

    #[tokio::test]
    async fn test_two_replica_scenario() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/appips/web"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "success",
                "clusterStatus": [
                    {"ip": "10.0.0.1:16127", "active": true, "seqNo": 1},
                    {"ip": "10.0.0.2:16127", "active": true, "seqNo": 2}
                ]
            })))
            .mount(&server)
            .await;

        let strategy = FdmStrategy::new(
            reqwest::Client::new(),
            &format!("{}/appips/{{app}}", server.uri()),
        );
        let resolver =
            MasterResolver::new().with_strategy(Box::new(strategy), Duration::from_secs(8));

        let candidate = resolver
            .resolve_master("web", Duration::from_secs(8))
            .await
            .unwrap();
        assert_eq!(candidate.master_address(), &NodeAddress::new("10.0.0.1", 16127));
        assert_eq!(
            candidate.all_addresses(),
            &[
                NodeAddress::new("10.0.0.1", 16127),
                NodeAddress::new("10.0.0.2", 16127)
            ]
        );
        assert_eq!(candidate.source(), MasterSource::Fdm);
    }
}
