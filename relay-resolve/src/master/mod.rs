//! Master detection. Strategies are tried strictly in order, each under
//! its own timeout; the first report wins.

pub mod fdm;
pub mod haproxy;

pub use fdm::FdmStrategy;
pub use haproxy::HaproxyStrategy;

use crate::ports::{resolve_raw, PortMap};
use async_trait::async_trait;
use relay_common::config::RelayConfig;
use relay_common::error::{RelayError, Result};
use relay_common::types::{MasterCandidate, MasterSource, NodeAddress};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// What a strategy observed, with addresses exactly as reported.
#[derive(Debug, Clone, PartialEq)]
pub struct MasterReport {
    pub master: String,
    pub members: Vec<String>,
    pub source: MasterSource,
    pub region: Option<String>,
}

impl MasterReport {
    /// Bare hosts take their port from `ports`.
    pub fn into_candidate(self, ports: &PortMap) -> Result<MasterCandidate> {
        let master = resolve_raw(&self.master, ports)?;
        let mut all: Vec<NodeAddress> = Vec::with_capacity(self.members.len());
        for member in &self.members {
            let addr = resolve_raw(member, ports)?;
            if !all.contains(&addr) {
                all.push(addr);
            }
        }
        if !all.iter().any(|a| a.same_node(&master)) {
            all.insert(0, master.clone());
        }
        Ok(MasterCandidate::new(master, all, self.source, self.region))
    }
}

#[async_trait]
pub trait MasterStrategy: Send + Sync {
    fn source(&self) -> MasterSource;

    async fn locate(&self, app: &str) -> Result<MasterReport>;
}

pub struct MasterResolver {
    strategies: Vec<(Box<dyn MasterStrategy>, Duration)>,
}

impl Default for MasterResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl MasterResolver {
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    pub fn with_strategy(mut self, strategy: Box<dyn MasterStrategy>, timeout: Duration) -> Self {
        self.strategies.push((strategy, timeout));
        self
    }

    /// Domain manager first, load-balancer statistics second.
    pub fn from_config(client: reqwest::Client, config: &RelayConfig) -> Self {
        Self::new()
            .with_strategy(
                Box::new(FdmStrategy::new(client.clone(), &config.fdm.url_template)),
                Duration::from_millis(config.fdm.timeout_ms),
            )
            .with_strategy(
                Box::new(HaproxyStrategy::new(client, &config.haproxy.url_template)),
                Duration::from_millis(config.haproxy.timeout_ms),
            )
    }

    pub async fn resolve_report(&self, app: &str, budget: Duration) -> Result<MasterReport> {
        let started = Instant::now();

        for (strategy, timeout) in &self.strategies {
            let remaining = budget.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                warn!(app = %app, "master resolution budget spent");
                break;
            }

            let source = strategy.source();
            match tokio::time::timeout((*timeout).min(remaining), strategy.locate(app)).await {
                Ok(Ok(report)) => {
                    info!(app = %app, source = %source, master = %report.master, "master located");
                    return Ok(report);
                }
                Ok(Err(e)) => warn!(app = %app, source = %source, "master strategy failed: {}", e),
                Err(_) => warn!(app = %app, source = %source, "master strategy timed out"),
            }
        }

        Err(RelayError::NoMasterDetected(app.to_string()))
    }

    /// Addresses without an explicit port get the default port.
    pub async fn resolve_master(&self, app: &str, budget: Duration) -> Result<MasterCandidate> {
        self.resolve_report(app, budget)
            .await?
            .into_candidate(&PortMap::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Fixed {
        source: MasterSource,
        answer: Option<&'static str>,
        delay: Duration,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl MasterStrategy for Fixed {
        fn source(&self) -> MasterSource {
            self.source
        }

        async fn locate(&self, app: &str) -> Result<MasterReport> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            match self.answer {
                Some(master) => Ok(MasterReport {
                    master: master.to_string(),
                    members: vec![master.to_string()],
                    source: self.source,
                    region: None,
                }),
                None => Err(RelayError::Http(format!("nothing for {}", app))),
            }
        }
    }

    fn fixed(
        source: MasterSource,
        answer: Option<&'static str>,
        delay: Duration,
    ) -> (Box<dyn MasterStrategy>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let strategy = Fixed {
            source,
            answer,
            delay,
            calls: calls.clone(),
        };
        (Box::new(strategy), calls)
    }

    #[tokio::test]
    async fn test_fdm_precedence_skips_haproxy() {
        let (fdm, fdm_calls) = fixed(MasterSource::Fdm, Some("10.0.0.1"), Duration::ZERO);
        let (lb, lb_calls) = fixed(MasterSource::Haproxy, Some("10.0.0.9"), Duration::ZERO);
        let resolver = MasterResolver::new()
            .with_strategy(fdm, Duration::from_secs(8))
            .with_strategy(lb, Duration::from_secs(8));

        let candidate = resolver
            .resolve_master("web", Duration::from_secs(16))
            .await
            .unwrap();
        assert_eq!(candidate.master_address(), &NodeAddress::new("10.0.0.1", 16127));
        assert_eq!(candidate.source(), MasterSource::Fdm);
        assert_eq!(fdm_calls.load(Ordering::SeqCst), 1);
        assert_eq!(lb_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_strategy_is_cut_off_and_next_one_runs() {
        let (fdm, _) = fixed(MasterSource::Fdm, Some("10.0.0.1"), Duration::from_secs(30));
        let (lb, lb_calls) = fixed(MasterSource::Haproxy, Some("10.0.0.9:16137"), Duration::ZERO);
        let resolver = MasterResolver::new()
            .with_strategy(fdm, Duration::from_secs(8))
            .with_strategy(lb, Duration::from_secs(8));

        let candidate = resolver
            .resolve_master("web", Duration::from_secs(20))
            .await
            .unwrap();
        assert_eq!(candidate.source(), MasterSource::Haproxy);
        assert_eq!(candidate.master_address(), &NodeAddress::new("10.0.0.9", 16137));
        assert_eq!(candidate.all_addresses(), &[NodeAddress::new("10.0.0.9", 16137)]);
        assert_eq!(lb_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_both_strategies_failing_is_no_master() {
        let (fdm, _) = fixed(MasterSource::Fdm, None, Duration::ZERO);
        let (lb, _) = fixed(MasterSource::Haproxy, None, Duration::ZERO);
        let resolver = MasterResolver::new()
            .with_strategy(fdm, Duration::from_secs(8))
            .with_strategy(lb, Duration::from_secs(8));

        let err = resolver
            .resolve_master("web", Duration::from_secs(16))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::NoMasterDetected(app) if app == "web"));
    }

    #[test]
    fn test_report_into_candidate_applies_port_map() {
        let ports = PortMap::from_entries(
            &[relay_common::types::ClusterStatusEntry {
                ip: "10.0.0.2:16137".into(),
                active: true,
                seq_no: None,
                static_ip: None,
                os_uptime: None,
                master_ip: None,
            }],
            16127,
        );
        let report = MasterReport {
            master: "10.0.0.2".into(),
            members: vec!["10.0.0.1".into(), "10.0.0.2".into()],
            source: MasterSource::Fdm,
            region: Some("eu".into()),
        };
        let candidate = report.into_candidate(&ports).unwrap();
        assert_eq!(candidate.master_address(), &NodeAddress::new("10.0.0.2", 16137));
        assert_eq!(
            candidate.all_addresses(),
            &[
                NodeAddress::new("10.0.0.1", 16127),
                NodeAddress::new("10.0.0.2", 16137)
            ]
        );
        assert_eq!(candidate.region(), Some("eu"));
    }
}
