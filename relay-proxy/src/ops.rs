//! One entry point per operation kind.
//!
//! Each operation authorizes the caller, resolves a preference-ordered node
//! list and hands a single-node attempt to the dispatcher. Credential
//! problems and bad node addresses are returned as `Err`; everything that
//! happens on the nodes ends up in the `DispatchResult`.

use crate::cache::CredentialCache;
use crate::dispatcher::{AttemptError, DispatchResult, Dispatcher};
use crate::node_api::NodeApiClient;
use crate::normalize::{to_container_stats, to_directory_listing, to_log_text, ContainerStats, FileInfo};
use crate::policy::RetryPolicy;
use bytes::Bytes;
use chrono::Utc;
use relay_common::config::{CredentialConfig, ExecConfig, RelayConfig, RetryConfig};
use relay_common::credential::Credential;
use relay_common::error::{RelayError, Result};
use relay_common::metrics::MetricsCollector;
use relay_common::types::{AppTarget, NodeAddress};
use relay_events::{ExecConnector, ExecOutcome, ExecRequest, ExecSession};
use relay_resolve::NodeResolver;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

pub struct Operations {
    resolver: NodeResolver,
    dispatcher: Dispatcher,
    api: NodeApiClient,
    retry: RetryConfig,
    exec: ExecConfig,
    credential: CredentialConfig,
    credentials: CredentialCache,
}

impl Operations {
    pub fn new(resolver: NodeResolver, api: NodeApiClient, config: &RelayConfig) -> Self {
        Self {
            resolver,
            dispatcher: Dispatcher::default(),
            api,
            retry: config.retry.clone(),
            exec: config.exec.clone(),
            credential: config.credential.clone(),
            credentials: CredentialCache::new(Duration::from_secs(config.credential.cache_ttl_secs)),
        }
    }

    pub fn from_config(client: reqwest::Client, config: &RelayConfig) -> Self {
        Self::new(
            NodeResolver::from_config(client.clone(), config),
            NodeApiClient::new(client),
            config,
        )
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsCollector>) -> Self {
        self.dispatcher = Dispatcher::new(metrics);
        self
    }

    pub fn resolver(&self) -> &NodeResolver {
        &self.resolver
    }

    /// Turns the caller's raw credential into the header value nodes expect.
    pub fn authorize(&self, raw: Option<&str>) -> Result<String> {
        let raw = match raw.map(str::trim) {
            Some(raw) if !raw.is_empty() => raw,
            _ => return Err(RelayError::Unauthenticated("no credential supplied".into())),
        };

        let credential = match self.credentials.get(raw) {
            Some(credential) => credential,
            None => match Credential::normalize(raw) {
                Ok(credential) => {
                    self.credentials.insert(raw, credential.clone());
                    credential
                }
                Err(_) if self.credential.pass_through_unparsed => {
                    debug!("forwarding unparsed credential");
                    return Ok(raw.to_string());
                }
                Err(e) => return Err(e),
            },
        };

        let max_age = chrono::Duration::minutes(self.credential.max_age_minutes);
        if !credential.is_valid_for(Utc::now(), max_age) {
            return Err(RelayError::Unauthenticated("credential expired".into()));
        }
        Ok(credential.to_wire_header())
    }

    pub async fn logs(
        &self,
        target: &AppTarget,
        nodes: &[String],
        auth: Option<&str>,
        lines: Option<u32>,
    ) -> Result<DispatchResult<String>> {
        let header = self.authorize(auth)?;
        let app = target.wire_name();
        let (api, header, app) = (&self.api, header.as_str(), app.as_str());
        self.run("logs", target, nodes, RetryPolicy::from_config(&self.retry), |node| async move {
            api.logs(&node, header, app, lines).await.map(to_log_text)
        })
        .await
    }

    pub async fn list_folder(
        &self,
        target: &AppTarget,
        nodes: &[String],
        auth: Option<&str>,
        folder: &str,
    ) -> Result<DispatchResult<Vec<FileInfo>>> {
        let header = self.authorize(auth)?;
        let app = target.wire_name();
        let (api, header, app) = (&self.api, header.as_str(), app.as_str());
        self.run("list_folder", target, nodes, RetryPolicy::from_config(&self.retry), |node| async move {
            api.folder(&node, header, app, folder)
                .await
                .map(|entries| to_directory_listing(&entries))
        })
        .await
    }

    pub async fn download(
        &self,
        target: &AppTarget,
        nodes: &[String],
        auth: Option<&str>,
        file: &str,
    ) -> Result<DispatchResult<Bytes>> {
        let header = self.authorize(auth)?;
        let app = target.wire_name();
        let (api, header, app) = (&self.api, header.as_str(), app.as_str());
        self.run("download", target, nodes, RetryPolicy::long_running(&self.retry), |node| async move {
            api.download(&node, header, app, file).await
        })
        .await
    }

    pub async fn upload(
        &self,
        target: &AppTarget,
        nodes: &[String],
        auth: Option<&str>,
        folder: &str,
        file_name: &str,
        data: Bytes,
    ) -> Result<DispatchResult<Value>> {
        let header = self.authorize(auth)?;
        let app = target.wire_name();
        let (api, header, app) = (&self.api, header.as_str(), app.as_str());
        let data = &data;
        self.run("upload", target, nodes, RetryPolicy::long_running(&self.retry), |node| async move {
            api.upload(&node, header, app, folder, file_name, data.clone()).await
        })
        .await
    }

    pub async fn stats(
        &self,
        target: &AppTarget,
        nodes: &[String],
        auth: Option<&str>,
        disk_limit_bytes: u64,
    ) -> Result<DispatchResult<ContainerStats>> {
        let header = self.authorize(auth)?;
        let app = target.wire_name();
        let (api, header, app) = (&self.api, header.as_str(), app.as_str());
        self.run("stats", target, nodes, RetryPolicy::from_config(&self.retry), |node| async move {
            api.stats(&node, header, app)
                .await
                .map(|raw| to_container_stats(&raw, app, disk_limit_bytes))
        })
        .await
    }

    /// One-shot execution over the node's HTTP API.
    pub async fn exec(
        &self,
        target: &AppTarget,
        nodes: &[String],
        auth: Option<&str>,
        command: &str,
    ) -> Result<DispatchResult<String>> {
        let header = self.authorize(auth)?;
        let app = target.wire_name();
        let (api, header, app) = (&self.api, header.as_str(), app.as_str());
        self.run("exec", target, nodes, RetryPolicy::long_running(&self.retry), |node| async move {
            api.exec(&node, header, app, command).await
        })
        .await
    }

    /// Execution over an interactive channel, one session per attempt.
    pub async fn exec_interactive<C: ExecConnector>(
        &self,
        connector: &C,
        target: &AppTarget,
        nodes: &[String],
        auth: Option<&str>,
        command: &str,
    ) -> Result<DispatchResult<String>> {
        let request = ExecRequest {
            app: target.wire_name(),
            auth: self.authorize(auth)?,
            command: command.to_string(),
        };
        let mut policy = RetryPolicy::long_running(&self.retry);
        policy.attempt_timeout = policy.attempt_timeout.max(self.exec.deadline());

        let (exec, request) = (&self.exec, &request);
        self.run("exec_interactive", target, nodes, policy, |node| async move {
            match ExecSession::new(exec).run(connector, &node, request).await {
                ExecOutcome::Done { output } => Ok(output),
                ExecOutcome::Failed { reason } => Err(AttemptError::Transport(reason)),
            }
        })
        .await
    }

    async fn run<T, F, Fut>(
        &self,
        kind: &'static str,
        target: &AppTarget,
        supplied: &[String],
        policy: RetryPolicy,
        attempt: F,
    ) -> Result<DispatchResult<T>>
    where
        F: FnMut(NodeAddress) -> Fut,
        Fut: Future<Output = std::result::Result<T, AttemptError>>,
    {
        let op_id = Uuid::new_v4();
        let span = info_span!("operation", %op_id, kind, app = %target.wire_name());

        async move {
            let resolved = self.resolver.resolve(&target.app, supplied).await?;
            info!(
                nodes = resolved.nodes.len(),
                master = ?resolved.master.as_ref().map(|m| m.master_address().to_string()),
                "dispatching"
            );
            Ok(self.dispatcher.dispatch(&resolved.nodes, &policy, attempt).await)
        }
        .instrument(span)
        .await
    }
}
