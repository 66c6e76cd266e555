use crate::get_json;
use crate::ports::PortMap;
use relay_common::config::{expand_template, StatusConfig};
use relay_common::error::{RelayError, Result};
use relay_common::types::StatusReport;
use std::time::Duration;
use tracing::debug;

/// Reads an application's own `/status` endpoint over its public domain.
#[derive(Clone)]
pub struct StatusClient {
    client: reqwest::Client,
    url_template: String,
    timeout: Duration,
}

impl StatusClient {
    pub fn new(client: reqwest::Client, config: &StatusConfig) -> Self {
        Self {
            client,
            url_template: config.url_template.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    pub async fn fetch(&self, app: &str) -> Result<StatusReport> {
        let url = expand_template(&self.url_template, app);
        debug!(app = %app, url = %url, "fetching application status");
        tokio::time::timeout(self.timeout, get_json::<StatusReport>(&self.client, &url))
            .await
            .map_err(|_| RelayError::Http(format!("status request to {} timed out", url)))?
    }

    pub async fn fetch_port_map(&self, app: &str, default_port: u16) -> Result<PortMap> {
        let report = self.fetch(app).await?;
        Ok(PortMap::from_entries(&report.cluster_status, default_port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> StatusClient {
        StatusClient::new(
            reqwest::Client::new(),
            &StatusConfig {
                url_template: format!("{}/{{app}}/status", server.uri()),
                timeout_ms: 2_000,
            },
        )
    }

    #[tokio::test]
    async fn test_fetch_port_map() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/web/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "success",
                "clusterStatus": [
                    {"ip": "10.0.0.1:16137", "active": true},
                    {"ip": "10.0.0.2", "active": true}
                ]
            })))
            .mount(&server)
            .await;

        let map = client_for(&server).fetch_port_map("web", 16127).await.unwrap();
        assert_eq!(map.port_for("10.0.0.1"), 16137);
        assert_eq!(map.port_for("10.0.0.2"), 16127);
    }

    #[tokio::test]
    async fn test_fetch_surfaces_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let err = client_for(&server).fetch("web").await.unwrap_err();
        assert!(matches!(err, RelayError::Http(_)));
    }
}
