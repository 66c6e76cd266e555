//! Node resolution: which replica is master, which port each node answers
//! on, and which node is serving a domain right now.

pub mod master;
pub mod nodes;
pub mod ports;
pub mod serving;
pub mod status;

pub use master::{MasterReport, MasterResolver, MasterStrategy};
pub use nodes::{preference_order, NodeResolver, ResolvedNodes};
pub use ports::{build_port_map, resolve, PortMap};

use relay_common::error::{RelayError, Result};
use serde::de::DeserializeOwned;

pub(crate) async fn get_text(client: &reqwest::Client, url: &str) -> Result<String> {
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| RelayError::Http(format!("GET {} failed: {}", url, e)))?;
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    if !status.is_success() {
        return Err(RelayError::Http(format!("GET {} returned {}: {}", url, status, body)));
    }
    Ok(body)
}

pub(crate) async fn get_json<T: DeserializeOwned>(client: &reqwest::Client, url: &str) -> Result<T> {
    let body = get_text(client, url).await?;
    Ok(serde_json::from_str(&body)?)
}
