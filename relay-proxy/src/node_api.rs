//! Wire calls against one node's management API.
//!
//! Each method is a single attempt: it talks to exactly one node and
//! classifies the outcome. Retrying and failover belong to the dispatcher.

use crate::dispatcher::AttemptError;
use crate::normalize::{DockerRawStats, LogPayload, RawFileEntry};
use crate::response::{read_bytes, read_json, read_text, transport_error};
use bytes::Bytes;
use relay_common::credential::AUTH_HEADER;
use relay_common::types::NodeAddress;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Url};
use serde_json::{json, Value};

#[derive(Clone)]
pub struct NodeApiClient {
    client: Client,
}

impl NodeApiClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn logs(
        &self,
        node: &NodeAddress,
        auth: &str,
        app: &str,
        lines: Option<u32>,
    ) -> Result<LogPayload, AttemptError> {
        let lines = lines.map(|n| n.to_string());
        let mut segments = vec!["apps", "applog", app];
        if let Some(lines) = lines.as_deref() {
            segments.push(lines);
        }
        let url = endpoint(node, &segments)?;
        let resp = self
            .client
            .get(url)
            .header(AUTH_HEADER, auth)
            .send()
            .await
            .map_err(transport_error)?;
        decode(read_json(resp).await?)
    }

    pub async fn folder(
        &self,
        node: &NodeAddress,
        auth: &str,
        app: &str,
        folder: &str,
    ) -> Result<Vec<RawFileEntry>, AttemptError> {
        let url = endpoint(node, &["apps", "getfolderinfo", app, folder])?;
        let resp = self
            .client
            .get(url)
            .header(AUTH_HEADER, auth)
            .send()
            .await
            .map_err(transport_error)?;
        decode(read_json(resp).await?)
    }

    pub async fn download(
        &self,
        node: &NodeAddress,
        auth: &str,
        app: &str,
        file: &str,
    ) -> Result<Bytes, AttemptError> {
        let url = endpoint(node, &["apps", "downloadfile", app, file])?;
        let resp = self
            .client
            .get(url)
            .header(AUTH_HEADER, auth)
            .send()
            .await
            .map_err(transport_error)?;
        read_bytes(resp).await
    }

    pub async fn upload(
        &self,
        node: &NodeAddress,
        auth: &str,
        app: &str,
        folder: &str,
        file_name: &str,
        data: Bytes,
    ) -> Result<Value, AttemptError> {
        let url = endpoint(node, &["ioutils", "fileupload", "volume", app, folder])?;
        let part = Part::bytes(data.to_vec()).file_name(file_name.to_string());
        let form = Form::new().part("file", part);
        let resp = self
            .client
            .post(url)
            .header(AUTH_HEADER, auth)
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;
        read_json(resp).await
    }

    pub async fn stats(
        &self,
        node: &NodeAddress,
        auth: &str,
        app: &str,
    ) -> Result<DockerRawStats, AttemptError> {
        let url = endpoint(node, &["apps", "appstats", app])?;
        let resp = self
            .client
            .get(url)
            .header(AUTH_HEADER, auth)
            .send()
            .await
            .map_err(transport_error)?;
        decode(read_json(resp).await?)
    }

    /// One-shot execution; the node runs the command to completion before
    /// answering.
    pub async fn exec(
        &self,
        node: &NodeAddress,
        auth: &str,
        app: &str,
        command: &str,
    ) -> Result<String, AttemptError> {
        let url = endpoint(node, &["apps", "appexec"])?;
        let body = json!({
            "appname": app,
            "cmd": ["sh", "-c", command],
            "env": [],
        });
        let resp = self
            .client
            .post(url)
            .header(AUTH_HEADER, auth)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        read_text(resp).await
    }
}

fn endpoint(node: &NodeAddress, segments: &[&str]) -> Result<Url, AttemptError> {
    let mut url = Url::parse(&node.base_url())
        .map_err(|e| AttemptError::Transport(format!("invalid node url: {}", e)))?;
    url.path_segments_mut()
        .map_err(|_| AttemptError::Transport("node url cannot carry a path".into()))?
        .extend(segments);
    Ok(url)
}

fn decode<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, AttemptError> {
    serde_json::from_value(value).map_err(|e| AttemptError::Malformed(e.to_string()))
}
