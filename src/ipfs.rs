//! Content store backed by an IPFS node's RPC API (`/api/v0/ls`, `/api/v0/cat`).

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt};
use serde::Deserialize;
use tracing::debug;

use crate::{
    error::StoreError,
    store::{ByteStream, ContentStore, DirEntry},
};

/// UnixFS link type of a directory in `ls` output.
const LINK_TYPE_DIRECTORY: u8 = 1;

/// HTTP client for an IPFS RPC endpoint such as `http://127.0.0.1:5001`.
#[derive(Clone)]
pub struct IpfsHttpStore {
    api: String,
    client: reqwest::Client,
    list_timeout: Duration,
}

#[derive(Deserialize)]
struct LsResponse {
    #[serde(rename = "Objects", default)]
    objects: Vec<LsObject>,
}

#[derive(Deserialize)]
struct LsObject {
    #[serde(rename = "Links", default)]
    links: Vec<LsLink>,
}

#[derive(Deserialize)]
struct LsLink {
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "Type", default)]
    kind: u8,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(rename = "Message", default)]
    message: String,
}

impl IpfsHttpStore {
    pub fn new(api: &str, timeout: Duration) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self {
            api: api.trim_end_matches('/').to_string(),
            client,
            list_timeout: timeout,
        })
    }

    fn endpoint(&self, command: &str) -> String {
        format!("{}/api/v0/{command}", self.api)
    }

    async fn call(
        &self,
        command: &str,
        path: &str,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response, StoreError> {
        let arg = format!("/ipfs/{}", path.trim_start_matches('/'));
        debug!(command, %arg, "ipfs request");
        let mut req = self.client.post(self.endpoint(command)).query(&[("arg", &arg)]);
        if let Some(t) = timeout {
            req = req.timeout(t);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Err(classify_failure(path, status, &body))
    }
}

/// Map an RPC error body onto the store error kinds.
fn classify_failure(path: &str, status: reqwest::StatusCode, body: &str) -> StoreError {
    let message = serde_json::from_str::<ApiError>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| body.trim().to_string());
    let lowered = message.to_lowercase();
    if lowered.contains("no link named")
        || lowered.contains("not found")
        || lowered.contains("invalid path")
    {
        StoreError::NotFound(path.to_string())
    } else {
        StoreError::Unavailable(format!("{status}: {message}"))
    }
}

#[async_trait]
impl ContentStore for IpfsHttpStore {
    async fn list(&self, path: &str) -> Result<Vec<DirEntry>, StoreError> {
        let resp = self.call("ls", path, Some(self.list_timeout)).await?;
        let body: LsResponse = resp
            .json()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(body
            .objects
            .into_iter()
            .flat_map(|o| o.links)
            .map(|l| DirEntry {
                name: l.name,
                is_directory: l.kind == LINK_TYPE_DIRECTORY,
            })
            .collect())
    }

    async fn stream(&self, path: &str) -> Result<ByteStream, StoreError> {
        // No overall timeout: the loader's size cap bounds the transfer.
        let resp = self.call("cat", path, None).await?;
        Ok(resp
            .bytes_stream()
            .map_err(|e| StoreError::Unavailable(e.to_string()))
            .boxed())
    }
}
