//! Outbound HTTP client to storage nodes: `chunk/read`, `chunk/write`,
//! `chunk/delete`, `chunk/exists`.
//!
//! Built on `reqwest::Client`, which already pools HTTP/1.1 connections, so
//! there's no separate connection-pooling layer to manage here.

use std::time::Duration;

use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum NodeClientError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("node {url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("malformed chunk payload from {url}: {reason}")]
    MalformedPayload { url: String, reason: String },
}

#[derive(Debug, Clone)]
pub struct NodeClientConfig {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for NodeClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(12),
        }
    }
}

#[derive(Serialize)]
struct WriteRequest<'a> {
    #[serde(rename = "fileId")]
    file_id: &'a str,
    #[serde(rename = "chunkIndex")]
    chunk_index: u32,
    data: String,
}

#[derive(Deserialize)]
struct ReadResponse {
    data: String,
    #[allow(dead_code)]
    size: u64,
}

#[derive(Deserialize)]
struct ExistsResponse {
    exists: bool,
}

pub struct NodeClient {
    http: reqwest::Client,
}

impl NodeClient {
    pub fn new(config: NodeClientConfig) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout)
            .build()
            .expect("reqwest client builds with static config");
        Self { http }
    }

    /// `GET /chunk/read?fileId=&chunkIndex=`
    pub async fn read_chunk(
        &self,
        node_url: &str,
        file_id: &str,
        chunk_index: u32,
    ) -> Result<Vec<u8>, NodeClientError> {
        let url = format!("{}/chunk/read", node_url.trim_end_matches('/'));
        let resp = self
            .http
            .get(&url)
            .query(&[("fileId", file_id), ("chunkIndex", &chunk_index.to_string())])
            .send()
            .await
            .map_err(|source| NodeClientError::Request {
                url: url.clone(),
                source,
            })?;

        if !resp.status().is_success() {
            return Err(NodeClientError::Status {
                url,
                status: resp.status().as_u16(),
            });
        }

        let body: ReadResponse = resp.json().await.map_err(|source| NodeClientError::Request {
            url: url.clone(),
            source,
        })?;

        base64::engine::general_purpose::STANDARD
            .decode(&body.data)
            .map_err(|e| NodeClientError::MalformedPayload {
                url,
                reason: e.to_string(),
            })
    }

    /// `POST /chunk/write` with base64-encoded data.
    pub async fn write_chunk(
        &self,
        node_url: &str,
        file_id: &str,
        chunk_index: u32,
        data: &[u8],
    ) -> Result<(), NodeClientError> {
        let url = format!("{}/chunk/write", node_url.trim_end_matches('/'));
        let encoded = base64::engine::general_purpose::STANDARD.encode(data);
        let resp = self
            .http
            .post(&url)
            .json(&WriteRequest {
                file_id,
                chunk_index,
                data: encoded,
            })
            .send()
            .await
            .map_err(|source| NodeClientError::Request {
                url: url.clone(),
                source,
            })?;

        if !resp.status().is_success() {
            return Err(NodeClientError::Status {
                url,
                status: resp.status().as_u16(),
            });
        }
        Ok(())
    }

    /// `DELETE /chunk/delete?fileId=&chunkIndex=`
    pub async fn delete_chunk(
        &self,
        node_url: &str,
        file_id: &str,
        chunk_index: u32,
    ) -> Result<(), NodeClientError> {
        let url = format!("{}/chunk/delete", node_url.trim_end_matches('/'));
        let resp = self
            .http
            .delete(&url)
            .query(&[("fileId", file_id), ("chunkIndex", &chunk_index.to_string())])
            .send()
            .await
            .map_err(|source| NodeClientError::Request {
                url: url.clone(),
                source,
            })?;

        if !resp.status().is_success() {
            warn!(url, status = %resp.status(), "chunk delete returned non-success status");
        }
        Ok(())
    }

    /// `GET /chunk/exists?fileId=&chunkIndex=` — used by the Integrity
    /// Reconciler to verify a candidate source actually has the chunk
    /// before copying from it.
    pub async fn chunk_exists(
        &self,
        node_url: &str,
        file_id: &str,
        chunk_index: u32,
    ) -> Result<bool, NodeClientError> {
        let url = format!("{}/chunk/exists", node_url.trim_end_matches('/'));
        let resp = self
            .http
            .get(&url)
            .query(&[("fileId", file_id), ("chunkIndex", &chunk_index.to_string())])
            .send()
            .await
            .map_err(|source| NodeClientError::Request {
                url: url.clone(),
                source,
            })?;

        if !resp.status().is_success() {
            return Err(NodeClientError::Status {
                url,
                status: resp.status().as_u16(),
            });
        }

        let body: ExistsResponse = resp.json().await.map_err(|source| NodeClientError::Request {
            url,
            source,
        })?;
        Ok(body.exists)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec() {
        let cfg = NodeClientConfig::default();
        assert_eq!(cfg.connect_timeout, Duration::from_secs(5));
    }
}
