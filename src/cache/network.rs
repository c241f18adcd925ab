// Network access for cache misses and pass-through requests

use crate::cache::models::{AssetRequest, AssetResponse};
use crate::config::UpstreamConfig;
use crate::error::{Result, ShimError};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Headers that describe a single connection and are never forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "te",
    "trailer",
    "upgrade",
    "host",
    "content-length",
];

fn is_forwardable(name: &str) -> bool {
    !HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h))
}

/// Source of responses the cache does not have.
///
/// `Err` means no response arrived at all (connection refused, timeout);
/// an error status from the origin is still `Ok`.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &AssetRequest) -> Result<AssetResponse>;
}

/// Forwards requests to the configured origin.
pub struct UpstreamClient {
    http_client: Client,
    base_url: String,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .use_rustls_tls()
            .build()
            .map_err(|e| ShimError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Network for UpstreamClient {
    async fn fetch(&self, request: &AssetRequest) -> Result<AssetResponse> {
        let url = format!("{}{}", self.base_url, request.path);
        debug!("Forwarding {} {}", request.method, url);

        let mut builder = self.http_client.request(request.method.clone(), &url);
        for (name, value) in request.headers.iter() {
            if is_forwardable(name.as_str()) {
                builder = builder.header(name, value);
            }
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter(|(name, _)| is_forwardable(name.as_str()))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?;

        Ok(AssetResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hop_by_hop_filtering() {
        assert!(!is_forwardable("Connection"));
        assert!(!is_forwardable("transfer-encoding"));
        assert!(is_forwardable("content-type"));
        assert!(is_forwardable("cache-control"));
    }

    #[tokio::test]
    async fn test_fetch_from_origin() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/index.html?v=1")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<html></html>")
            .create_async()
            .await;

        let client = UpstreamClient::new(&UpstreamConfig {
            base_url: format!("{}/", server.url()),
            timeout_seconds: 5,
        })
        .unwrap();

        let response = client.fetch(&AssetRequest::get("/index.html?v=1")).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.header("Content-Type"), Some("text/html"));
        assert_eq!(response.body, "<html></html>");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_is_still_a_response() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/missing").with_status(404).create_async().await;

        let client = UpstreamClient::new(&UpstreamConfig {
            base_url: server.url(),
            timeout_seconds: 5,
        })
        .unwrap();

        let response = client.fetch(&AssetRequest::get("/missing")).await.unwrap();
        assert_eq!(response.status, 404);
    }

    #[tokio::test]
    async fn test_connection_failure_is_an_error() {
        // Port 9 (discard) is not listening on loopback in test environments.
        let client = UpstreamClient::new(&UpstreamConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_seconds: 2,
        })
        .unwrap();

        assert!(client.fetch(&AssetRequest::get("/")).await.is_err());
    }
}
