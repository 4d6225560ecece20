use std::io;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::Method;
use reqwest::Client;
use tokio_util::sync::CancellationToken;

use prioxy_common::{ProxyError, Result};
use prioxy_scheduler::{Forwarder, ProxyResponse};

/// Per-request deadline; generation requests can run for minutes.
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(300);

/// HTTP client for the OpenAI-compatible upstream API.
pub struct OpenAIClient {
    base_url: String,
    api_key: String,
    client: Client,
}

impl OpenAIClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            client: Client::new(),
        }
    }

    fn url_for(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }
}

#[async_trait]
impl Forwarder for OpenAIClient {
    async fn forward(
        &self,
        cancel: &CancellationToken,
        method: Method,
        path: &str,
        body: Bytes,
    ) -> Result<ProxyResponse> {
        let send = self
            .client
            .request(method, self.url_for(path))
            .timeout(UPSTREAM_TIMEOUT)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send();

        // Racing against the token drops the in-flight request on cancel,
        // which closes the upstream connection.
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ProxyError::Cancelled),
            result = send => result.map_err(|err| ProxyError::Upstream(err.to_string()))?,
        };

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes_stream().map_err(io::Error::other).boxed();
        Ok(ProxyResponse {
            status,
            headers,
            body,
        })
    }
}
