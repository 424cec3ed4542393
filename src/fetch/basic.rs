use super::client::HttpClient;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use std::time::Duration;

/// [`HttpClient`] backed by a single pooled `reqwest::Client`.
pub struct BasicClient(reqwest::Client);

impl BasicClient {
    /// Builds a client that applies `timeout` and `headers` to every request
    /// it sends. Per-request headers and timeouts still take precedence.
    pub fn with_options(timeout: Duration, headers: HeaderMap) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self(client))
    }
}

#[async_trait]
impl HttpClient for BasicClient {
    async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        self.0.execute(req).await
    }
}
