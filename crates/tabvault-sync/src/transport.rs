//! Sync transports

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use crate::error::SyncError;
use crate::resolver::SyncSet;
use crate::Result;

#[async_trait]
pub trait SyncTransport: Send + Sync {
    async fn pull(&self) -> Result<SyncSet>;

    async fn push(&self, records: &SyncSet) -> Result<()>;

    /// Obtain fresh credentials after an `Unauthorized` response
    async fn refresh_credentials(&self) -> Result<()>;
}

/// Sync over HTTP.
///
/// `GET {endpoint}/records` pulls, `PUT {endpoint}/records` pushes and
/// `POST {endpoint}/refresh` trades the current token for a new one
/// (`{"token": "..."}`).
pub struct HttpSyncTransport {
    client: reqwest::Client,
    endpoint: Url,
    token: RwLock<Option<String>>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    token: String,
}

impl HttpSyncTransport {
    pub fn new(endpoint: &str, token: Option<String>) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| SyncError::InvalidEndpoint(format!("{endpoint}: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            token: RwLock::new(token),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint.as_str().trim_end_matches('/'), path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match self.token.read().as_deref() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(SyncError::Unauthorized);
        }

        let retry_after = retry_after(response.headers());
        let message = response
            .text()
            .await
            .ok()
            .filter(|body| !body.trim().is_empty())
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());

        Err(SyncError::Status {
            status: status.as_u16(),
            message,
            retry_after,
        })
    }
}

/// `Retry-After` in its delay-seconds form
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[async_trait]
impl SyncTransport for HttpSyncTransport {
    async fn pull(&self) -> Result<SyncSet> {
        let response = self.request(reqwest::Method::GET, "records").send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn push(&self, records: &SyncSet) -> Result<()> {
        let response = self
            .request(reqwest::Method::PUT, "records")
            .json(records)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn refresh_credentials(&self) -> Result<()> {
        let response = self.request(reqwest::Method::POST, "refresh").send().await?;
        let body: RefreshResponse = Self::check(response).await?.json().await?;
        *self.token.write() = Some(body.token);

        tracing::info!(endpoint = %self.endpoint, "Refreshed sync credentials");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(7)));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(retry_after(&headers), None);
    }

    #[test]
    fn test_endpoint_urls() {
        let transport = HttpSyncTransport::new("https://sync.example/v1/", None).unwrap();
        assert_eq!(transport.url("records"), "https://sync.example/v1/records");
        assert!(HttpSyncTransport::new("::", None).is_err());
    }
}
