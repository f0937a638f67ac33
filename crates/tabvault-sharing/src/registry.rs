//! Remote token registry
//!
//! Makes shares reachable from devices that do not hold the local store.

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

use crate::error::SharingError;
use crate::package::SharedRecord;
use crate::Result;

#[async_trait]
pub trait TokenRegistry: Send + Sync {
    async fn store(&self, token: &str, record: &SharedRecord) -> Result<()>;

    async fn get(&self, token: &str) -> Result<Option<SharedRecord>>;

    async fn validate(&self, token: &str) -> Result<bool>;

    /// Revoking an unknown token is not an error
    async fn revoke(&self, token: &str) -> Result<()>;
}

/// Registry kept in memory. Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryTokenRegistry {
    records: Arc<RwLock<HashMap<String, SharedRecord>>>,
}

impl MemoryTokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TokenRegistry for MemoryTokenRegistry {
    async fn store(&self, token: &str, record: &SharedRecord) -> Result<()> {
        self.records
            .write()
            .insert(token.to_string(), record.clone());
        Ok(())
    }

    async fn get(&self, token: &str) -> Result<Option<SharedRecord>> {
        Ok(self.records.read().get(token).cloned())
    }

    async fn validate(&self, token: &str) -> Result<bool> {
        Ok(self.records.read().contains_key(token))
    }

    async fn revoke(&self, token: &str) -> Result<()> {
        self.records.write().remove(token);
        Ok(())
    }
}

/// Registry served over HTTP.
///
/// `PUT {base}/tokens/{token}` stores, `GET` fetches (404 means unknown),
/// `GET {base}/tokens/{token}/validate` answers `{"valid": bool}` and `DELETE`
/// revokes.
pub struct HttpTokenRegistry {
    client: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ValidateResponse {
    valid: bool,
}

impl HttpTokenRegistry {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| SharingError::Registry(format!("invalid registry url {base_url}: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;

        tracing::info!(registry = %base_url, "Created token registry client");
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    fn endpoint(&self, token: &str, suffix: &str) -> String {
        format!(
            "{}/tokens/{}{}",
            self.base_url.as_str().trim_end_matches('/'),
            token,
            suffix
        )
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(SharingError::Registry(format!("{status}: {body}")))
    }
}

#[async_trait]
impl TokenRegistry for HttpTokenRegistry {
    async fn store(&self, token: &str, record: &SharedRecord) -> Result<()> {
        let response = self
            .request(reqwest::Method::PUT, self.endpoint(token, ""))
            .json(record)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn get(&self, token: &str) -> Result<Option<SharedRecord>> {
        let response = self
            .request(reqwest::Method::GET, self.endpoint(token, ""))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let record = Self::check(response).await?.json().await?;
        Ok(Some(record))
    }

    async fn validate(&self, token: &str) -> Result<bool> {
        let response = self
            .request(reqwest::Method::GET, self.endpoint(token, "/validate"))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        let body: ValidateResponse = Self::check(response).await?.json().await?;
        Ok(body.valid)
    }

    async fn revoke(&self, token: &str) -> Result<()> {
        let response = self
            .request(reqwest::Method::DELETE, self.endpoint(token, ""))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn record(token: &str) -> SharedRecord {
        let now = Utc::now();
        SharedRecord {
            token: token.to_string(),
            created_at: now,
            expires_at: now + Duration::hours(24),
            one_time: false,
            package: None,
            envelope: None,
        }
    }

    #[tokio::test]
    async fn test_memory_registry() {
        let registry = MemoryTokenRegistry::new();
        registry.store("share_1_a", &record("share_1_a")).await.unwrap();

        assert!(registry.validate("share_1_a").await.unwrap());
        assert!(registry.get("share_1_a").await.unwrap().is_some());

        registry.revoke("share_1_a").await.unwrap();
        registry.revoke("share_1_a").await.unwrap();
        assert!(!registry.validate("share_1_a").await.unwrap());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_http_endpoints() {
        let registry = HttpTokenRegistry::new("https://registry.example/api/", None).unwrap();
        assert_eq!(
            registry.endpoint("share_1_a", "/validate"),
            "https://registry.example/api/tokens/share_1_a/validate"
        );
        assert!(HttpTokenRegistry::new("not a url", None).is_err());
    }
}
