//! Typed client for the registry HTTP surface.

use std::collections::HashMap;
use std::time::Duration;

use aegis_domain::{Error, Result, ServiceRecord};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Thin reqwest wrapper over the registry's Consul-compatible endpoints.
#[derive(Clone)]
pub struct RegistryClient {
    http: reqwest::Client,
    base_url: String,
}

impl RegistryClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Transport(format!("http client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub async fn register(&self, record: &ServiceRecord) -> Result<()> {
        let url = format!("{}/v1/agent/service/register", self.base_url);
        let response = self
            .http
            .put(&url)
            .json(record)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("register: {e}")))?;
        Self::check(response).await
    }

    pub async fn deregister(&self, id: &str) -> Result<()> {
        let url = format!("{}/v1/agent/service/deregister/{id}", self.base_url);
        let response = self
            .http
            .put(&url)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("deregister: {e}")))?;
        Self::check(response).await
    }

    pub async fn services(&self) -> Result<HashMap<String, ServiceRecord>> {
        let url = format!("{}/v1/catalog/services", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("catalog: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::Transport(format!("catalog HTTP {}", response.status())));
        }
        response
            .json()
            .await
            .map_err(|e| Error::Transport(format!("catalog decode: {e}")))
    }

    async fn check(response: reqwest::Response) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        match status.as_u16() {
            404 => Err(Error::NotFound(body)),
            400 => Err(Error::Validation(body)),
            500..=599 => Err(Error::Storage(format!("registry HTTP {status}: {body}"))),
            _ => Err(Error::Transport(format!("registry HTTP {status}: {body}"))),
        }
    }
}
