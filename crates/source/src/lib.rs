//! HTTP implementation of the item endpoints:
//! `GET /items/list`, `GET /items/files/{id}`, `GET /items/attribution/{id}`.

#![forbid(unsafe_code)]

use std::time::{Duration, Instant};

use bytes::Bytes;
use metrics::histogram;
use tracing::debug;
use vitrine_core::{ItemId, ItemSource, VitrineError, VitrineResult};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct HttpSource {
    base_url: String,
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { base_url: base_url.into().trim_end_matches('/').to_string(), client }
    }

    pub fn base_url(&self) -> &str { &self.base_url }

    fn url(&self, path: &str) -> String { format!("{}/items/{}", self.base_url, path) }

    async fn get(&self, url: String) -> Result<reqwest::Response, String> {
        self.client.get(url).send().await.map_err(|e| e.to_string())
    }
}

#[async_trait::async_trait]
impl ItemSource for HttpSource {
    async fn list(&self) -> VitrineResult<Vec<ItemId>> {
        let resp = self.get(self.url("list")).await.map_err(VitrineError::List)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(VitrineError::List(format!("status {}", status.as_u16())));
        }
        let body = resp.bytes().await.map_err(|e| VitrineError::List(e.to_string()))?;
        let ids: Vec<ItemId> =
            serde_json::from_slice(&body).map_err(|e| VitrineError::List(format!("invalid listing: {e}")))?;
        debug!(count = ids.len(), "listing fetched");
        Ok(ids)
    }

    async fn fetch(&self, id: &ItemId) -> VitrineResult<Bytes> {
        let started = Instant::now();
        let fetch_err = |message: String| VitrineError::Fetch { id: id.clone(), message };
        let resp = self.get(self.url(&format!("files/{id}"))).await.map_err(fetch_err)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(VitrineError::Status { id: id.clone(), status: status.as_u16() });
        }
        let body = resp.bytes().await.map_err(|e| fetch_err(e.to_string()))?;
        histogram!("http_fetch_ms", started.elapsed().as_secs_f64() * 1000.0);
        Ok(body)
    }

    async fn attribution(&self, id: &ItemId) -> VitrineResult<String> {
        let attr_err = |message: String| VitrineError::Attribution { id: id.clone(), message };
        let resp = self.get(self.url(&format!("attribution/{id}"))).await.map_err(attr_err)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(attr_err(format!("status {}", status.as_u16())));
        }
        resp.text().await.map_err(|e| attr_err(e.to_string()))
    }
}
