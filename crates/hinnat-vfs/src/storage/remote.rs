//! Remote HTTP API adapters.
//!
//! The pricelist is fetched from `GET {base}/api/futur/pricelist` and orders
//! are forwarded to `POST {base}/api/futur/order`. Both authenticate with
//! the session credential in the `X-ApiKey` header.

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Local};
use reqwest::header::{CONTENT_LENGTH, HeaderValue, LAST_MODIFIED};
use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;

use crate::constants::{PRICELIST_FILE, USER_AGENT};
use crate::identity::Identity;
use crate::vfs::Entry;

use super::{IncomingStore, PricelistStore, StorageError, StorageResult};

const API_KEY_HEADER: &str = "X-ApiKey";
const PRICELIST_ENDPOINT: &str = "/api/futur/pricelist";
const ORDER_ENDPOINT: &str = "/api/futur/order";

/// Shared HTTP client for one API base URL.
#[derive(Debug, Clone)]
pub struct RemoteApi {
    client: Client,
    base_url: String,
}

impl RemoteApi {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> StorageResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    fn authorized(&self, request: RequestBuilder, identity: &Identity) -> StorageResult<RequestBuilder> {
        let mut key = HeaderValue::from_str(identity.credential())
            .map_err(|_| StorageError::unavailable("credential is not a valid header value"))?;
        key.set_sensitive(true);
        Ok(request.header(API_KEY_HEADER, key))
    }

    async fn check(response: Response) -> StorageResult<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(StorageError::Rejected { status, body })
    }
}

/// Read-only pricelist adapter over the remote API.
#[derive(Debug, Clone)]
pub struct RemotePricelistStore {
    api: RemoteApi,
}

impl RemotePricelistStore {
    pub fn new(api: RemoteApi) -> Self {
        Self { api }
    }

    fn is_exposed(path: &str) -> bool {
        path.trim_matches('/') == PRICELIST_FILE
    }

    async fn head(&self, identity: &Identity) -> StorageResult<Entry> {
        let url = self.api.url(PRICELIST_ENDPOINT);
        let request = self.api.authorized(self.api.client.head(&url), identity)?;
        let response = request
            .send()
            .await
            .inspect_err(|e| tracing::error!(user = %identity, url = %url, "pricelist HEAD failed: {}", e))?;
        let response = RemoteApi::check(response).await?;

        let headers = response.headers();
        let size = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        let modified = headers
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
            .map(SystemTime::from)
            .unwrap_or_else(SystemTime::now);
        Ok(Entry::file(PRICELIST_FILE, size, modified))
    }
}

#[async_trait]
impl PricelistStore for RemotePricelistStore {
    fn name(&self) -> &'static str {
        "web_api"
    }

    fn is_mutable(&self) -> bool {
        false
    }

    async fn download(&self, identity: &Identity, path: &str) -> StorageResult<Bytes> {
        if !Self::is_exposed(path) {
            return Err(StorageError::not_found(path));
        }
        let url = self.api.url(PRICELIST_ENDPOINT);
        tracing::info!(user = %identity, url = %url, "downloading pricelist");

        let request = self.api.authorized(self.api.client.get(&url), identity)?;
        let response = request
            .send()
            .await
            .inspect_err(|e| tracing::error!(user = %identity, url = %url, "pricelist request failed: {}", e))?;
        let response = match RemoteApi::check(response).await {
            Ok(response) => response,
            Err(StorageError::Rejected { status: 404, .. }) => {
                tracing::info!(user = %identity, url = %url, "no pricelist published");
                return Err(StorageError::not_found(path));
            }
            Err(e) => {
                tracing::error!(user = %identity, url = %url, "{}", e);
                return Err(e);
            }
        };
        let data = response.bytes().await?;

        tracing::info!(user = %identity, bytes = data.len(), "pricelist downloaded");
        Ok(data)
    }

    async fn upload(&self, identity: &Identity, path: &str, _content: Vec<u8>) -> StorageResult<()> {
        tracing::warn!(user = %identity, path = %path, "upload attempted on read-only pricelist API");
        Err(StorageError::Unsupported("upload"))
    }

    async fn list(&self, identity: &Identity, path: &str) -> StorageResult<Vec<Entry>> {
        if !path.trim_matches('/').is_empty() {
            return Ok(Vec::new());
        }
        match self.head(identity).await {
            Ok(entry) => Ok(vec![entry]),
            Err(StorageError::Rejected { status: 404, .. }) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    async fn exists(&self, identity: &Identity, path: &str) -> StorageResult<bool> {
        if !Self::is_exposed(path) {
            return Ok(false);
        }
        match self.head(identity).await {
            Ok(_) => Ok(true),
            Err(StorageError::Rejected { status: 404, .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn metadata(&self, identity: &Identity, path: &str) -> StorageResult<Entry> {
        if !Self::is_exposed(path) {
            return Err(StorageError::not_found(path));
        }
        match self.head(identity).await {
            Err(StorageError::Rejected { status: 404, .. }) => Err(StorageError::not_found(path)),
            other => other,
        }
    }

    async fn mkdir(&self, _identity: &Identity, _path: &str) -> StorageResult<()> {
        Err(StorageError::Unsupported("mkdir"))
    }
}

/// Body of an order submission.
#[derive(Debug, Serialize)]
struct OrderRequest<'a> {
    username: &'a str,
    filename: &'a str,
    content: String,
    timestamp: String,
    file_size: usize,
}

/// Forward-only incoming adapter posting each upload as an order.
#[derive(Debug, Clone)]
pub struct RemoteOrderStore {
    api: RemoteApi,
}

impl RemoteOrderStore {
    pub fn new(api: RemoteApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl IncomingStore for RemoteOrderStore {
    fn name(&self) -> &'static str {
        "web_api"
    }

    fn retains_files(&self) -> bool {
        false
    }

    async fn store(&self, identity: &Identity, filename: &str, content: Vec<u8>) -> StorageResult<()> {
        let order = OrderRequest {
            username: identity.username(),
            filename,
            file_size: content.len(),
            content: String::from_utf8_lossy(&content).into_owned(),
            timestamp: Local::now().format("%Y%m%d_%H%M%S").to_string(),
        };
        let url = self.api.url(ORDER_ENDPOINT);
        tracing::info!(user = %identity, file = %filename, bytes = order.file_size, url = %url, "sending order");

        let request = self.api.authorized(self.api.client.post(&url), identity)?;
        let response = request
            .json(&order)
            .send()
            .await
            .inspect_err(|e| tracing::error!(user = %identity, url = %url, "order request failed: {}", e))?;
        let response = RemoteApi::check(response)
            .await
            .inspect_err(|e| tracing::error!(user = %identity, file = %filename, "{}", e))?;

        tracing::info!(user = %identity, file = %filename, status = response.status().as_u16(), "order accepted");
        Ok(())
    }

    async fn list(&self, _identity: &Identity) -> StorageResult<Vec<Entry>> {
        Ok(Vec::new())
    }
}
