use crate::errors::{Error, Result};
use crate::normalize::extract_nodes;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const ORG_KEY_HEADER: &str = "x-organization-key";

/// Connection parameters for the fleet topology API.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub org_key: String,
    pub project_uuid: String,
    pub timeout: Duration,
}

/// Fetches project topologies from the fleet API.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: Client,
    url: String,
    timeout: Duration,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let org_key = HeaderValue::from_str(&config.org_key)
            .map_err(|e| Error::Config(format!("organization key is not a valid header: {}", e)))?;
        headers.insert(ORG_KEY_HEADER, org_key);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            url: format!(
                "{}/manage/api/v1.0/projects/{}/topologies",
                config.base_url.trim_end_matches('/'),
                config.project_uuid
            ),
            timeout: config.timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// One GET of the topology document. No retries.
    pub async fn fetch(&self) -> Result<Value> {
        debug!("Fetching topologies from {}", self.url);
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(|e| self.classify(e))?;
        serde_json::from_slice(&body).map_err(|e| Error::Decode(e.to_string()))
    }

    pub async fn fetch_nodes(&self) -> Result<Vec<Value>> {
        extract_nodes(self.fetch().await?)
    }

    fn classify(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout(self.timeout)
        } else {
            Error::Http(err)
        }
    }
}
