//! HTTP client for the remote Genesis API.

use std::time::Duration;

use async_trait::async_trait;
use genesis_core::DataType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{JobError, Result};

/// Configuration for the Genesis API client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the Genesis API, without a trailing slash.
    pub base_url: String,
    /// Bearer token for outbound calls.
    pub api_key: String,
    /// Timeout for each request.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.genesis.example.com".to_string(),
            api_key: String::new(),
            timeout: Duration::from_secs(30),
            user_agent: "Genesis-Integration/1.0".to_string(),
        }
    }
}

/// Remote data source for sync jobs.
///
/// Returns the records for one dataset of one project. Implementations
/// map every transport or decode problem to [`JobError::RemoteCall`] so
/// the sync processor can record it uniformly.
#[async_trait]
pub trait GenesisApi: Send + Sync {
    /// Fetches all records of `data_type` for `project_id`.
    async fn fetch(&self, data_type: &DataType, project_id: &str) -> Result<Vec<Value>>;
}

/// reqwest-backed [`GenesisApi`] implementation.
#[derive(Debug, Clone)]
pub struct HttpGenesisClient {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpGenesisClient {
    /// Creates a client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `JobError::RemoteCall` if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| JobError::remote(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    fn endpoint(&self, data_type: &DataType, project_id: &str) -> Result<String> {
        let path = match data_type {
            DataType::Users => "users",
            DataType::Billing => "billing/plans",
            DataType::Features => "features",
            DataType::Other(name) => {
                return Err(JobError::remote(format!(
                    "no remote endpoint defined for data type '{name}'"
                )));
            },
        };
        Ok(format!("{}/projects/{}/{}", self.config.base_url, project_id, path))
    }
}

#[async_trait]
impl GenesisApi for HttpGenesisClient {
    async fn fetch(&self, data_type: &DataType, project_id: &str) -> Result<Vec<Value>> {
        let url = self.endpoint(data_type, project_id)?;
        debug!(%data_type, project_id, %url, "fetching from Genesis API");

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    JobError::remote(format!(
                        "request timed out after {}s",
                        self.config.timeout.as_secs()
                    ))
                } else {
                    JobError::remote(format!("request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(JobError::remote(format!("unexpected status {status} from {url}")));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| JobError::remote(format!("invalid JSON response: {e}")))?;

        // Responses are either a bare array or an envelope {"data": [...]}
        match body {
            Value::Array(records) => Ok(records),
            Value::Object(mut map) => match map.remove("data") {
                Some(Value::Array(records)) => Ok(records),
                _ => Err(JobError::remote("response missing 'data' array".to_string())),
            },
            _ => Err(JobError::remote("response is neither array nor object".to_string())),
        }
    }
}
