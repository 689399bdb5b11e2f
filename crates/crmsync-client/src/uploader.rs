use std::time::Duration;

use crmsync_core::error::AppError;
use crmsync_core::models::ApiResponse;
use crmsync_core::traits::Uploader;
use reqwest::Client;
use url::Url;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Connection settings for the CRM API.
#[derive(Debug, Clone)]
pub struct CrmConfig {
    pub base_url: String,
    pub api_token: String,
    pub timeout: Duration,
}

impl CrmConfig {
    pub fn new(base_url: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_token: api_token.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Read configuration from environment variables.
    ///
    /// - `CRMSYNC_API_URL` (required)
    /// - `CRMSYNC_API_TOKEN` (required)
    /// - `CRMSYNC_API_TIMEOUT_SECS` (optional, defaults to 30)
    pub fn from_env() -> Result<Self, AppError> {
        let base_url = std::env::var("CRMSYNC_API_URL")
            .map_err(|_| AppError::ConfigError("CRMSYNC_API_URL is required".into()))?;
        let api_token = std::env::var("CRMSYNC_API_TOKEN")
            .map_err(|_| AppError::ConfigError("CRMSYNC_API_TOKEN is required".into()))?;
        let timeout_secs = match std::env::var("CRMSYNC_API_TIMEOUT_SECS") {
            Ok(raw) => raw.parse().map_err(|_| {
                AppError::ConfigError(format!("Invalid CRMSYNC_API_TIMEOUT_SECS '{raw}'"))
            })?,
            Err(_) => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Self {
            base_url,
            api_token,
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Uploads batches to the CRM over HTTPS with bearer authentication.
///
/// Every HTTP status is handed back to the caller; only requests that never
/// produced a status are errors.
#[derive(Clone)]
pub struct ReqwestUploader {
    client: Client,
    base_url: Url,
    api_token: String,
    timeout_secs: u64,
}

impl ReqwestUploader {
    pub fn new(config: &CrmConfig) -> Result<Self, AppError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            AppError::ConfigError(format!("Invalid CRM API URL '{}': {e}", config.base_url))
        })?;
        match base_url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(AppError::ConfigError(format!(
                    "CRM API URL scheme '{scheme}' is not allowed (only http/https)"
                )));
            }
        }

        let client = Client::builder()
            .user_agent(concat!("crmsync/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            api_token: config.api_token.clone(),
            timeout_secs: config.timeout.as_secs(),
        })
    }

    fn endpoint_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }
}

impl Uploader for ReqwestUploader {
    async fn upload(
        &self,
        endpoint: &str,
        payload: &serde_json::Value,
    ) -> Result<ApiResponse, AppError> {
        let url = self.endpoint_url(endpoint);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_token))
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Timeout(self.timeout_secs)
                } else if e.is_connect() {
                    AppError::NetworkError(format!("Connection failed: {}", e))
                } else {
                    AppError::HttpError(e.to_string())
                }
            })?;

        let code = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to read response body: {e}")))?;

        tracing::debug!(%url, code, "CRM upload answered");
        Ok(ApiResponse::new(code, body))
    }
}
