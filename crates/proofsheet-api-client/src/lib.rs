//! HTTP client for the Proofsheet gallery API.
//!
//! Provides a minimal client with configurable auth (Bearer token or X-API-Key)
//! and the two upload collaborators the pipeline needs: [`ApiClient`] implements
//! both [`OriginalUploader`](proofsheet_core::OriginalUploader) and
//! [`PreviewUploader`](proofsheet_core::PreviewUploader).

pub mod api;

use anyhow::{Context, Result};
use proofsheet_core::{AuthScheme, ClientConfig, PipelineError};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;

pub use api::OriginalResponse;

/// Authentication strategy for the API.
#[derive(Clone, Debug)]
pub enum Auth {
    /// `Authorization: Bearer {token}`
    Bearer(String),
    /// `X-API-Key: {key}`
    XApiKey(String),
}

/// HTTP client for the gallery API with configurable auth.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    api_prefix: String,
    auth: Auth,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let auth = match config.auth_scheme {
            AuthScheme::Bearer => Auth::Bearer(config.api_key.clone()),
            AuthScheme::ApiKey => Auth::XApiKey(config.api_key.clone()),
        };

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_prefix: config.api_prefix(),
            auth,
        })
    }

    /// Create client from environment: PROOFSHEET_API_URL, PROOFSHEET_API_KEY,
    /// PROOFSHEET_AUTH_SCHEME, PROOFSHEET_API_VERSION.
    pub fn from_env() -> Result<Self> {
        let config = ClientConfig::from_env().context("Invalid API client configuration")?;
        Self::new(&config)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn build_url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, self.api_prefix, path)
    }

    fn apply_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth {
            Auth::Bearer(token) => request.header("Authorization", format!("Bearer {}", token)),
            Auth::XApiKey(key) => request.header("X-API-Key", key.as_str()),
        }
    }

    /// POST multipart form and deserialize the JSON response.
    ///
    /// Non-success statuses are classified through [`classify_status`];
    /// transport failures (connect, timeout, reset) are transient.
    pub async fn post_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        form: reqwest::multipart::Form,
        idempotency_key: Option<&str>,
    ) -> Result<T, PipelineError> {
        let url = self.build_url(path);
        let mut request = self.client.post(&url).multipart(form);
        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key);
        }
        let request = self.apply_auth(request);

        let response = request
            .send()
            .await
            .map_err(|e| PipelineError::transient(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PipelineError::transient(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            PipelineError::permanent(format!("failed to parse response as JSON: {}", e))
        })
    }
}

/// Map an unsuccessful HTTP status onto the pipeline's error taxonomy.
///
/// 402 is a quota refusal, 408/429/5xx are worth retrying, every other status
/// fails the same way on retry.
pub fn classify_status(status: StatusCode, body: &str) -> PipelineError {
    let body = body.trim();
    let detail = if body.is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, body)
    };

    match status {
        StatusCode::PAYMENT_REQUIRED => PipelineError::QuotaExceeded(detail),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            PipelineError::transient(format!("API request failed with status {}", detail))
        }
        s if s.is_server_error() => {
            PipelineError::transient(format!("API request failed with status {}", detail))
        }
        _ => PipelineError::permanent(format!("API request failed with status {}", detail)),
    }
}
