//! Client for the remote summarisation service.
//!
//! Two endpoints: `POST /summarise` returns a plain summary for a document of
//! a known type, and `POST /analyze` returns the summary together with the
//! detected violations.

use crate::classifier::DocumentType;
use crate::config::{Config, ConfigError};
use crate::summary::{SummariseResponse, SummaryResponse};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("request to {0} failed: {1}")]
    RequestFailed(String, #[source] reqwest::Error),
    #[error("{0} answered with status {1}")]
    Status(String, reqwest::StatusCode),
    #[error("failed to parse response from {0}: {1}")]
    ParseError(String, #[source] reqwest::Error),
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),
    #[error("configuration error: {0}")]
    ConfigError(#[from] ConfigError),
}

#[derive(Serialize)]
struct SummariseRequest<'a> {
    doc: &'a str,
    doctype: DocumentType,
}

#[derive(Serialize)]
struct AnalyzeRequest<'a> {
    text: &'a str,
}

/// HTTP client bound to one service base URL
#[derive(Debug, Clone)]
pub struct ServiceClient {
    client: Client,
    base_url: Url,
}

impl ServiceClient {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .user_agent(concat!("policypal/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::RequestFailed(base_url.to_string(), e))?;
        Ok(Self { client, base_url })
    }

    pub fn from_config(config: &Config) -> Result<Self, ServiceError> {
        Self::new(
            config.service_url()?,
            Duration::from_secs(config.service.timeout_secs),
        )
    }

    /// Request a summary of `doc`
    pub async fn summarise(
        &self,
        doc: &str,
        doctype: DocumentType,
    ) -> Result<SummariseResponse, ServiceError> {
        info!(chars = doc.len(), %doctype, "requesting summary");
        self.post_json("summarise", &SummariseRequest { doc, doctype })
            .await
    }

    /// Request the full violation analysis of `text`
    pub async fn analyze(&self, text: &str) -> Result<SummaryResponse, ServiceError> {
        info!(chars = text.len(), "requesting analysis");
        self.post_json("analyze", &AnalyzeRequest { text }).await
    }

    async fn post_json<B, R>(&self, endpoint: &str, body: &B) -> Result<R, ServiceError>
    where
        B: Serialize,
        R: serde::de::DeserializeOwned,
    {
        let url = self.endpoint(endpoint)?;
        let response = self
            .client
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| ServiceError::RequestFailed(url.to_string(), e))?;

        let status = response.status();
        debug!(%url, %status, "service responded");
        if !status.is_success() {
            return Err(ServiceError::Status(url.to_string(), status));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| ServiceError::ParseError(url.to_string(), e))
    }

    /// Resolve an endpoint name against the base URL, keeping any base path
    fn endpoint(&self, name: &str) -> Result<Url, ServiceError> {
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(base.join(name)?)
    }
}
