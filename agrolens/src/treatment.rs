use crate::{config::TreatmentConfig, error::ApiError};
use reqwest::{header, Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum TreatmentError {
    #[error("Treatment API credential is not configured")]
    MissingCredential,
    #[error("Treatment API rejected the credential")]
    Unauthorized,
    #[error("Treatment API forbade the request")]
    Forbidden,
    #[error("No treatment found for the requested pest")]
    NotFound,
    #[error("Treatment API answered with unexpected status {0}")]
    UnexpectedStatus(StatusCode),
    #[error("Treatment API request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Failed to build treatment API client: {0}")]
    Client(String),
}

impl From<TreatmentError> for ApiError {
    fn from(err: TreatmentError) -> Self {
        match err {
            TreatmentError::Unauthorized => ApiError::Unauthorized,
            TreatmentError::Forbidden => ApiError::Forbidden,
            TreatmentError::NotFound => ApiError::NotFound,
            TreatmentError::MissingCredential
            | TreatmentError::UnexpectedStatus(_)
            | TreatmentError::Request(_)
            | TreatmentError::Client(_) => ApiError::Internal,
        }
    }
}

/// Client for the external pest-treatment catalog (AGROFIT formulated products search).
#[derive(Debug, Clone)]
pub struct TreatmentClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl TreatmentClient {
    pub fn new(config: &TreatmentConfig, token: Option<String>) -> Result<Self, TreatmentError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| TreatmentError::Client(e.to_string()))?;

        if token.is_none() {
            tracing::warn!(
                "{} is not set, treatment lookups will fail",
                config.token_env
            );
        }

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            token,
        })
    }

    pub fn has_credential(&self) -> bool {
        self.token.is_some()
    }

    /// Fetches the products registered for `disease_name`.
    ///
    /// Returns the upstream JSON array untouched. An empty array, or a body
    /// that is not an array, means the pest is unknown upstream.
    #[instrument(skip(self))]
    pub async fn lookup(&self, disease_name: &str) -> Result<Value, TreatmentError> {
        let token = self
            .token
            .as_deref()
            .ok_or(TreatmentError::MissingCredential)?;

        let response = self
            .client
            .get(&self.base_url)
            .header(header::ACCEPT, "application/json")
            .bearer_auth(token)
            .query(&[("q", disease_name), ("praga_nome_cientifico", disease_name)])
            .send()
            .await?;

        let status = response.status();
        match status {
            StatusCode::UNAUTHORIZED => return Err(TreatmentError::Unauthorized),
            StatusCode::FORBIDDEN => return Err(TreatmentError::Forbidden),
            StatusCode::NOT_FOUND => return Err(TreatmentError::NotFound),
            s if !s.is_success() => return Err(TreatmentError::UnexpectedStatus(s)),
            _ => {}
        }

        let data: Value = response.json().await?;
        match data.as_array() {
            Some(items) if !items.is_empty() => Ok(data),
            _ => Err(TreatmentError::NotFound),
        }
    }
}
