use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;

use crate::config::ProviderSettings;
use crate::models::contact::ResultRow;
use crate::ports::{EnrichmentBatch, ProviderError, ProviderGateway, ProviderStatus};

/// Longest error body kept from a failed provider response.
const MAX_ERROR_BODY: usize = 500;

/// Client for the BetterContact asynchronous enrichment API.
pub struct BetterContactClient {
    http: Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
    #[serde(default)]
    data: Option<Vec<ResultRow>>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl BetterContactClient {
    pub fn new(settings: &ProviderSettings) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(ProviderError::from)?;

        Ok(Self {
            http,
            base_url: settings.base_url.clone(),
            api_key: settings.api_key.clone(),
        })
    }

    fn jobs_url(&self) -> String {
        format!("{}/api/v2/async", self.base_url)
    }
}

#[async_trait]
impl ProviderGateway for BetterContactClient {
    async fn create_job(&self, batch: &EnrichmentBatch) -> Result<String, ProviderError> {
        let response = self
            .http
            .post(self.jobs_url())
            .header("X-API-Key", &self.api_key)
            .json(batch)
            .send()
            .await?;

        let body: SubmitResponse = ensure_success(response).await?.json().await?;
        parse_submission(body)
    }

    async fn fetch_status(&self, job_id: &str) -> Result<ProviderStatus, ProviderError> {
        let response = self
            .http
            .get(format!("{}/{}", self.jobs_url(), job_id))
            .header("X-API-Key", &self.api_key)
            .send()
            .await?;

        let body: StatusResponse = ensure_success(response).await?.json().await?;
        parse_status(body)
    }
}

async fn ensure_success(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }

    Err(ProviderError::Http {
        status: status.as_u16(),
        body,
    })
}

fn parse_submission(body: SubmitResponse) -> Result<String, ProviderError> {
    let message = body.message.unwrap_or_default();
    match body.id {
        Some(id) if body.success && !id.trim().is_empty() => Ok(id),
        _ if !body.success => Err(ProviderError::Rejected(message)),
        _ => Err(ProviderError::Decode(
            "submission accepted without a job id".to_string(),
        )),
    }
}

fn parse_status(body: StatusResponse) -> Result<ProviderStatus, ProviderError> {
    match body.status.to_ascii_lowercase().as_str() {
        "pending" => Ok(ProviderStatus::Pending),
        "processing" | "in_progress" => Ok(ProviderStatus::Processing),
        "terminated" | "completed" => Ok(ProviderStatus::Terminated(body.data.unwrap_or_default())),
        "failed" => Ok(ProviderStatus::Failed(
            body.error
                .or(body.message)
                .unwrap_or_else(|| "provider reported failure".to_string()),
        )),
        other => Err(ProviderError::Decode(format!("unknown job status '{}'", other))),
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else if err.is_decode() {
            ProviderError::Decode(err.to_string())
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}
