//! reqwest implementation of [`ScanApi`]

use super::types::{
    DeniedEntry, FestStats, RecentScanRecord, RecentScansResponse, VerifyRequest, VerifyResponse,
};
use super::ScanApi;
use crate::auth::BearerToken;
use crate::error::ApiError;
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use std::time::Duration;

const USER_AGENT: &str = concat!("nexus-scan/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Scan API client with bearer authentication
pub struct HttpScanApi {
    http_client: reqwest::Client,
    base_url: Url,
    token: BearerToken,
}

impl HttpScanApi {
    pub fn new(base_url: impl Into<String>, token: BearerToken) -> Result<Self, ApiError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let base_url = base_url.into();
        let base_url = Url::parse(&base_url)
            .map_err(|e| ApiError::Parse(format!("Invalid API base URL {}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::Parse(format!("Invalid API base URL {}", base_url)));
        }

        Ok(Self {
            http_client,
            base_url,
            token,
        })
    }

    /// Endpoint URL below the base path; every segment is percent-encoded
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Map non-success statuses shared by every endpoint
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ApiError::RateLimited);
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ApiError::Unauthorized);
        }
        let error_text = response.text().await.unwrap_or_default();
        Err(ApiError::Status(status.as_u16(), error_text))
    }
}

#[async_trait]
impl ScanApi for HttpScanApi {
    async fn verify_ticket(
        &self,
        ticket_id: &str,
        fest_id: &str,
    ) -> Result<VerifyResponse, ApiError> {
        tracing::debug!(ticket_id = %ticket_id, fest_id = %fest_id, "POST /scan/verify");

        let response = self
            .http_client
            .post(self.endpoint(&["scan", "verify"]))
            .bearer_auth(self.token.as_str())
            .json(&VerifyRequest { ticket_id, fest_id })
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = response.status();

        // A 4xx carrying the usual body (e.g. 404 "Ticket not found") is still
        // a verification answer, not a transport failure.
        if status.is_client_error()
            && status != StatusCode::TOO_MANY_REQUESTS
            && status != StatusCode::UNAUTHORIZED
            && status != StatusCode::FORBIDDEN
        {
            let text = response.text().await.unwrap_or_default();
            return match serde_json::from_str::<VerifyResponse>(&text) {
                Ok(body) => Ok(body),
                Err(_) => Err(ApiError::Status(status.as_u16(), text)),
            };
        }

        Self::check_status(response)
            .await?
            .json::<VerifyResponse>()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))
    }

    async fn log_denied_entry(&self, entry: &DeniedEntry) -> Result<(), ApiError> {
        let response = self
            .http_client
            .post(self.endpoint(&["scan", "log-denied"]))
            .bearer_auth(self.token.as_str())
            .json(entry)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Self::check_status(response).await?;
        Ok(())
    }

    async fn fest_stats(&self, fest_id: &str) -> Result<FestStats, ApiError> {
        let response = self
            .http_client
            .get(self.endpoint(&["scan", "fest-stats", fest_id]))
            .bearer_auth(self.token.as_str())
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Self::check_status(response)
            .await?
            .json::<FestStats>()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))
    }

    async fn recent_scans(&self, fest_id: &str) -> Result<Vec<RecentScanRecord>, ApiError> {
        let response = self
            .http_client
            .get(self.endpoint(&["scan", "recent-scans", fest_id]))
            .bearer_auth(self.token.as_str())
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let body: RecentScansResponse = Self::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))?;
        Ok(body.scans)
    }
}
