//! Remote scan API
//!
//! The check-in controller only talks to the backend through [`ScanApi`];
//! [`HttpScanApi`] is the production implementation.

mod http;
mod types;

pub use http::HttpScanApi;
pub use types::{
    DeniedEntry, FestCapacity, FestStats, RecentScanRecord, RecentScansResponse, ScanCounts,
    Ticket, TicketStatus, VerifyRequest, VerifyResponse,
};

use crate::error::ApiError;
use async_trait::async_trait;

/// Scan endpoints consumed by the check-in controller
#[async_trait]
pub trait ScanApi: Send + Sync {
    /// `POST /scan/verify`
    ///
    /// Returns [`ApiError::RateLimited`] on HTTP 429 so the caller can retry.
    async fn verify_ticket(&self, ticket_id: &str, fest_id: &str)
        -> Result<VerifyResponse, ApiError>;

    /// `POST /scan/log-denied` (audit only)
    async fn log_denied_entry(&self, entry: &DeniedEntry) -> Result<(), ApiError>;

    /// `GET /scan/fest-stats/{festId}`
    async fn fest_stats(&self, fest_id: &str) -> Result<FestStats, ApiError>;

    /// `GET /scan/recent-scans/{festId}`
    async fn recent_scans(&self, fest_id: &str) -> Result<Vec<RecentScanRecord>, ApiError>;
}
