//! Wire types for the scan endpoints

use serde::{Deserialize, Serialize};

/// Ticket status as reported by the backend at verification time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Valid,
    #[serde(alias = "used")]
    AlreadyUsed,
    Invalid,
    #[serde(other)]
    Unknown,
}

/// Ticket as returned by `POST /scan/verify`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    #[serde(alias = "id")]
    pub ticket_id: String,
    #[serde(default, alias = "name")]
    pub attendee_name: String,
    #[serde(default, alias = "type")]
    pub ticket_type: Option<String>,
    #[serde(default)]
    pub status: Option<TicketStatus>,
    #[serde(default)]
    pub issued_at: Option<String>,
    #[serde(default, alias = "usedAt")]
    pub used_at: Option<String>,
    #[serde(default)]
    pub fest_id: Option<String>,
}

/// `POST /scan/verify` request body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest<'a> {
    pub ticket_id: &'a str,
    pub fest_id: &'a str,
}

/// `POST /scan/verify` response body
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub valid: bool,
    #[serde(default)]
    pub ticket: Option<Ticket>,
    #[serde(default)]
    pub error: Option<String>,
}

/// `POST /scan/log-denied` request body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeniedEntry {
    pub ticket_id: String,
    pub fest_id: String,
    pub attendee_name: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCounts {
    #[serde(default)]
    pub valid: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FestCapacity {
    #[serde(default)]
    pub capacity: u64,
}

/// `GET /scan/fest-stats/{festId}` response body
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FestStats {
    #[serde(default)]
    pub scans: ScanCounts,
    #[serde(default)]
    pub fest: FestCapacity,
}

/// One row of `GET /scan/recent-scans/{festId}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentScanRecord {
    pub attendee_name: String,
    pub status: String,
    #[serde(default)]
    pub scanned_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecentScansResponse {
    #[serde(default)]
    pub scans: Vec<RecentScanRecord>,
}
