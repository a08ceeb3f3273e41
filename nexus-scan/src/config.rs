//! Scanner configuration
//!
//! Settings resolve CLI → ENV → TOML → compiled default. The fest id comes
//! from `--fest` or the `fest` query parameter of the scanner page URL.

use crate::error::{ScanError, ScanResult};
use crate::verification::RetryPolicy;
use nexus_common::config::ScannerToml;
use reqwest::Url;
use std::time::Duration;

/// Tunables of one scanner session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannerSettings {
    pub scan_interval: Duration,
    pub duplicate_cooldown: Duration,
    pub retry: RetryPolicy,
    pub recent_scans_capacity: usize,
    pub preferred_width: u32,
    pub preferred_height: u32,
    /// Period of the stats refresh that doubles as the reachability check
    pub status_check_interval: Duration,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_millis(200),
            duplicate_cooldown: Duration::from_millis(3000),
            retry: RetryPolicy::default(),
            recent_scans_capacity: 5,
            preferred_width: 1920,
            preferred_height: 1080,
            status_check_interval: Duration::from_secs(5),
        }
    }
}

impl ScannerSettings {
    /// Overlay the `[scanner]` TOML section on the defaults
    pub fn from_toml(toml: &ScannerToml) -> Self {
        let defaults = Self::default();
        Self {
            scan_interval: toml
                .scan_interval_ms
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.scan_interval),
            duplicate_cooldown: toml
                .duplicate_cooldown_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.duplicate_cooldown),
            retry: RetryPolicy {
                max_attempts: toml
                    .verify_max_attempts
                    .filter(|n| *n > 0)
                    .unwrap_or(defaults.retry.max_attempts),
                backoff: toml
                    .rate_limit_backoff_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.retry.backoff),
            },
            recent_scans_capacity: toml
                .recent_scans_capacity
                .filter(|n| *n > 0)
                .unwrap_or(defaults.recent_scans_capacity),
            preferred_width: toml.preferred_width.unwrap_or(defaults.preferred_width),
            preferred_height: toml.preferred_height.unwrap_or(defaults.preferred_height),
            status_check_interval: toml
                .status_check_interval_ms
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.status_check_interval),
        }
    }
}

/// Resolve the fest id from an explicit value or the scanner page URL
///
/// Relative page URLs (`qr-scanner.html?fest=abc`) are accepted.
pub fn resolve_fest_id(explicit: Option<&str>, page_url: Option<&str>) -> ScanResult<String> {
    if let Some(fest) = explicit.map(str::trim).filter(|f| !f.is_empty()) {
        return Ok(fest.to_string());
    }

    let Some(page_url) = page_url else {
        return Err(ScanError::MissingFest);
    };

    let parsed = Url::parse(page_url)
        .or_else(|_| Url::parse("http://localhost/").and_then(|base| base.join(page_url)))
        .map_err(|_| ScanError::MissingFest)?;

    parsed
        .query_pairs()
        .find(|(key, _)| key == "fest")
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or(ScanError::MissingFest)
}
