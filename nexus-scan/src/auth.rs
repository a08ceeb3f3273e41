//! Bearer credential resolution
//!
//! Token issuance belongs to the login flow; the scanner only picks up an
//! existing token and fails closed when none is present.

use crate::error::{ScanError, ScanResult};
use std::path::Path;
use tracing::{debug, info};

/// Environment variable carrying the host bearer token
pub const TOKEN_ENV: &str = "NEXUS_HOST_TOKEN";

/// Host bearer credential
///
/// `Debug` never prints the token itself.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    /// Wrap a raw token; blank input yields `None`
    pub fn new(raw: impl AsRef<str>) -> Option<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BearerToken(<{} bytes>)", self.0.len())
    }
}

/// Resolve the bearer credential
///
/// **Priority:** command line → `NEXUS_HOST_TOKEN` → token file in the root folder
pub fn resolve_credential(cli_token: Option<&str>, token_file: &Path) -> ScanResult<BearerToken> {
    if let Some(token) = cli_token.and_then(BearerToken::new) {
        info!("Bearer credential taken from command line");
        return Ok(token);
    }

    if let Some(token) = std::env::var(TOKEN_ENV).ok().and_then(BearerToken::new) {
        info!("Bearer credential taken from {}", TOKEN_ENV);
        return Ok(token);
    }

    match std::fs::read_to_string(token_file) {
        Ok(content) => {
            if let Some(token) = BearerToken::new(content) {
                info!("Bearer credential loaded from {}", token_file.display());
                return Ok(token);
            }
            debug!("Token file {} is empty", token_file.display());
        }
        Err(e) => debug!("No token file at {}: {}", token_file.display(), e),
    }

    Err(ScanError::Unauthenticated)
}
