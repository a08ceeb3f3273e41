//! Error types for nexus-scan
//!
//! Expected, high-frequency conditions (undecodable frames, duplicate scans,
//! unresolvable payloads) are not errors here: they are absorbed by the scan
//! loop or classified by the verification pipeline.

use thiserror::Error;

/// Page the operator is sent to when the login precondition fails
pub const LOGIN_PAGE: &str = "host-signup-login.html";

/// Page the operator is sent to when no fest was selected
pub const FEST_LISTING_PAGE: &str = "my-fests.html";

/// Remote API call failure
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// HTTP 429 from the backend
    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Network error: {0}")]
    Network(String),

    /// HTTP 401/403: the bearer credential was rejected
    #[error("Unauthorized")]
    Unauthorized,

    #[error("API error {0}: {1}")]
    Status(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Camera device failure
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("Camera permission denied")]
    PermissionDenied,

    #[error("No matching camera: {0}")]
    NotFound(String),

    /// Device-level failure (torch constraint rejected, track ended)
    #[error("Camera device error: {0}")]
    Device(String),
}

/// Scanner session error
#[derive(Debug, Error)]
pub enum ScanError {
    /// No bearer credential available; fail closed
    #[error("Not signed in")]
    Unauthenticated,

    /// No fest identifier in the page URL or arguments
    #[error("No fest selected")]
    MissingFest,

    /// Operator action not offered in the current check-in state
    #[error("Action {action} not available while {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },

    #[error("Please enter a ticket number")]
    EmptyManualEntry,

    #[error(transparent)]
    Camera(#[from] CameraError),

    #[error(transparent)]
    Common(#[from] nexus_common::Error),
}

impl ScanError {
    /// Collaborator page a fail-closed precondition redirects to
    pub fn redirect_target(&self) -> Option<&'static str> {
        match self {
            ScanError::Unauthenticated => Some(LOGIN_PAGE),
            ScanError::MissingFest => Some(FEST_LISTING_PAGE),
            _ => None,
        }
    }
}

/// Result type for scanner session operations
pub type ScanResult<T> = Result<T, ScanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_targets() {
        assert_eq!(ScanError::Unauthenticated.redirect_target(), Some(LOGIN_PAGE));
        assert_eq!(ScanError::MissingFest.redirect_target(), Some(FEST_LISTING_PAGE));
        assert_eq!(ScanError::EmptyManualEntry.redirect_target(), None);
    }

    #[test]
    fn test_empty_manual_entry_message() {
        assert_eq!(
            ScanError::EmptyManualEntry.to_string(),
            "Please enter a ticket number"
        );
    }
}
