//! Ticket verification pipeline
//!
//! raw payload → ticket id → remote verification (retried on HTTP 429) →
//! [`Classification`]. Every path ends in a classification except a
//! rejected credential, which ends the session with
//! [`ScanError::Unauthenticated`].

use crate::api::{ScanApi, Ticket, TicketStatus, VerifyResponse};
use crate::error::{ApiError, ScanError, ScanResult};
use nexus_common::events::VerificationOutcome;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const INVALID_QR_MESSAGE: &str = "Invalid QR Code.";
pub const NETWORK_ERROR_MESSAGE: &str = "Could not verify ticket. Try again.";
pub const TICKET_NOT_FOUND_MESSAGE: &str = "Ticket not found";

/// JSON keys that may carry the ticket id in a structured payload
const TICKET_ID_KEYS: [&str; 4] = ["ticketId", "ticket_id", "id", "ticket"];

/// Extract the ticket id from a scanned payload
///
/// Structured (JSON) payloads are tried first; anything else is taken
/// verbatim. Returns `None` when no identifier can be found.
pub fn resolve_ticket_id(payload: &str) -> Option<String> {
    let trimmed = payload.trim();
    if trimmed.is_empty() {
        return None;
    }

    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(serde_json::Value::Object(map)) => TICKET_ID_KEYS
            .iter()
            .filter_map(|key| map.get(*key))
            .find_map(|value| match value {
                serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            }),
        Ok(serde_json::Value::String(s)) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        // Bare numbers, arrays etc. and plain text are used verbatim
        Ok(serde_json::Value::Array(_)) | Ok(serde_json::Value::Null) => None,
        _ => Some(trimmed.to_string()),
    }
}

/// Retry policy for rate-limited calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Fixed delay between attempts
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(2),
        }
    }
}

/// Tagged result of [`retry_on_rate_limit`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T> {
    Completed { value: T, attempts: u32 },
    RateLimitExhausted { attempts: u32 },
    Failed { error: ApiError, attempts: u32 },
}

impl<T> RetryOutcome<T> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Completed { attempts, .. }
            | RetryOutcome::RateLimitExhausted { attempts }
            | RetryOutcome::Failed { attempts, .. } => *attempts,
        }
    }
}

/// Run `operation` until it stops answering [`ApiError::RateLimited`]
///
/// Sleeps `policy.backoff` between attempts and gives up after
/// `policy.max_attempts`. Other errors end the loop immediately.
pub async fn retry_on_rate_limit<F, Fut, T>(
    operation_name: &str,
    policy: RetryPolicy,
    mut operation: F,
) -> RetryOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation = operation_name, attempt, "Succeeded after rate limiting");
                }
                return RetryOutcome::Completed {
                    value,
                    attempts: attempt,
                };
            }
            Err(ApiError::RateLimited) if attempt < max_attempts => {
                warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms = policy.backoff.as_millis() as u64,
                    "Rate limited, will retry after backoff"
                );
                tokio::time::sleep(policy.backoff).await;
            }
            Err(ApiError::RateLimited) => {
                warn!(operation = operation_name, attempt, "Rate limited, retries exhausted");
                return RetryOutcome::RateLimitExhausted { attempts: attempt };
            }
            Err(error) => {
                return RetryOutcome::Failed {
                    error,
                    attempts: attempt,
                };
            }
        }
    }
}

/// Verification result shown to the operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Ticket accepted; the backend has marked it used
    Success { ticket: Ticket },
    /// Ticket exists but was already checked in
    AlreadyUsed { ticket: Ticket },
    /// Unknown ticket or unreadable payload
    Invalid {
        ticket_id: Option<String>,
        message: String,
    },
    /// Backend unreachable, failing, or still rate limiting
    NetworkError {
        ticket_id: Option<String>,
        message: String,
    },
}

impl Classification {
    pub fn outcome(&self) -> VerificationOutcome {
        match self {
            Classification::Success { .. } => VerificationOutcome::Success,
            Classification::AlreadyUsed { .. } => VerificationOutcome::AlreadyUsed,
            Classification::Invalid { .. } => VerificationOutcome::Invalid,
            Classification::NetworkError { .. } => VerificationOutcome::NetworkError,
        }
    }

    /// Only a successful verification may lead to an entry decision
    pub fn allows_entry_decision(&self) -> bool {
        matches!(self, Classification::Success { .. })
    }

    pub fn ticket(&self) -> Option<&Ticket> {
        match self {
            Classification::Success { ticket } | Classification::AlreadyUsed { ticket } => {
                Some(ticket)
            }
            _ => None,
        }
    }

    pub fn ticket_id(&self) -> Option<&str> {
        match self {
            Classification::Success { ticket } | Classification::AlreadyUsed { ticket } => {
                Some(&ticket.ticket_id)
            }
            Classification::Invalid { ticket_id, .. }
            | Classification::NetworkError { ticket_id, .. } => ticket_id.as_deref(),
        }
    }

    pub fn attendee_name(&self) -> Option<&str> {
        self.ticket()
            .map(|t| t.attendee_name.as_str())
            .filter(|name| !name.is_empty())
    }

    pub fn title(&self) -> &'static str {
        match self {
            Classification::Success { .. } => "Valid Ticket",
            Classification::AlreadyUsed { .. } => "Already Checked In",
            Classification::Invalid { .. } => "Invalid Ticket",
            Classification::NetworkError { .. } => "Verification Failed",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Classification::Success { .. } => "Ready to check in".to_string(),
            Classification::AlreadyUsed { ticket } => format!(
                "Used at {}",
                ticket.used_at.as_deref().unwrap_or("earlier today")
            ),
            Classification::Invalid { message, .. }
            | Classification::NetworkError { message, .. } => message.clone(),
        }
    }
}

/// Map a verification response body to a classification
///
/// `valid = false` with a ticket means already used, unless the backend
/// explicitly marks the ticket invalid.
pub fn classify_response(ticket_id: &str, response: VerifyResponse) -> Classification {
    let VerifyResponse {
        success,
        valid,
        ticket,
        error,
    } = response;

    match (success, valid, ticket) {
        (true, true, ticket) => Classification::Success {
            ticket: ticket.unwrap_or_else(|| Ticket {
                ticket_id: ticket_id.to_string(),
                attendee_name: String::new(),
                ticket_type: None,
                status: Some(TicketStatus::Valid),
                issued_at: None,
                used_at: None,
                fest_id: None,
            }),
        },
        (true, false, Some(ticket)) if ticket.status != Some(TicketStatus::Invalid) => {
            Classification::AlreadyUsed { ticket }
        }
        _ => Classification::Invalid {
            ticket_id: Some(ticket_id.to_string()),
            message: error
                .filter(|e| !e.trim().is_empty())
                .unwrap_or_else(|| TICKET_NOT_FOUND_MESSAGE.to_string()),
        },
    }
}

/// One finished verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub classification: Classification,
    /// Remote calls made (0 when the payload was unresolvable)
    pub attempts: u32,
}

/// Verification pipeline bound to a scan API
#[derive(Clone)]
pub struct VerificationPipeline {
    api: Arc<dyn ScanApi>,
    policy: RetryPolicy,
}

impl VerificationPipeline {
    pub fn new(api: Arc<dyn ScanApi>, policy: RetryPolicy) -> Self {
        Self { api, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Verify a raw payload for a fest
    ///
    /// A 401/403 from the backend is not a verification answer: it returns
    /// [`ScanError::Unauthenticated`].
    pub async fn verify(&self, raw_payload: &str, fest_id: &str) -> ScanResult<Verification> {
        let Some(ticket_id) = resolve_ticket_id(raw_payload) else {
            info!(outcome = %VerificationOutcome::Invalid, "Unresolvable QR payload");
            return Ok(Verification {
                classification: Classification::Invalid {
                    ticket_id: None,
                    message: INVALID_QR_MESSAGE.to_string(),
                },
                attempts: 0,
            });
        };

        let api = &self.api;
        let outcome = retry_on_rate_limit("verify_ticket", self.policy, || {
            api.verify_ticket(&ticket_id, fest_id)
        })
        .await;
        let attempts = outcome.attempts();

        let classification = match outcome {
            RetryOutcome::Completed { value, .. } => classify_response(&ticket_id, value),
            RetryOutcome::RateLimitExhausted { .. } => Classification::NetworkError {
                ticket_id: Some(ticket_id.clone()),
                message: NETWORK_ERROR_MESSAGE.to_string(),
            },
            RetryOutcome::Failed {
                error: ApiError::Unauthorized,
                attempts,
            } => {
                warn!(ticket_id = %ticket_id, attempts, "Bearer credential rejected during verification");
                return Err(ScanError::Unauthenticated);
            }
            RetryOutcome::Failed { error, .. } => {
                warn!(ticket_id = %ticket_id, error = %error, "Ticket verification failed");
                Classification::NetworkError {
                    ticket_id: Some(ticket_id.clone()),
                    message: NETWORK_ERROR_MESSAGE.to_string(),
                }
            }
        };

        info!(
            ticket_id = %ticket_id,
            fest_id = %fest_id,
            attempts,
            outcome = %classification.outcome(),
            "Ticket verified"
        );

        Ok(Verification {
            classification,
            attempts,
        })
    }
}
