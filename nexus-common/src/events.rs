//! Event types for the Nexus event system
//!
//! Provides shared event definitions and the EventBus used by the host tools
//! to publish operator-facing state (notifications, scan results, counters).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Severity of an operator notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Success,
    Error,
}

/// Classification of one verification cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationOutcome {
    Success,
    AlreadyUsed,
    Invalid,
    NetworkError,
}

impl std::fmt::Display for VerificationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerificationOutcome::Success => write!(f, "success"),
            VerificationOutcome::AlreadyUsed => write!(f, "already_used"),
            VerificationOutcome::Invalid => write!(f, "invalid"),
            VerificationOutcome::NetworkError => write!(f, "network_error"),
        }
    }
}

/// Operator entry decision recorded in the recent scans list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryDecision {
    Allowed,
    Denied,
}

impl std::fmt::Display for EntryDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryDecision::Allowed => write!(f, "allowed"),
            EntryDecision::Denied => write!(f, "denied"),
        }
    }
}

/// Camera availability as reported to the operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CameraStatus {
    /// No stream requested yet, or the stream was released
    Stopped,
    /// Rear camera at the preferred resolution
    Active,
    /// Fallback camera in use
    Degraded { reason: String },
    /// No camera obtainable; manual entry only
    Unavailable { reason: String },
}

/// Nexus event types
///
/// Events are broadcast via EventBus and serialize with a `type` tag so a
/// front end can render them without knowing the Rust types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NexusEvent {
    /// Transient operator notification (toast)
    Notification {
        level: NotificationLevel,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Camera session changed availability
    CameraStatusChanged {
        status: CameraStatus,
        timestamp: DateTime<Utc>,
    },

    /// A verification result is awaiting an operator decision
    CandidatePresented {
        /// Correlates the presentation with the decision that closes it
        scan_id: Uuid,
        outcome: VerificationOutcome,
        ticket_id: Option<String>,
        attendee_name: Option<String>,
        title: String,
        message: String,
        /// Whether Allow/Deny are offered (only for `success`)
        entry_decision_available: bool,
        timestamp: DateTime<Utc>,
    },

    /// The candidate was closed and scanning resumed
    CandidateCleared {
        scan_id: Uuid,
        decision: Option<EntryDecision>,
        timestamp: DateTime<Utc>,
    },

    /// Session counters changed
    StatsUpdated {
        checked_in: u64,
        remaining: u64,
        capacity: u64,
        timestamp: DateTime<Utc>,
    },

    /// Recent scans list changed
    RecentScansUpdated {
        /// Rendered lines, most recent first
        entries: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// Backend reachability changed (offline indicator)
    ConnectivityChanged {
        online: bool,
        timestamp: DateTime<Utc>,
    },
}

/// Broadcast bus for NexusEvent
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<NexusEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before lagging subscribers drop old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<NexusEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: NexusEvent,
    ) -> Result<usize, broadcast::error::SendError<NexusEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: NexusEvent) {
        let _ = self.tx.send(event);
    }

    /// Convenience wrapper for a notification event
    pub fn notify(&self, level: NotificationLevel, message: impl Into<String>) {
        self.emit_lossy(NexusEvent::Notification {
            level,
            message: message.into(),
            timestamp: Utc::now(),
        });
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
