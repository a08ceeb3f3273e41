//! Check-in state machine
//!
//! ```text
//! Scanning ──begin──▶ Verifying ──present──▶ Presented(outcome)
//!     ▲                                          │
//!     └──────── allow | deny | dismiss ──────────┘
//! ```
//!
//! At most one candidate exists at a time. Allow/Deny are only offered for a
//! successful verification; every other outcome can only be dismissed.

use crate::error::{ScanError, ScanResult};
use crate::verification::Classification;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Where a payload came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanSource {
    Camera,
    Manual,
}

/// Operator action on a presented candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorAction {
    Allow,
    Deny,
    Dismiss,
}

impl OperatorAction {
    fn name(self) -> &'static str {
        match self {
            OperatorAction::Allow => "allow",
            OperatorAction::Deny => "deny",
            OperatorAction::Dismiss => "dismiss",
        }
    }
}

const ENTRY_ACTIONS: &[OperatorAction] = &[OperatorAction::Allow, OperatorAction::Deny];
const DISMISS_ONLY: &[OperatorAction] = &[OperatorAction::Dismiss];

/// The ticket currently awaiting a decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub scan_id: Uuid,
    pub raw_payload: String,
    pub source: ScanSource,
    pub classification: Classification,
    pub presented_at: DateTime<Utc>,
}

/// Check-in state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckInState {
    Scanning,
    Verifying {
        scan_id: Uuid,
        raw_payload: String,
        source: ScanSource,
    },
    Presented(Candidate),
}

impl CheckInState {
    pub fn name(&self) -> &'static str {
        match self {
            CheckInState::Scanning => "scanning",
            CheckInState::Verifying { .. } => "verifying",
            CheckInState::Presented(_) => "presented",
        }
    }
}

/// Owner of the single in-flight candidate
#[derive(Debug)]
pub struct CheckInMachine {
    state: CheckInState,
}

impl Default for CheckInMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl CheckInMachine {
    pub fn new() -> Self {
        Self {
            state: CheckInState::Scanning,
        }
    }

    pub fn state(&self) -> &CheckInState {
        &self.state
    }

    pub fn is_scanning(&self) -> bool {
        matches!(self.state, CheckInState::Scanning)
    }

    pub fn candidate(&self) -> Option<&Candidate> {
        match &self.state {
            CheckInState::Presented(candidate) => Some(candidate),
            _ => None,
        }
    }

    /// Actions the operator may take right now
    pub fn available_actions(&self) -> &'static [OperatorAction] {
        match &self.state {
            CheckInState::Presented(c) if c.classification.allows_entry_decision() => ENTRY_ACTIONS,
            CheckInState::Presented(_) => DISMISS_ONLY,
            _ => &[],
        }
    }

    /// Scanning → Verifying
    pub fn begin_verification(
        &mut self,
        raw_payload: impl Into<String>,
        source: ScanSource,
    ) -> ScanResult<Uuid> {
        if !self.is_scanning() {
            return Err(ScanError::InvalidTransition {
                action: "verify",
                state: self.state.name(),
            });
        }
        let scan_id = Uuid::new_v4();
        self.state = CheckInState::Verifying {
            scan_id,
            raw_payload: raw_payload.into(),
            source,
        };
        Ok(scan_id)
    }

    /// Verifying → Presented
    pub fn present(&mut self, classification: Classification) -> ScanResult<&Candidate> {
        if !matches!(self.state, CheckInState::Verifying { .. }) {
            return Err(ScanError::InvalidTransition {
                action: "present",
                state: self.state.name(),
            });
        }

        if let CheckInState::Verifying {
            scan_id,
            raw_payload,
            source,
        } = std::mem::replace(&mut self.state, CheckInState::Scanning)
        {
            self.state = CheckInState::Presented(Candidate {
                scan_id,
                raw_payload,
                source,
                classification,
                presented_at: Utc::now(),
            });
        }

        self.candidate().ok_or(ScanError::InvalidTransition {
            action: "present",
            state: "scanning",
        })
    }

    /// Verifying → Scanning without a candidate (verification never answered)
    pub fn abort_verification(&mut self) -> Option<Uuid> {
        match self.state {
            CheckInState::Verifying { scan_id, .. } => {
                self.state = CheckInState::Scanning;
                Some(scan_id)
            }
            _ => None,
        }
    }

    pub fn allow(&mut self) -> ScanResult<Candidate> {
        self.close(OperatorAction::Allow)
    }

    pub fn deny(&mut self) -> ScanResult<Candidate> {
        self.close(OperatorAction::Deny)
    }

    pub fn dismiss(&mut self) -> ScanResult<Candidate> {
        self.close(OperatorAction::Dismiss)
    }

    /// Presented → Scanning, if `action` is offered
    fn close(&mut self, action: OperatorAction) -> ScanResult<Candidate> {
        let rejected = ScanError::InvalidTransition {
            action: action.name(),
            state: self.state.name(),
        };
        if !self.available_actions().contains(&action) {
            return Err(rejected);
        }
        match std::mem::replace(&mut self.state, CheckInState::Scanning) {
            CheckInState::Presented(candidate) => Ok(candidate),
            other => {
                self.state = other;
                Err(rejected)
            }
        }
    }
}
