//! Frame sampling loop
//!
//! The loop is driven by an external timer at a fixed cadence; each call to
//! [`ScanLoop::tick`] is one synchronous capture-and-decode step. Suspension
//! is explicit: the loop runs only while no [`SuspendReason`] is held.

use crate::camera::CameraSession;
use crate::decoder::{InversionAttempts, QrDecoder};
use crate::dedup::DuplicateSuppressionSet;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Why the loop is not sampling frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SuspendReason {
    /// A payload is being verified or awaits an operator decision
    Candidate,
    /// The manual entry modal is open
    ManualEntry,
    /// The page/window is in the background
    PageHidden,
    /// No camera stream
    CameraUnavailable,
    /// The backend rejected the credential; the session is over
    SignedOut,
}

/// Result of one tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Loop is suspended; nothing sampled
    Suspended,
    /// No new frame since the previous tick
    NoFrame,
    /// Frame sampled, no readable code
    NoCode,
    /// Code read but still inside the cool-down window
    Duplicate(String),
    /// New payload handed on; the loop is now suspended for [`SuspendReason::Candidate`]
    Submitted(String),
}

/// Scan loop state
#[derive(Debug)]
pub struct ScanLoop {
    cadence: Duration,
    suspensions: BTreeSet<SuspendReason>,
    last_sequence: Option<u64>,
    frames_sampled: u64,
}

impl ScanLoop {
    pub fn new(cadence: Duration) -> Self {
        Self {
            cadence,
            suspensions: BTreeSet::new(),
            last_sequence: None,
            frames_sampled: 0,
        }
    }

    pub fn cadence(&self) -> Duration {
        self.cadence
    }

    pub fn is_active(&self) -> bool {
        self.suspensions.is_empty()
    }

    pub fn is_suspended_for(&self, reason: SuspendReason) -> bool {
        self.suspensions.contains(&reason)
    }

    pub fn frames_sampled(&self) -> u64 {
        self.frames_sampled
    }

    pub fn suspend(&mut self, reason: SuspendReason) {
        if self.suspensions.insert(reason) {
            debug!(?reason, "Scan loop suspended");
        }
    }

    /// Release one suspension; returns `true` if the loop became active
    pub fn resume(&mut self, reason: SuspendReason) -> bool {
        if self.suspensions.remove(&reason) {
            debug!(?reason, remaining = ?self.suspensions, "Scan loop suspension released");
            return self.is_active();
        }
        false
    }

    /// Sample one frame and try to decode it
    pub fn tick(
        &mut self,
        camera: &mut CameraSession,
        decoder: &dyn QrDecoder,
        dedup: &mut DuplicateSuppressionSet,
        now: Instant,
    ) -> TickOutcome {
        if !self.is_active() {
            return TickOutcome::Suspended;
        }

        let Some(frame) = camera.capture_frame() else {
            return TickOutcome::NoFrame;
        };
        if self.last_sequence == Some(frame.sequence) {
            return TickOutcome::NoFrame;
        }
        self.last_sequence = Some(frame.sequence);
        self.frames_sampled += 1;

        let Some(payload) = decoder.decode(&frame, InversionAttempts::AttemptBoth) else {
            trace!(sequence = frame.sequence, "No QR code in frame");
            return TickOutcome::NoCode;
        };

        if !dedup.admit(&payload, now) {
            trace!(payload = %payload, "Duplicate scan suppressed");
            return TickOutcome::Duplicate(payload);
        }

        self.suspend(SuspendReason::Candidate);
        debug!(payload = %payload, "QR payload submitted for verification");
        TickOutcome::Submitted(payload)
    }
}
