//! Ticket check-in controller
//!
//! Owns the whole scanner session: camera, scan loop, duplicate
//! suppression, check-in state machine and stats. Nothing here is global;
//! one controller is one session.
//!
//! Ordering guarantee: the scan loop is suspended from the moment a payload
//! is submitted until the operator closes the resulting candidate, so at
//! most one ticket is in verification or awaiting a decision.
//!
//! Background refreshes carry a sequence number. A snapshot older than one
//! already applied is dropped, so a slow response never rolls counters back.

use crate::api::{DeniedEntry, FestStats, RecentScanRecord, ScanApi};
use crate::error::ApiError;
use crate::camera::{CameraBackend, CameraSession, TorchState};
use crate::checkin::{Candidate, CheckInMachine, CheckInState, OperatorAction, ScanSource};
use crate::config::ScannerSettings;
use crate::decoder::{QrDecoder, RqrrDecoder};
use crate::dedup::DuplicateSuppressionSet;
use crate::error::{ScanError, ScanResult};
use crate::scan_loop::{ScanLoop, SuspendReason, TickOutcome};
use crate::stats::{RecentScanLog, SessionCounters, StatsCache};
use crate::verification::VerificationPipeline;
use chrono::Utc;
use nexus_common::events::{
    CameraStatus, EntryDecision, EventBus, NexusEvent, NotificationLevel, VerificationOutcome,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Operator input delivered to [`CheckInController::run`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    Allow,
    Deny,
    Dismiss,
    OpenManualEntry,
    CloseManualEntry,
    SubmitManual(String),
    ToggleTorch,
    SetPageVisible(bool),
    RefreshStats,
    Shutdown,
}

/// Results of background refreshes, applied on the controller's own task
#[derive(Debug)]
enum BackgroundUpdate {
    Stats { seq: u64, stats: FestStats },
    RecentScans { seq: u64, records: Vec<RecentScanRecord> },
    /// Whether the backend answered the last refresh at all
    Connectivity(bool),
    /// The backend rejected the bearer credential
    AuthRejected,
}

const FALLBACK_NAME: &str = "Guest";

pub struct CheckInController {
    fest_id: String,
    api: Arc<dyn ScanApi>,
    pipeline: VerificationPipeline,
    events: EventBus,
    camera: Option<CameraSession>,
    decoder: Option<Box<dyn QrDecoder>>,
    settings: ScannerSettings,
    scan_loop: ScanLoop,
    dedup: DuplicateSuppressionSet,
    machine: CheckInMachine,
    stats: StatsCache,
    updates_tx: mpsc::UnboundedSender<BackgroundUpdate>,
    updates_rx: mpsc::UnboundedReceiver<BackgroundUpdate>,
    verifications: u64,
    refresh_seq: u64,
    applied_stats_seq: u64,
    applied_recent_seq: u64,
    /// Refresh spawned right after the current candidate was verified
    candidate_refresh_seq: Option<u64>,
    backend_online: Option<bool>,
    session_ended: bool,
}

impl CheckInController {
    pub fn new(
        fest_id: impl Into<String>,
        api: Arc<dyn ScanApi>,
        settings: ScannerSettings,
        events: EventBus,
    ) -> Self {
        let fest_id = fest_id.into();
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();

        let mut scan_loop = ScanLoop::new(settings.scan_interval);
        // Until a camera stream is acquired
        scan_loop.suspend(SuspendReason::CameraUnavailable);

        Self {
            pipeline: VerificationPipeline::new(api.clone(), settings.retry),
            dedup: DuplicateSuppressionSet::new(settings.duplicate_cooldown),
            stats: StatsCache::new(fest_id.clone(), settings.recent_scans_capacity),
            fest_id,
            api,
            events,
            camera: None,
            decoder: None,
            settings,
            scan_loop,
            machine: CheckInMachine::new(),
            updates_tx,
            updates_rx,
            verifications: 0,
            refresh_seq: 0,
            applied_stats_seq: 0,
            applied_recent_seq: 0,
            candidate_refresh_seq: None,
            backend_online: None,
            session_ended: false,
        }
    }

    /// Attach a camera backend and the decoder used on its frames
    pub fn with_camera(mut self, backend: Box<dyn CameraBackend>, decoder: Box<dyn QrDecoder>) -> Self {
        self.camera = Some(CameraSession::new(
            backend,
            self.settings.preferred_width,
            self.settings.preferred_height,
        ));
        self.decoder = Some(decoder);
        self
    }

    /// Attach a camera backend decoded with [`RqrrDecoder`]
    pub fn with_camera_backend(self, backend: Box<dyn CameraBackend>) -> Self {
        self.with_camera(backend, Box::new(RqrrDecoder::new()))
    }

    /// Persist counters to (and restore them from) `path`
    pub fn with_stats_cache_file(mut self, path: PathBuf) -> Self {
        self.stats = StatsCache::new(self.fest_id.clone(), self.settings.recent_scans_capacity)
            .with_cache_file(path);
        self
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn fest_id(&self) -> &str {
        &self.fest_id
    }

    pub fn state(&self) -> &CheckInState {
        self.machine.state()
    }

    pub fn candidate(&self) -> Option<&Candidate> {
        self.machine.candidate()
    }

    pub fn available_actions(&self) -> &'static [OperatorAction] {
        self.machine.available_actions()
    }

    pub fn scan_loop(&self) -> &ScanLoop {
        &self.scan_loop
    }

    pub fn is_scan_loop_active(&self) -> bool {
        self.scan_loop.is_active()
    }

    pub fn counters(&self) -> SessionCounters {
        self.stats.counters()
    }

    pub fn recent_scans(&self) -> &RecentScanLog {
        self.stats.recent()
    }

    pub fn camera_status(&self) -> CameraStatus {
        self.camera
            .as_ref()
            .map(|camera| camera.status().clone())
            .unwrap_or_else(|| CameraStatus::Unavailable {
                reason: "No camera backend configured".to_string(),
            })
    }

    /// Number of verification cycles started
    pub fn verification_count(&self) -> u64 {
        self.verifications
    }

    /// Backend reachability from the last refresh; `None` before the first
    pub fn backend_online(&self) -> Option<bool> {
        self.backend_online
    }

    /// True once the backend rejected the credential
    pub fn is_session_ended(&self) -> bool {
        self.session_ended
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Acquire the camera, publish cached counters, and fetch fresh stats
    pub fn start(&mut self) {
        info!(fest_id = %self.fest_id, "Starting check-in session");

        let status = match self.camera.as_mut() {
            Some(camera) => camera.start().clone(),
            None => self.camera_status(),
        };
        self.apply_camera_status(status);

        self.events.emit_lossy(self.stats.counters().to_event());
        self.events.emit_lossy(self.stats.recent().to_event());
        self.spawn_refresh();
    }

    fn apply_camera_status(&mut self, status: CameraStatus) {
        match &status {
            CameraStatus::Active => {
                self.scan_loop.resume(SuspendReason::CameraUnavailable);
            }
            CameraStatus::Degraded { reason } => {
                warn!(reason = %reason, "Scanning with fallback camera");
                self.scan_loop.resume(SuspendReason::CameraUnavailable);
                self.events.notify(
                    NotificationLevel::Info,
                    "Rear camera unavailable. Using another camera.",
                );
            }
            CameraStatus::Unavailable { .. } | CameraStatus::Stopped => {
                self.scan_loop.suspend(SuspendReason::CameraUnavailable);
                self.events
                    .notify(NotificationLevel::Error, "Camera access denied. Use manual entry.");
            }
        }
        self.events.emit_lossy(NexusEvent::CameraStatusChanged {
            status,
            timestamp: Utc::now(),
        });
    }

    /// Release the camera and flush counters
    pub fn shutdown(&mut self) {
        if let Some(camera) = self.camera.as_mut() {
            camera.stop();
        }
        self.scan_loop.suspend(SuspendReason::CameraUnavailable);
        if let Err(e) = self.stats.persist() {
            warn!("Failed to persist session counters: {}", e);
        }
        info!(fest_id = %self.fest_id, verifications = self.verifications, "Check-in session closed");
    }

    // ------------------------------------------------------------------
    // Scanning
    // ------------------------------------------------------------------

    /// One scan-loop tick; verifies and presents a newly decoded payload
    pub async fn tick(&mut self) -> TickOutcome {
        self.apply_background_updates();

        let outcome = {
            let (Some(camera), Some(decoder)) = (self.camera.as_mut(), self.decoder.as_deref())
            else {
                return TickOutcome::Suspended;
            };
            self.scan_loop
                .tick(camera, decoder, &mut self.dedup, Instant::now())
        };

        if let TickOutcome::Submitted(payload) = &outcome {
            match self.verify_and_present(payload.clone(), ScanSource::Camera).await {
                Ok(_) | Err(ScanError::Unauthenticated) => {}
                Err(e) => warn!(error = %e, "Decoded payload could not start a verification"),
            }
        }
        outcome
    }

    /// Manual ticket entry, bypassing the camera and duplicate suppression
    ///
    /// Input is trimmed and upper-cased. Empty input keeps the manual entry
    /// modal open.
    pub async fn submit_manual(&mut self, input: &str) -> ScanResult<VerificationOutcome> {
        let ticket_id = input.trim().to_uppercase();
        if ticket_id.is_empty() {
            self.events
                .notify(NotificationLevel::Error, ScanError::EmptyManualEntry.to_string());
            return Err(ScanError::EmptyManualEntry);
        }

        self.close_manual_entry();
        self.verify_and_present(ticket_id, ScanSource::Manual).await
    }

    pub fn open_manual_entry(&mut self) {
        self.scan_loop.suspend(SuspendReason::ManualEntry);
    }

    pub fn close_manual_entry(&mut self) {
        self.scan_loop.resume(SuspendReason::ManualEntry);
    }

    async fn verify_and_present(
        &mut self,
        raw_payload: String,
        source: ScanSource,
    ) -> ScanResult<VerificationOutcome> {
        if self.session_ended {
            return Err(ScanError::Unauthenticated);
        }
        let scan_id = self.machine.begin_verification(raw_payload.clone(), source)?;
        self.scan_loop.suspend(SuspendReason::Candidate);
        self.verifications += 1;
        debug!(%scan_id, ?source, "Verification started");

        let verified = self.pipeline.verify(&raw_payload, &self.fest_id).await;
        let verification = match verified {
            Ok(verification) => verification,
            Err(e) => {
                self.machine.abort_verification();
                self.scan_loop.resume(SuspendReason::Candidate);
                if matches!(e, ScanError::Unauthenticated) {
                    self.end_session();
                }
                return Err(e);
            }
        };
        let candidate = self.machine.present(verification.classification)?;
        let classification = &candidate.classification;
        let outcome = classification.outcome();

        self.events.emit_lossy(NexusEvent::CandidatePresented {
            scan_id,
            outcome,
            ticket_id: classification.ticket_id().map(str::to_string),
            attendee_name: classification.attendee_name().map(str::to_string),
            title: classification.title().to_string(),
            message: classification.message(),
            entry_decision_available: classification.allows_entry_decision(),
            timestamp: Utc::now(),
        });

        self.candidate_refresh_seq = Some(self.spawn_refresh());
        Ok(outcome)
    }

    /// The backend rejected the credential: stop scanning for good
    fn end_session(&mut self) {
        if self.session_ended {
            return;
        }
        self.session_ended = true;
        let signed_out = ScanError::Unauthenticated;
        error!(
            fest_id = %self.fest_id,
            redirect = signed_out.redirect_target().unwrap_or_default(),
            "Credential rejected by the backend; ending session"
        );
        self.machine.abort_verification();
        self.scan_loop.suspend(SuspendReason::SignedOut);
        self.events
            .notify(NotificationLevel::Error, "Session expired. Please log in again.");
    }

    // ------------------------------------------------------------------
    // Operator decisions
    // ------------------------------------------------------------------

    /// Admit the candidate; the backend already marked the ticket used
    pub fn allow(&mut self) -> ScanResult<()> {
        let candidate = self.machine.allow()?;
        let name = display_name(&candidate);
        let applied = self.applied_stats_seq;
        let already_counted = self
            .candidate_refresh_seq
            .take()
            .is_some_and(|seq| applied >= seq);

        self.record_decision(&candidate, EntryDecision::Allowed, &name, already_counted);
        self.events.notify(
            NotificationLevel::Success,
            format!("✓ {} checked in successfully", name),
        );
        self.finish_cycle(&candidate, Some(EntryDecision::Allowed));
        self.spawn_refresh();
        Ok(())
    }

    /// Refuse the candidate and report it for audit (best effort)
    pub fn deny(&mut self) -> ScanResult<()> {
        let candidate = self.machine.deny()?;
        let name = display_name(&candidate);
        self.candidate_refresh_seq = None;

        let entry = DeniedEntry {
            ticket_id: candidate
                .classification
                .ticket_id()
                .unwrap_or(&candidate.raw_payload)
                .to_string(),
            fest_id: self.fest_id.clone(),
            attendee_name: name.clone(),
        };
        let api = self.api.clone();
        tokio::spawn(async move {
            if let Err(e) = api.log_denied_entry(&entry).await {
                warn!(ticket_id = %entry.ticket_id, error = %e, "Denied-entry audit log failed");
            }
        });

        self.record_decision(&candidate, EntryDecision::Denied, &name, false);
        self.events
            .notify(NotificationLevel::Error, format!("✗ Entry denied for {}", name));
        self.finish_cycle(&candidate, Some(EntryDecision::Denied));
        Ok(())
    }

    /// Close a non-admissible candidate without a log entry
    pub fn dismiss(&mut self) -> ScanResult<()> {
        let candidate = self.machine.dismiss()?;
        self.candidate_refresh_seq = None;
        self.finish_cycle(&candidate, None);
        Ok(())
    }

    fn record_decision(
        &mut self,
        candidate: &Candidate,
        decision: EntryDecision,
        name: &str,
        already_counted: bool,
    ) {
        self.stats.record_decision(
            decision,
            name,
            candidate.classification.ticket_id().map(str::to_string),
            already_counted,
        );
        if let Err(e) = self.stats.persist() {
            warn!("Failed to persist session counters: {}", e);
        }
        info!(
            ticket_id = ?candidate.classification.ticket_id(),
            decision = %decision,
            "Entry decision recorded"
        );
        self.events.emit_lossy(self.stats.recent().to_event());
        self.events.emit_lossy(self.stats.counters().to_event());
    }

    fn finish_cycle(&mut self, candidate: &Candidate, decision: Option<EntryDecision>) {
        self.events.emit_lossy(NexusEvent::CandidateCleared {
            scan_id: candidate.scan_id,
            decision,
            timestamp: Utc::now(),
        });
        self.scan_loop.resume(SuspendReason::Candidate);
    }

    // ------------------------------------------------------------------
    // Device and page events
    // ------------------------------------------------------------------

    pub fn toggle_torch(&mut self) -> ScanResult<TorchState> {
        let Some(camera) = self.camera.as_mut() else {
            return Ok(TorchState::Inactive);
        };
        match camera.toggle_torch() {
            Ok(TorchState::Unsupported) => {
                self.events
                    .notify(NotificationLevel::Error, "Flashlight not supported on this device");
                Ok(TorchState::Unsupported)
            }
            Ok(state) => Ok(state),
            Err(e) => {
                warn!(error = %e, "Flashlight toggle failed");
                self.events
                    .notify(NotificationLevel::Error, "Unable to toggle flashlight");
                Err(e.into())
            }
        }
    }

    /// Page visibility: hidden disables camera tracks and pauses scanning
    pub fn set_page_visible(&mut self, visible: bool) {
        if let Some(camera) = self.camera.as_mut() {
            camera.set_visible(visible);
        }
        if visible {
            self.scan_loop.resume(SuspendReason::PageHidden);
        } else {
            self.scan_loop.suspend(SuspendReason::PageHidden);
        }
    }

    // ------------------------------------------------------------------
    // Stats refresh
    // ------------------------------------------------------------------

    /// Fetch stats and recent scans in the background
    ///
    /// Results are applied by [`Self::apply_background_updates`] or the run
    /// loop. Returns the sequence number the results are tagged with.
    pub fn spawn_refresh(&mut self) -> u64 {
        self.refresh_seq += 1;
        let seq = self.refresh_seq;
        let api = self.api.clone();
        let fest_id = self.fest_id.clone();
        let tx = self.updates_tx.clone();

        tokio::spawn(async move {
            let (stats, recent) = tokio::join!(api.fest_stats(&fest_id), api.recent_scans(&fest_id));
            let unreachable = matches!(stats, Err(ApiError::Network(_)))
                || matches!(recent, Err(ApiError::Network(_)));
            let rejected = matches!(stats, Err(ApiError::Unauthorized))
                || matches!(recent, Err(ApiError::Unauthorized));

            match stats {
                Ok(stats) => {
                    let _ = tx.send(BackgroundUpdate::Stats { seq, stats });
                }
                Err(e) => debug!(fest_id = %fest_id, seq, error = %e, "Stats refresh failed"),
            }
            match recent {
                Ok(records) => {
                    let _ = tx.send(BackgroundUpdate::RecentScans { seq, records });
                }
                Err(e) => debug!(fest_id = %fest_id, seq, error = %e, "Recent scans refresh failed"),
            }
            let _ = tx.send(BackgroundUpdate::Connectivity(!unreachable));
            if rejected {
                let _ = tx.send(BackgroundUpdate::AuthRejected);
            }
        });
        seq
    }

    /// Apply every background refresh result received so far
    pub fn apply_background_updates(&mut self) {
        while let Ok(update) = self.updates_rx.try_recv() {
            self.apply_update(update);
        }
    }

    fn apply_update(&mut self, update: BackgroundUpdate) {
        match update {
            BackgroundUpdate::Stats { seq, stats } => {
                if seq <= self.applied_stats_seq {
                    debug!(seq, applied = self.applied_stats_seq, "Dropping stale stats snapshot");
                    return;
                }
                self.applied_stats_seq = seq;
                self.stats.apply_remote_stats(stats);
                if let Err(e) = self.stats.persist() {
                    warn!("Failed to persist session counters: {}", e);
                }
                self.events.emit_lossy(self.stats.counters().to_event());
            }
            BackgroundUpdate::RecentScans { seq, records } => {
                if seq <= self.applied_recent_seq {
                    debug!(seq, applied = self.applied_recent_seq, "Dropping stale recent scans");
                    return;
                }
                self.applied_recent_seq = seq;
                self.stats.apply_remote_recent(records);
                self.events.emit_lossy(self.stats.recent().to_event());
            }
            BackgroundUpdate::Connectivity(online) => self.set_backend_online(online),
            BackgroundUpdate::AuthRejected => self.end_session(),
        }
    }

    fn set_backend_online(&mut self, online: bool) {
        let previous = self.backend_online.replace(online);
        if previous == Some(online) {
            return;
        }
        info!(online, "Backend reachability changed");
        self.events.emit_lossy(NexusEvent::ConnectivityChanged {
            online,
            timestamp: Utc::now(),
        });
        if !online {
            self.events.notify(
                NotificationLevel::Error,
                "You are offline. Check-ins need a connection.",
            );
        } else if previous == Some(false) {
            self.events.notify(NotificationLevel::Success, "Back online");
        }
    }

    // ------------------------------------------------------------------
    // Run loop
    // ------------------------------------------------------------------

    /// Drive the session until `Shutdown` or the command channel closes
    ///
    /// Returns [`ScanError::Unauthenticated`] when the backend rejected the
    /// credential mid-session; the caller redirects to the login page.
    pub async fn run(mut self, mut commands: mpsc::Receiver<OperatorCommand>) -> ScanResult<()> {
        let mut interval = tokio::time::interval(self.scan_loop.cadence());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let period = self.settings.status_check_interval;
        let mut status_check = tokio::time::interval_at(Instant::now() + period, period);
        status_check.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result = loop {
            if self.session_ended {
                break Err(ScanError::Unauthenticated);
            }
            let scanning = self.scan_loop.is_active() && self.camera.is_some();

            tokio::select! {
                _ = interval.tick(), if scanning => {
                    self.tick().await;
                }
                _ = status_check.tick() => {
                    self.spawn_refresh();
                }
                Some(update) = self.updates_rx.recv() => {
                    self.apply_update(update);
                }
                command = commands.recv() => match command {
                    Some(OperatorCommand::Shutdown) | None => break Ok(()),
                    Some(command) => self.handle_command(command).await,
                },
            }
        };

        self.shutdown();
        result
    }

    async fn handle_command(&mut self, command: OperatorCommand) {
        debug!(?command, "Operator command");
        let result = match command {
            OperatorCommand::Allow => self.allow(),
            OperatorCommand::Deny => self.deny(),
            OperatorCommand::Dismiss => self.dismiss(),
            OperatorCommand::OpenManualEntry => {
                self.open_manual_entry();
                Ok(())
            }
            OperatorCommand::CloseManualEntry => {
                self.close_manual_entry();
                Ok(())
            }
            OperatorCommand::SubmitManual(input) => self.submit_manual(&input).await.map(|_| ()),
            OperatorCommand::ToggleTorch => self.toggle_torch().map(|_| ()),
            OperatorCommand::SetPageVisible(visible) => {
                self.set_page_visible(visible);
                Ok(())
            }
            OperatorCommand::RefreshStats => {
                self.spawn_refresh();
                Ok(())
            }
            OperatorCommand::Shutdown => Ok(()),
        };

        match result {
            Ok(()) | Err(ScanError::EmptyManualEntry) | Err(ScanError::Unauthenticated) => {}
            Err(e @ ScanError::InvalidTransition { .. }) => {
                warn!(error = %e, "Operator action rejected");
                self.events.notify(NotificationLevel::Error, e.to_string());
            }
            Err(e) => warn!(error = %e, "Operator command failed"),
        }
    }
}

fn display_name(candidate: &Candidate) -> String {
    candidate
        .classification
        .attendee_name()
        .unwrap_or(FALLBACK_NAME)
        .to_string()
}
