//! Test doubles for check-in integration tests
//!
//! `ScriptedApi` replays queued verify responses and records calls,
//! `FakeCamera` hands out a stream with ever-changing frames, and
//! `ScriptedDecoder` returns whatever payload the test puts in front of it.

#![allow(dead_code)]

use async_trait::async_trait;
use nexus_common::events::{EventBus, NexusEvent};
use nexus_scan::api::{
    DeniedEntry, FestCapacity, FestStats, RecentScanRecord, ScanApi, ScanCounts, Ticket,
    TicketStatus, VerifyResponse,
};
use nexus_scan::camera::{
    CameraBackend, Facing, MediaStream, MediaTrack, RasterFrame, StreamRequest,
};
use nexus_scan::config::ScannerSettings;
use nexus_scan::decoder::{InversionAttempts, QrDecoder};
use nexus_scan::{ApiError, CameraError, CheckInController};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

pub const FEST_ID: &str = "fest-001";

// ============================================================================
// Scripted API
// ============================================================================

pub struct ScriptedApi {
    verify_responses: Mutex<VecDeque<Result<VerifyResponse, ApiError>>>,
    verify_calls: AtomicUsize,
    verified_ids: Mutex<Vec<String>>,
    denied: Mutex<Vec<DeniedEntry>>,
    fail_denied_log: bool,
    stats: FestStats,
    recent: Vec<RecentScanRecord>,
    /// Stats answers consumed in order, each after its delay
    stats_script: Mutex<VecDeque<(Duration, FestStats)>>,
    offline: AtomicBool,
    reject_credential: AtomicBool,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self {
            verify_responses: Mutex::new(VecDeque::new()),
            verify_calls: AtomicUsize::new(0),
            verified_ids: Mutex::new(Vec::new()),
            denied: Mutex::new(Vec::new()),
            fail_denied_log: false,
            stats: FestStats {
                scans: ScanCounts { valid: 0 },
                fest: FestCapacity { capacity: 100 },
            },
            recent: Vec::new(),
            stats_script: Mutex::new(VecDeque::new()),
            offline: AtomicBool::new(false),
            reject_credential: AtomicBool::new(false),
        }
    }

    pub fn with_stats(mut self, checked_in: u64, capacity: u64) -> Self {
        self.stats = FestStats {
            scans: ScanCounts { valid: checked_in },
            fest: FestCapacity { capacity },
        };
        self
    }

    pub fn with_recent(mut self, records: Vec<RecentScanRecord>) -> Self {
        self.recent = records;
        self
    }

    pub fn failing_denied_log(mut self) -> Self {
        self.fail_denied_log = true;
        self
    }

    /// Queue the next stats answer, delivered after `delay`
    pub fn push_stats(&self, delay: Duration, checked_in: u64, capacity: u64) {
        self.stats_script.lock().unwrap().push_back((
            delay,
            FestStats {
                scans: ScanCounts { valid: checked_in },
                fest: FestCapacity { capacity },
            },
        ));
    }

    /// Stats and recent-scans calls fail with a network error while set
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Stats and recent-scans calls answer 401 while set
    pub fn set_reject_credential(&self, reject: bool) {
        self.reject_credential.store(reject, Ordering::SeqCst);
    }

    fn refresh_failure(&self) -> Option<ApiError> {
        if self.reject_credential.load(Ordering::SeqCst) {
            Some(ApiError::Unauthorized)
        } else if self.offline.load(Ordering::SeqCst) {
            Some(ApiError::Network("connection refused".to_string()))
        } else {
            None
        }
    }

    /// Queue the next verify answer
    pub fn push_verify(&self, response: Result<VerifyResponse, ApiError>) {
        self.verify_responses.lock().unwrap().push_back(response);
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    pub fn verified_ids(&self) -> Vec<String> {
        self.verified_ids.lock().unwrap().clone()
    }

    pub fn denied(&self) -> Vec<DeniedEntry> {
        self.denied.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScanApi for ScriptedApi {
    async fn verify_ticket(
        &self,
        ticket_id: &str,
        _fest_id: &str,
    ) -> Result<VerifyResponse, ApiError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        self.verified_ids.lock().unwrap().push(ticket_id.to_string());
        self.verify_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ApiError::Network("no scripted response".to_string())))
    }

    async fn log_denied_entry(&self, entry: &DeniedEntry) -> Result<(), ApiError> {
        self.denied.lock().unwrap().push(entry.clone());
        if self.fail_denied_log {
            Err(ApiError::Status(500, "Internal Server Error".to_string()))
        } else {
            Ok(())
        }
    }

    async fn fest_stats(&self, _fest_id: &str) -> Result<FestStats, ApiError> {
        if let Some(error) = self.refresh_failure() {
            return Err(error);
        }
        let scripted = self.stats_script.lock().unwrap().pop_front();
        match scripted {
            Some((delay, stats)) => {
                tokio::time::sleep(delay).await;
                Ok(stats)
            }
            None => Ok(self.stats),
        }
    }

    async fn recent_scans(&self, _fest_id: &str) -> Result<Vec<RecentScanRecord>, ApiError> {
        if let Some(error) = self.refresh_failure() {
            return Err(error);
        }
        Ok(self.recent.clone())
    }
}

// ============================================================================
// Verify responses
// ============================================================================

pub fn ticket(ticket_id: &str, name: &str, status: TicketStatus) -> Ticket {
    Ticket {
        ticket_id: ticket_id.to_string(),
        attendee_name: name.to_string(),
        ticket_type: Some("General".to_string()),
        status: Some(status),
        issued_at: None,
        used_at: None,
        fest_id: Some(FEST_ID.to_string()),
    }
}

pub fn valid_response(ticket_id: &str, name: &str) -> Result<VerifyResponse, ApiError> {
    Ok(VerifyResponse {
        success: true,
        valid: true,
        ticket: Some(ticket(ticket_id, name, TicketStatus::Valid)),
        error: None,
    })
}

pub fn used_response(ticket_id: &str, name: &str, used_at: &str) -> Result<VerifyResponse, ApiError> {
    let mut used = ticket(ticket_id, name, TicketStatus::AlreadyUsed);
    used.used_at = Some(used_at.to_string());
    Ok(VerifyResponse {
        success: true,
        valid: false,
        ticket: Some(used),
        error: None,
    })
}

pub fn rejected_response(error: &str) -> Result<VerifyResponse, ApiError> {
    Ok(VerifyResponse {
        success: false,
        valid: false,
        ticket: None,
        error: Some(error.to_string()),
    })
}

// ============================================================================
// Fake camera
// ============================================================================

/// Observable state of the fake video track
#[derive(Debug, Default)]
pub struct TrackState {
    pub enabled: bool,
    pub stopped: bool,
    pub torch: Option<bool>,
}

struct FakeTrack {
    state: Arc<Mutex<TrackState>>,
    torch_capable: bool,
    torch_broken: bool,
}

impl MediaTrack for FakeTrack {
    fn set_enabled(&mut self, enabled: bool) {
        self.state.lock().unwrap().enabled = enabled;
    }

    fn is_enabled(&self) -> bool {
        self.state.lock().unwrap().enabled
    }

    fn stop(&mut self) {
        self.state.lock().unwrap().stopped = true;
    }

    fn is_stopped(&self) -> bool {
        self.state.lock().unwrap().stopped
    }

    fn supports_torch(&self) -> bool {
        self.torch_capable
    }

    fn apply_torch(&mut self, on: bool) -> Result<(), CameraError> {
        if self.torch_broken {
            return Err(CameraError::Device("torch constraint rejected".to_string()));
        }
        self.state.lock().unwrap().torch = Some(on);
        Ok(())
    }
}

struct FakeStream {
    tracks: Vec<Box<dyn MediaTrack>>,
    sequence: u64,
}

impl MediaStream for FakeStream {
    fn tracks_mut(&mut self) -> &mut [Box<dyn MediaTrack>] {
        &mut self.tracks
    }

    fn latest_frame(&mut self) -> Option<RasterFrame> {
        self.sequence += 1;
        Some(RasterFrame {
            width: 4,
            height: 4,
            rgba: vec![255; 64],
            sequence: self.sequence,
        })
    }
}

/// Camera backend with configurable refusals
pub struct FakeCamera {
    pub track: Arc<Mutex<TrackState>>,
    refuse: Vec<Facing>,
    torch_capable: bool,
    torch_broken: bool,
}

impl FakeCamera {
    pub fn working() -> Self {
        Self {
            track: Arc::new(Mutex::new(TrackState::default())),
            refuse: Vec::new(),
            torch_capable: false,
            torch_broken: false,
        }
    }

    pub fn denied() -> Self {
        Self {
            refuse: vec![Facing::Environment, Facing::Any],
            ..Self::working()
        }
    }

    pub fn front_only() -> Self {
        Self {
            refuse: vec![Facing::Environment],
            ..Self::working()
        }
    }

    pub fn with_torch(mut self) -> Self {
        self.torch_capable = true;
        self
    }

    /// Torch advertised but every constraint change fails
    pub fn with_broken_torch(mut self) -> Self {
        self.torch_capable = true;
        self.torch_broken = true;
        self
    }
}

impl CameraBackend for FakeCamera {
    fn open(&mut self, request: &StreamRequest) -> Result<Box<dyn MediaStream>, CameraError> {
        if self.refuse.contains(&request.facing) {
            return Err(CameraError::PermissionDenied);
        }
        {
            let mut state = self.track.lock().unwrap();
            state.enabled = true;
            state.stopped = false;
        }
        Ok(Box::new(FakeStream {
            tracks: vec![Box::new(FakeTrack {
                state: self.track.clone(),
                torch_capable: self.torch_capable,
                torch_broken: self.torch_broken,
            })],
            sequence: 0,
        }))
    }
}

// ============================================================================
// Scripted decoder
// ============================================================================

/// Decoder returning the payload currently "in front of the camera"
pub struct ScriptedDecoder {
    payload: Arc<Mutex<Option<String>>>,
}

/// Handle for changing what the decoder sees
#[derive(Clone)]
pub struct DecoderHandle(Arc<Mutex<Option<String>>>);

impl DecoderHandle {
    pub fn show(&self, payload: &str) {
        *self.0.lock().unwrap() = Some(payload.to_string());
    }

    pub fn clear(&self) {
        *self.0.lock().unwrap() = None;
    }
}

pub fn scripted_decoder() -> (ScriptedDecoder, DecoderHandle) {
    let payload = Arc::new(Mutex::new(None));
    (
        ScriptedDecoder {
            payload: payload.clone(),
        },
        DecoderHandle(payload),
    )
}

impl QrDecoder for ScriptedDecoder {
    fn decode(&self, _frame: &RasterFrame, _inversion: InversionAttempts) -> Option<String> {
        self.payload.lock().unwrap().clone()
    }
}

// ============================================================================
// Controller fixtures
// ============================================================================

/// Controller without a camera (manual entry only)
pub fn manual_controller(api: Arc<ScriptedApi>) -> (CheckInController, broadcast::Receiver<NexusEvent>) {
    let events = EventBus::new(256);
    let rx = events.subscribe();
    let controller = CheckInController::new(FEST_ID, api, ScannerSettings::default(), events);
    (controller, rx)
}

/// Controller with a fake camera and scripted decoder
pub fn camera_controller(
    api: Arc<ScriptedApi>,
    camera: FakeCamera,
) -> (CheckInController, DecoderHandle, broadcast::Receiver<NexusEvent>) {
    let (decoder, handle) = scripted_decoder();
    let (controller, rx) = manual_controller(api);
    (
        controller.with_camera(Box::new(camera), Box::new(decoder)),
        handle,
        rx,
    )
}

/// Drain every event received so far
pub fn drain(rx: &mut broadcast::Receiver<NexusEvent>) -> Vec<NexusEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Notification texts among `events`
pub fn notifications(events: &[NexusEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            NexusEvent::Notification { message, .. } => Some(message.clone()),
            _ => None,
        })
        .collect()
}
