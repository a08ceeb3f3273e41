//! Camera session management
//!
//! [`CameraSession`] is the only owner of the media stream and its tracks.
//! Device access goes through [`CameraBackend`] so the session logic does
//! not depend on a particular capture stack.

use crate::error::CameraError;
use nexus_common::events::CameraStatus;
use tracing::{debug, error, info, warn};

/// Which camera to ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facing {
    /// Rear-facing ("environment") camera
    Environment,
    /// Whatever the device offers
    Any,
}

/// Stream constraints passed to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamRequest {
    pub facing: Facing,
    /// Preferred (ideal, not mandatory) resolution
    pub ideal_width: Option<u32>,
    pub ideal_height: Option<u32>,
}

impl StreamRequest {
    pub fn rear(width: u32, height: u32) -> Self {
        Self {
            facing: Facing::Environment,
            ideal_width: Some(width),
            ideal_height: Some(height),
        }
    }

    pub fn any() -> Self {
        Self {
            facing: Facing::Any,
            ideal_width: None,
            ideal_height: None,
        }
    }
}

/// One captured video frame as an RGBA raster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterFrame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
    /// Monotonic frame counter from the stream; equal numbers mean the same frame
    pub sequence: u64,
}

/// A single media track (video, or audio on combined streams)
pub trait MediaTrack: Send {
    fn set_enabled(&mut self, enabled: bool);
    fn is_enabled(&self) -> bool;
    /// Release the underlying device; a stopped track cannot be restarted
    fn stop(&mut self);
    fn is_stopped(&self) -> bool;
    fn supports_torch(&self) -> bool;
    fn apply_torch(&mut self, on: bool) -> Result<(), CameraError>;
}

/// A live stream returned by the backend
pub trait MediaStream: Send {
    /// All tracks; the first one is the video track
    fn tracks_mut(&mut self) -> &mut [Box<dyn MediaTrack>];

    /// Latest frame if one is ready, `None` while the stream is still warming up
    fn latest_frame(&mut self) -> Option<RasterFrame>;
}

/// Device access layer
pub trait CameraBackend: Send {
    fn open(&mut self, request: &StreamRequest) -> Result<Box<dyn MediaStream>, CameraError>;
}

/// Result of a torch toggle request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TorchState {
    On,
    Off,
    Unsupported,
    /// No active stream
    Inactive,
}

/// Camera session: acquire, release, torch and visibility handling
pub struct CameraSession {
    backend: Box<dyn CameraBackend>,
    stream: Option<Box<dyn MediaStream>>,
    status: CameraStatus,
    torch_on: bool,
    preferred: (u32, u32),
}

impl CameraSession {
    pub fn new(backend: Box<dyn CameraBackend>, preferred_width: u32, preferred_height: u32) -> Self {
        Self {
            backend,
            stream: None,
            status: CameraStatus::Stopped,
            torch_on: false,
            preferred: (preferred_width, preferred_height),
        }
    }

    pub fn status(&self) -> &CameraStatus {
        &self.status
    }

    pub fn is_streaming(&self) -> bool {
        self.stream.is_some()
    }

    /// Request the rear camera, falling back to any camera
    ///
    /// A previous stream is released first.
    pub fn start(&mut self) -> &CameraStatus {
        self.stop();

        let (width, height) = self.preferred;
        let rear = StreamRequest::rear(width, height);

        self.status = match self.backend.open(&rear) {
            Ok(stream) => {
                info!(width, height, "Rear camera stream acquired");
                self.stream = Some(stream);
                CameraStatus::Active
            }
            Err(rear_err) => {
                warn!(error = %rear_err, "Rear camera unavailable, trying any camera");
                match self.backend.open(&StreamRequest::any()) {
                    Ok(stream) => {
                        self.stream = Some(stream);
                        CameraStatus::Degraded {
                            reason: rear_err.to_string(),
                        }
                    }
                    Err(any_err) => {
                        error!(error = %any_err, "No camera obtainable");
                        CameraStatus::Unavailable {
                            reason: any_err.to_string(),
                        }
                    }
                }
            }
        };

        &self.status
    }

    /// Release all tracks. Idempotent.
    pub fn stop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            for track in stream.tracks_mut().iter_mut() {
                if !track.is_stopped() {
                    track.stop();
                }
            }
            debug!("Camera stream released");
            self.status = CameraStatus::Stopped;
        }
        self.torch_on = false;
    }

    /// Flip the torch on the video track
    ///
    /// Tracks without torch capability report [`TorchState::Unsupported`].
    pub fn toggle_torch(&mut self) -> Result<TorchState, CameraError> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(TorchState::Inactive);
        };
        let Some(track) = stream.tracks_mut().first_mut() else {
            return Ok(TorchState::Unsupported);
        };
        if !track.supports_torch() {
            return Ok(TorchState::Unsupported);
        }

        let target = !self.torch_on;
        track.apply_torch(target)?;
        self.torch_on = target;

        Ok(if target { TorchState::On } else { TorchState::Off })
    }

    /// Disable (not stop) tracks while the page is hidden, re-enable when shown
    pub fn set_visible(&mut self, visible: bool) {
        if let Some(stream) = self.stream.as_mut() {
            for track in stream.tracks_mut().iter_mut() {
                track.set_enabled(visible);
            }
            debug!(visible, "Camera tracks toggled for visibility");
        }
    }

    /// Capture the current frame, if the video track is live and a frame is ready
    pub fn capture_frame(&mut self) -> Option<RasterFrame> {
        let stream = self.stream.as_mut()?;
        let live = stream
            .tracks_mut()
            .first()
            .map(|track| track.is_enabled() && !track.is_stopped())
            .unwrap_or(false);
        if !live {
            return None;
        }
        stream.latest_frame()
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.stop();
    }
}
