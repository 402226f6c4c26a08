// SPDX-License-Identifier: GPL-3.0-only

//! Session state shared with observers

use super::photo_settings::PhotoSettings;
use crate::backends::camera::types::{
    CameraDevice, CaptureOrientation, DeviceId, FlashMode, MediaType, OutputKind,
    PhotoOutputConfig, SessionPreset, VideoStabilizationMode,
};
use crate::backends::permissions::Authorizations;
use crate::capture::{CaptureKind, RequestId};
use crate::constants::QualityPrioritization;
use crate::errors::{CaptureError, DeviceConfigError, SetupError, StorageError};
use crate::interruption::InterruptionState;

/// Lifecycle of the session controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControllerState {
    #[default]
    Unconfigured,
    /// A configuration transaction is open
    Configuring,
    Ready,
    Running,
    /// Initial setup failed; terminal
    ConfigurationFailed,
    /// Camera access was refused; terminal
    NotAuthorized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureMode {
    #[default]
    Photo,
    Video,
}

impl std::ops::Not for CaptureMode {
    type Output = CaptureMode;

    fn not(self) -> Self::Output {
        match self {
            CaptureMode::Photo => CaptureMode::Video,
            CaptureMode::Video => CaptureMode::Photo,
        }
    }
}

/// Outputs attached to the session; at most one of each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutputSet {
    pub photo: bool,
    pub movie: bool,
}

impl OutputSet {
    pub fn contains(&self, kind: OutputKind) -> bool {
        match kind {
            OutputKind::Photo => self.photo,
            OutputKind::Movie => self.movie,
        }
    }

    pub fn set(&mut self, kind: OutputKind, attached: bool) {
        match kind {
            OutputKind::Photo => self.photo = attached,
            OutputKind::Movie => self.movie = attached,
        }
    }
}

/// Configuration of the capture pipeline
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Session {
    pub preset: SessionPreset,
    pub is_running: bool,
    pub video_input: Option<CameraDevice>,
    pub audio_input: Option<CameraDevice>,
    pub outputs: OutputSet,
    pub photo_output: PhotoOutputConfig,
    pub stabilization: VideoStabilizationMode,
}

impl Session {
    pub fn input(&self, media: MediaType) -> Option<&CameraDevice> {
        match media {
            MediaType::Video => self.video_input.as_ref(),
            MediaType::Audio => self.audio_input.as_ref(),
        }
    }

    pub(crate) fn input_slot(&mut self, media: MediaType) -> &mut Option<CameraDevice> {
        match media {
            MediaType::Video => &mut self.video_input,
            MediaType::Audio => &mut self.audio_input,
        }
    }
}

/// Published view of the controller
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionSnapshot {
    pub state: ControllerState,
    pub capture_mode: CaptureMode,
    pub session: Session,
    pub interruption: InterruptionState,
    pub authorizations: Authorizations,
    pub hdr_video_on: bool,
    /// A 10-bit format was negotiated for the current device
    pub hdr_format_available: bool,
    pub live_photo_capture_on: bool,
    pub photo_quality: QualityPrioritization,
    pub flash_mode: FlashMode,
    pub orientation: CaptureOrientation,
    pub changing_camera: bool,
    pub can_change_camera: bool,
    pub recording: Option<RequestId>,
    pub captures_in_flight: usize,
    pub pending_cleanup: Vec<RequestId>,
    pub photo_settings: Option<PhotoSettings>,
}

/// Notifications for observers
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(ControllerState),
    SetupFailed(SetupError),
    PermissionsResolved(Authorizations),
    RunningChanged(bool),
    CaptureModeChanged(CaptureMode),
    CameraStartedChanging,
    CameraFinishedChanging(DeviceId),
    /// The replacement camera was rejected and the previous one restored
    CameraChangeFailed(DeviceId),
    HdrVideoChanged(bool),
    DeviceConfigurationFailed(DeviceConfigError),
    InterruptionChanged(InterruptionState),
    CameraUnavailable,
    CaptureStarted { id: RequestId, kind: CaptureKind },
    ShutterFired(RequestId),
    CaptureCompleted { id: RequestId, kind: CaptureKind },
    CaptureFailed { id: RequestId, error: CaptureError },
    RecordingStarted(RequestId),
    RecordingFinished(RequestId),
    PersistenceFailed { id: RequestId, error: StorageError },
}
