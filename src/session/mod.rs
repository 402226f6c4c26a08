// SPDX-License-Identifier: GPL-3.0-only

//! Capture session coordination
//!
//! ```text
//!   SessionHandle (clone per caller)
//!        │  Command + oneshot reply
//!        ▼
//!   ┌──────────────────────────┐   CaptureEvent   ┌──────────────────┐
//!   │ SessionController thread │ ◄─────────────── │  CameraBackend   │
//!   │  session · tracker ·     │ ───────────────► │  (capture work)  │
//!   │  interruption state      │  configure/start └──────────────────┘
//!   └──────────────────────────┘
//!        │ watch (snapshot) · broadcast (events)
//!        ▼
//!     observers
//! ```
//!
//! The worker thread owns every piece of mutable state; handles only send
//! commands and read published snapshots.

mod controller;
pub mod photo_settings;
pub mod state;
pub mod transaction;

pub use photo_settings::{PhotoSettings, PhotoSettingsInputs};
pub use state::{CaptureMode, ControllerState, OutputSet, Session, SessionEvent, SessionSnapshot};
pub use transaction::Transaction;

use crate::backends::camera::CameraBackend;
use crate::backends::camera::types::{
    CameraDevice, DeviceId, DeviceOrientation, DevicePoint, ExposureMode, FlashMode, FocusMode,
};
use crate::backends::permissions::{Authorizations, PermissionAuthority};
use crate::capture::{CaptureEvent, LivePhotoCounter, MovieTicket, PhotoTicket, RequestId};
use crate::config::Config;
use crate::constants::{APP_DIR_NAME, EVENT_CHANNEL_CAPACITY, QualityPrioritization, SESSION_THREAD_NAME};
use crate::errors::{SessionError, SessionResult, StorageError};
use crate::interruption::{InterruptionReason, RuntimeErrorCode};
use crate::storage::{LocationProvider, PersistenceSink};
use controller::{ControllerParts, SessionController};
use std::path::PathBuf;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info};

type Reply<T> = oneshot::Sender<T>;

/// Messages processed by the session worker
pub(crate) enum Command {
    RequestPermissions { respond_to: Reply<Authorizations> },
    Configure { respond_to: Reply<SessionResult<()>> },
    Start { respond_to: Reply<SessionResult<()>> },
    Stop { respond_to: Reply<SessionResult<()>> },
    ListDevices { respond_to: Reply<Vec<CameraDevice>> },
    SetCaptureMode { mode: CaptureMode, respond_to: Reply<SessionResult<()>> },
    ChangeCamera {
        target: Option<DeviceId>,
        is_user_selection: bool,
        respond_to: Reply<SessionResult<CameraDevice>>,
    },
    ToggleHdr { on: bool, respond_to: Reply<SessionResult<bool>> },
    SetLivePhotoCapture { on: bool, respond_to: Reply<SessionResult<()>> },
    SetPhotoQuality {
        quality: QualityPrioritization,
        respond_to: Reply<SessionResult<()>>,
    },
    SetFlashMode { mode: FlashMode, respond_to: Reply<SessionResult<()>> },
    Focus { request: FocusRequest, respond_to: Reply<SessionResult<()>> },
    Zoom { scale: f64, respond_to: Reply<SessionResult<f64>> },
    CapturePhoto { respond_to: Reply<SessionResult<PhotoTicket>> },
    StartRecording { respond_to: Reply<SessionResult<MovieTicket>> },
    StopRecording { respond_to: Reply<SessionResult<()>> },
    CleanUpMovie { id: RequestId, respond_to: Reply<SessionResult<()>> },
    CleanUpAllMovies { respond_to: Reply<SessionResult<()>> },
    ResumeInterruptedSession { respond_to: Reply<SessionResult<()>> },
    /// Round trip through the queue; everything sent before has been handled
    Sync { respond_to: Reply<()> },
    Notification(HardwareNotification),
    CaptureEvent(CaptureEvent),
    RecoverFromRuntimeError,
    Shutdown { respond_to: Reply<()> },
}

/// Asynchronous platform notifications
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HardwareNotification {
    Interrupted(InterruptionReason),
    InterruptionEnded,
    RuntimeError(RuntimeErrorCode),
    OrientationChanged(DeviceOrientation),
    /// The scene under the focus point changed substantially
    SubjectAreaChanged,
}

/// Tap-to-focus request in normalized device coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FocusRequest {
    pub focus_mode: FocusMode,
    pub exposure_mode: ExposureMode,
    pub point: DevicePoint,
    pub monitor_subject_area: bool,
}

impl FocusRequest {
    /// Single auto focus and exposure at `point`, watching for scene changes
    pub fn tap(point: DevicePoint) -> Self {
        Self {
            focus_mode: FocusMode::AutoFocus,
            exposure_mode: ExposureMode::AutoExpose,
            point,
            monitor_subject_area: true,
        }
    }
}

/// Builds and spawns a session worker
pub struct SessionBuilder {
    backend: Box<dyn CameraBackend>,
    permissions: Box<dyn PermissionAuthority>,
    persistence: Option<Box<dyn PersistenceSink>>,
    location: Option<Box<dyn LocationProvider>>,
    config: Config,
    config_path: Option<PathBuf>,
    temp_dir: Option<PathBuf>,
}

impl SessionBuilder {
    pub fn new(
        backend: impl CameraBackend + 'static,
        permissions: impl PermissionAuthority + 'static,
    ) -> Self {
        Self {
            backend: Box::new(backend),
            permissions: Box::new(permissions),
            persistence: None,
            location: None,
            config: Config::default(),
            config_path: None,
            temp_dir: None,
        }
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Persist preference changes (remembered camera, toggles) to `path`
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn persistence(mut self, sink: impl PersistenceSink + 'static) -> Self {
        self.persistence = Some(Box::new(sink));
        self
    }

    pub fn location(mut self, provider: impl LocationProvider + 'static) -> Self {
        self.location = Some(Box::new(provider));
        self
    }

    /// Directory for movies and Live Photo companions before cleanup
    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    pub fn spawn(self) -> SessionResult<SessionHandle> {
        let temp_dir = self
            .temp_dir
            .unwrap_or_else(|| std::env::temp_dir().join(APP_DIR_NAME));
        std::fs::create_dir_all(&temp_dir).map_err(StorageError::from)?;

        let (commands, queue) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let live_photos = LivePhotoCounter::new();

        let parts = ControllerParts {
            backend: self.backend,
            permissions: self.permissions,
            persistence: self.persistence,
            location: self.location,
            config: self.config,
            config_path: self.config_path,
            temp_dir,
        };
        let controller = SessionController::new(
            parts,
            commands.downgrade(),
            events.clone(),
            live_photos.clone(),
        );
        let snapshot = controller.subscribe_snapshot();

        std::thread::Builder::new()
            .name(SESSION_THREAD_NAME.to_string())
            .spawn(move || controller.run(queue))
            .map_err(|e| StorageError::Io(format!("could not spawn session worker: {}", e)))?;
        info!("Session worker spawned");

        Ok(SessionHandle {
            commands,
            snapshot,
            events,
            live_photos,
        })
    }
}

/// Cloneable front door to a session worker
///
/// The worker exits after [`SessionHandle::shutdown`] or once every handle
/// is dropped.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<SessionSnapshot>,
    events: broadcast::Sender<SessionEvent>,
    live_photos: LivePhotoCounter,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("state", &self.snapshot.borrow().state)
            .field("closed", &self.commands.is_closed())
            .finish()
    }
}

impl SessionHandle {
    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> SessionResult<T> {
        let (respond_to, response) = oneshot::channel();
        self.commands
            .send(command(respond_to))
            .map_err(|_| SessionError::WorkerUnavailable)?;
        response.await.map_err(|_| SessionError::WorkerUnavailable)
    }

    fn notify(&self, notification: HardwareNotification) -> SessionResult<()> {
        debug!(?notification, "Forwarding hardware notification");
        self.commands
            .send(Command::Notification(notification))
            .map_err(|_| SessionError::WorkerUnavailable)
    }

    // ===== Setup and lifecycle =====

    /// Resolve camera, microphone and (when tagging is on) location access
    pub async fn request_permissions(&self) -> SessionResult<Authorizations> {
        self.request(|respond_to| Command::RequestPermissions { respond_to })
            .await
    }

    pub async fn configure(&self) -> SessionResult<()> {
        self.request(|respond_to| Command::Configure { respond_to })
            .await?
    }

    pub async fn start(&self) -> SessionResult<()> {
        self.request(|respond_to| Command::Start { respond_to }).await?
    }

    pub async fn stop(&self) -> SessionResult<()> {
        self.request(|respond_to| Command::Stop { respond_to }).await?
    }

    /// Video and audio devices known to the backend
    pub async fn devices(&self) -> SessionResult<Vec<CameraDevice>> {
        self.request(|respond_to| Command::ListDevices { respond_to })
            .await
    }

    /// Wait until every command sent so far has been processed
    pub async fn sync(&self) -> SessionResult<()> {
        self.request(|respond_to| Command::Sync { respond_to }).await
    }

    /// Stop the worker; pending tickets resolve with `WorkerUnavailable`
    pub async fn shutdown(&self) -> SessionResult<()> {
        self.request(|respond_to| Command::Shutdown { respond_to })
            .await
    }

    // ===== Mode and device =====

    pub async fn set_capture_mode(&self, mode: CaptureMode) -> SessionResult<()> {
        self.request(|respond_to| Command::SetCaptureMode { mode, respond_to })
            .await?
    }

    /// Cycle to the next camera position and remember it as the user's choice
    pub async fn change_camera(&self) -> SessionResult<CameraDevice> {
        self.request(|respond_to| Command::ChangeCamera {
            target: None,
            is_user_selection: true,
            respond_to,
        })
        .await?
    }

    /// Switch to a specific camera and remember it as the user's choice
    pub async fn select_camera(&self, device: DeviceId) -> SessionResult<CameraDevice> {
        self.request(|respond_to| Command::ChangeCamera {
            target: Some(device),
            is_user_selection: true,
            respond_to,
        })
        .await?
    }

    /// Returns whether the active format changed; without a 10-bit format
    /// the preference is only recorded for the next switch to video mode
    pub async fn toggle_hdr_video(&self, on: bool) -> SessionResult<bool> {
        self.request(|respond_to| Command::ToggleHdr { on, respond_to })
            .await?
    }

    pub async fn set_live_photo_capture(&self, on: bool) -> SessionResult<()> {
        self.request(|respond_to| Command::SetLivePhotoCapture { on, respond_to })
            .await?
    }

    pub async fn set_photo_quality(&self, quality: QualityPrioritization) -> SessionResult<()> {
        self.request(|respond_to| Command::SetPhotoQuality {
            quality,
            respond_to,
        })
        .await?
    }

    pub async fn set_flash_mode(&self, mode: FlashMode) -> SessionResult<()> {
        self.request(|respond_to| Command::SetFlashMode { mode, respond_to })
            .await?
    }

    pub async fn focus(&self, request: FocusRequest) -> SessionResult<()> {
        self.request(|respond_to| Command::Focus {
            request,
            respond_to,
        })
        .await?
    }

    /// Returns the zoom factor actually applied
    pub async fn zoom(&self, scale: f64) -> SessionResult<f64> {
        self.request(|respond_to| Command::Zoom { scale, respond_to })
            .await?
    }

    // ===== Capture =====

    pub async fn capture_photo(&self) -> SessionResult<PhotoTicket> {
        self.request(|respond_to| Command::CapturePhoto { respond_to })
            .await?
    }

    pub async fn start_recording(&self) -> SessionResult<MovieTicket> {
        self.request(|respond_to| Command::StartRecording { respond_to })
            .await?
    }

    pub async fn stop_recording(&self) -> SessionResult<()> {
        self.request(|respond_to| Command::StopRecording { respond_to })
            .await?
    }

    /// Delete a recorded movie's temporary files; repeated calls are no-ops
    pub async fn clean_up_movie(&self, id: RequestId) -> SessionResult<()> {
        self.request(|respond_to| Command::CleanUpMovie { id, respond_to })
            .await?
    }

    pub async fn clean_up_all_movies(&self) -> SessionResult<()> {
        self.request(|respond_to| Command::CleanUpAllMovies { respond_to })
            .await?
    }

    pub async fn resume_interrupted_session(&self) -> SessionResult<()> {
        self.request(|respond_to| Command::ResumeInterruptedSession { respond_to })
            .await?
    }

    // ===== Notifications =====

    pub fn notify_interrupted(&self, reason: InterruptionReason) -> SessionResult<()> {
        self.notify(HardwareNotification::Interrupted(reason))
    }

    pub fn notify_interruption_ended(&self) -> SessionResult<()> {
        self.notify(HardwareNotification::InterruptionEnded)
    }

    pub fn notify_runtime_error(&self, code: RuntimeErrorCode) -> SessionResult<()> {
        self.notify(HardwareNotification::RuntimeError(code))
    }

    pub fn notify_orientation(&self, orientation: DeviceOrientation) -> SessionResult<()> {
        self.notify(HardwareNotification::OrientationChanged(orientation))
    }

    pub fn notify_subject_area_changed(&self) -> SessionResult<()> {
        self.notify(HardwareNotification::SubjectAreaChanged)
    }

    // ===== Observation =====

    /// Latest published snapshot
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// True while any Live Photo companion movie is being recorded
    pub fn live_photo_in_progress(&self) -> bool {
        self.live_photos.is_capturing()
    }

    pub fn watch_live_photo(&self) -> watch::Receiver<bool> {
        self.live_photos.subscribe()
    }
}
