// SPDX-License-Identifier: GPL-3.0-only

//! Session worker
//!
//! All session, device and capture-tracker state is owned by one
//! [`SessionController`] running on its own thread. Callers talk to it through
//! [`super::SessionHandle`]; backends report capture progress through events
//! that come back into the same command queue, so every mutation is
//! serialized.

use super::photo_settings::{PhotoSettings, PhotoSettingsInputs, unique_temporary_path};
use super::state::{CaptureMode, ControllerState, Session, SessionEvent, SessionSnapshot};
use super::transaction::Transaction;
use super::{Command, FocusRequest, HardwareNotification};
use crate::backends::camera::types::{
    CameraDevice, CameraFormat, CaptureOrientation, DeviceId, DeviceOrientation, DevicePoint,
    DevicePosition, DeviceSetting, ExposureMode, FlashMode, FocusMode, MediaType, OutputKind,
    SessionPreset, VideoStabilizationMode,
};
use crate::backends::camera::{CameraBackend, with_device_lock};
use crate::backends::permissions::{
    Authorization, Authorizations, PermissionAuthority, PermissionKind,
};
use crate::capture::{
    CaptureArtifact, CaptureEvent, CaptureEventSender, CaptureKind, CaptureOutcome,
    CaptureRequestTracker, CaptureTicket, LivePhotoCounter, MovieTicket, PhotoTicket, RequestId,
};
use crate::config::Config;
use crate::constants::{MIN_ZOOM_FACTOR, QualityPrioritization};
use crate::errors::{CaptureError, DeviceConfigError, SessionError, SessionResult, SetupError};
use crate::interruption::{InterruptionStateMachine, RecoveryAction};
use crate::selection::{self, can_change_camera, default_video_device, next_device};
use crate::storage::{LocationProvider, PersistenceSink};
use std::path::PathBuf;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

/// Collaborators and settings the worker is built from
pub(crate) struct ControllerParts {
    pub backend: Box<dyn CameraBackend>,
    pub permissions: Box<dyn PermissionAuthority>,
    pub persistence: Option<Box<dyn PersistenceSink>>,
    pub location: Option<Box<dyn LocationProvider>>,
    pub config: Config,
    pub config_path: Option<PathBuf>,
    pub temp_dir: PathBuf,
}

pub(crate) struct SessionController {
    backend: Box<dyn CameraBackend>,
    permissions: Box<dyn PermissionAuthority>,
    persistence: Option<Box<dyn PersistenceSink>>,
    location: Option<Box<dyn LocationProvider>>,
    config: Config,
    config_path: Option<PathBuf>,
    temp_dir: PathBuf,

    session: Session,
    state: ControllerState,
    setup_error: Option<SetupError>,
    authorizations: Authorizations,
    capture_mode: CaptureMode,
    photo_quality: QualityPrioritization,
    flash_mode: FlashMode,
    live_photo_capture_on: bool,
    hdr_video_on: bool,
    /// 10-bit variant of the active format, negotiated in video mode
    hdr_format: Option<CameraFormat>,
    photo_settings: Option<PhotoSettings>,
    orientation: CaptureOrientation,
    changing_camera: bool,
    can_change_camera: bool,

    tracker: CaptureRequestTracker,
    interruption: InterruptionStateMachine,
    capture_events: CaptureEventSender,
    commands: mpsc::WeakUnboundedSender<Command>,
    events: broadcast::Sender<SessionEvent>,
    published: watch::Sender<SessionSnapshot>,
}

impl SessionController {
    pub(crate) fn new(
        parts: ControllerParts,
        commands: mpsc::WeakUnboundedSender<Command>,
        events: broadcast::Sender<SessionEvent>,
        live_photos: LivePhotoCounter,
    ) -> Self {
        let forward_to = commands.clone();
        let capture_events = CaptureEventSender::new(live_photos.clone(), move |event| {
            forward_to
                .upgrade()
                .is_some_and(|tx| tx.send(Command::CaptureEvent(event)).is_ok())
        });

        let config = parts.config;
        let (published, _) = watch::channel(SessionSnapshot::default());

        Self {
            backend: parts.backend,
            permissions: parts.permissions,
            persistence: parts.persistence,
            location: parts.location,
            config_path: parts.config_path,
            temp_dir: parts.temp_dir,

            session: Session::default(),
            state: ControllerState::Unconfigured,
            setup_error: None,
            authorizations: Authorizations::default(),
            capture_mode: CaptureMode::Photo,
            photo_quality: config.photo_quality,
            flash_mode: config.flash_mode,
            live_photo_capture_on: config.live_photo_enabled,
            hdr_video_on: config.hdr_video_enabled,
            hdr_format: None,
            photo_settings: None,
            orientation: CaptureOrientation::Portrait,
            changing_camera: false,
            can_change_camera: false,

            tracker: CaptureRequestTracker::new(live_photos, config.clean_up_movies_automatically),
            interruption: InterruptionStateMachine::new(),
            capture_events,
            commands,
            events,
            published,
            config,
        }
    }

    pub(crate) fn subscribe_snapshot(&self) -> watch::Receiver<SessionSnapshot> {
        self.published.subscribe()
    }

    /// Process commands until shutdown or until every handle is dropped
    pub(crate) fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        info!(temp_dir = %self.temp_dir.display(), "Session worker started");
        self.publish();

        while let Some(command) = commands.blocking_recv() {
            match command {
                Command::Shutdown { respond_to } => {
                    self.shut_down();
                    reply(respond_to, ());
                    return;
                }
                command => self.handle(command),
            }
            self.publish();
        }

        debug!("All session handles dropped");
        self.shut_down();
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::RequestPermissions { respond_to } => {
                let result = self.request_permissions();
                reply(respond_to, result);
            }
            Command::Configure { respond_to } => {
                let result = self.configure().map_err(SessionError::from);
                reply(respond_to, result);
            }
            Command::Start { respond_to } => {
                let result = self.start();
                reply(respond_to, result);
            }
            Command::Stop { respond_to } => {
                let result = self.stop();
                reply(respond_to, result);
            }
            Command::ListDevices { respond_to } => {
                let mut devices = self.backend.devices(MediaType::Video);
                devices.extend(self.backend.devices(MediaType::Audio));
                reply(respond_to, devices);
            }
            Command::SetCaptureMode { mode, respond_to } => {
                let result = self.set_capture_mode(mode);
                reply(respond_to, result);
            }
            Command::ChangeCamera {
                target,
                is_user_selection,
                respond_to,
            } => {
                let result = self.change_camera(target, is_user_selection);
                reply(respond_to, result);
            }
            Command::ToggleHdr { on, respond_to } => {
                let result = self.toggle_hdr(on);
                reply(respond_to, result);
            }
            Command::SetLivePhotoCapture { on, respond_to } => {
                let result = self.set_live_photo_capture(on);
                reply(respond_to, result);
            }
            Command::SetPhotoQuality { quality, respond_to } => {
                let result = self.set_photo_quality(quality);
                reply(respond_to, result);
            }
            Command::SetFlashMode { mode, respond_to } => {
                let result = self.set_flash_mode(mode);
                reply(respond_to, result);
            }
            Command::Focus { request, respond_to } => {
                let result = self.focus(request);
                reply(respond_to, result);
            }
            Command::Zoom { scale, respond_to } => {
                let result = self.zoom(scale);
                reply(respond_to, result);
            }
            Command::CapturePhoto { respond_to } => {
                let result = self.capture_photo();
                reply(respond_to, result);
            }
            Command::StartRecording { respond_to } => {
                let result = self.start_recording();
                reply(respond_to, result);
            }
            Command::StopRecording { respond_to } => {
                let result = self.stop_recording();
                reply(respond_to, result);
            }
            Command::CleanUpMovie { id, respond_to } => {
                let result = self.tracker.clean_up(id).map_err(SessionError::from);
                reply(respond_to, result);
            }
            Command::CleanUpAllMovies { respond_to } => {
                let result = self.tracker.clean_up_all().map_err(SessionError::from);
                reply(respond_to, result);
            }
            Command::ResumeInterruptedSession { respond_to } => {
                let result = self.resume_interrupted_session();
                reply(respond_to, result);
            }
            Command::Sync { respond_to } => reply(respond_to, ()),
            Command::Notification(notification) => self.handle_notification(notification),
            Command::CaptureEvent(event) => self.handle_capture_event(event),
            Command::RecoverFromRuntimeError => self.recover_from_runtime_error(),
            Command::Shutdown { respond_to } => reply(respond_to, ()),
        }
    }

    // ===== Publishing =====

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn publish(&self) {
        self.published.send_replace(self.snapshot());
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            capture_mode: self.capture_mode,
            session: self.session.clone(),
            interruption: self.interruption.state(),
            authorizations: self.authorizations,
            hdr_video_on: self.hdr_video_on,
            hdr_format_available: self.hdr_format.is_some(),
            live_photo_capture_on: self.live_photo_capture_on,
            photo_quality: self.photo_quality,
            flash_mode: self.flash_mode,
            orientation: self.orientation,
            changing_camera: self.changing_camera,
            can_change_camera: self.can_change_camera,
            recording: self.tracker.active_movie(),
            captures_in_flight: self.tracker.in_flight(),
            pending_cleanup: self.tracker.pending_cleanup(),
            photo_settings: self.photo_settings.clone(),
        }
    }

    fn set_state(&mut self, state: ControllerState) {
        if self.state == state {
            return;
        }
        debug!(from = ?self.state, to = ?state, "Session state changed");
        self.state = state;
        self.emit(SessionEvent::StateChanged(state));
        self.publish();
    }

    /// Enter `Configuring`, returning the state to come back to
    fn enter_configuring(&mut self) -> ControllerState {
        let prior = self.state;
        self.set_state(ControllerState::Configuring);
        prior
    }

    fn leave_configuring(&mut self, prior: ControllerState) {
        self.set_state(prior);
        self.sync_running_state();
    }

    fn sync_running_state(&mut self) {
        match self.state {
            ControllerState::Ready if self.session.is_running => self.set_state(ControllerState::Running),
            ControllerState::Running if !self.session.is_running => self.set_state(ControllerState::Ready),
            _ => {}
        }
    }

    fn ensure_configured(&self) -> SessionResult<()> {
        match self.state {
            ControllerState::Ready | ControllerState::Running => Ok(()),
            ControllerState::Configuring => Err(SessionError::Busy("configuration in progress".to_string())),
            ControllerState::NotAuthorized => Err(SessionError::PermissionDenied),
            ControllerState::Unconfigured | ControllerState::ConfigurationFailed => {
                Err(SessionError::NotConfigured)
            }
        }
    }

    fn enqueue(&self, command: Command) {
        match self.commands.upgrade() {
            Some(tx) => {
                if tx.send(command).is_err() {
                    warn!("Session queue closed, dropping follow-up command");
                }
            }
            None => debug!("No session handles left, dropping follow-up command"),
        }
    }

    fn save_config(&self) {
        let Some(path) = &self.config_path else {
            return;
        };
        if let Err(e) = self.config.save_to(path) {
            warn!(error = %e, "Failed to save config");
        }
    }

    // ===== Permissions and setup =====

    /// Current authorization for `kind`, prompting when undecided
    ///
    /// Prompting blocks the worker until the answer arrives, so nothing else
    /// touches the session in the meantime.
    fn resolve_permission(&mut self, kind: PermissionKind) -> Authorization {
        let status = match self.permissions.status(kind) {
            Authorization::NotDetermined => {
                info!(?kind, "Waiting for permission");
                self.permissions.request(kind).blocking_recv().unwrap_or_else(|_| {
                    warn!(?kind, "Permission prompt dropped, treating as denied");
                    Authorization::Denied
                })
            }
            status => status,
        };
        self.authorizations.set(kind, status);
        status
    }

    fn request_permissions(&mut self) -> Authorizations {
        let camera = self.resolve_permission(PermissionKind::Camera);
        if camera.is_authorized() {
            self.resolve_permission(PermissionKind::Microphone);
        } else if self.state == ControllerState::Unconfigured {
            self.set_state(ControllerState::NotAuthorized);
        }
        if self.config.tag_location_in_captures {
            self.resolve_permission(PermissionKind::Location);
        }

        info!(authorizations = ?self.authorizations, "Permissions resolved");
        self.emit(SessionEvent::PermissionsResolved(self.authorizations));
        self.authorizations
    }

    fn configure(&mut self) -> Result<(), SetupError> {
        match self.state {
            ControllerState::Ready | ControllerState::Running | ControllerState::Configuring => {
                return Ok(());
            }
            ControllerState::ConfigurationFailed => {
                return Err(self.setup_error.unwrap_or(SetupError::NoVideoDevice));
            }
            ControllerState::NotAuthorized => return Err(SetupError::NotAuthorized),
            ControllerState::Unconfigured => {}
        }

        if !self.resolve_permission(PermissionKind::Camera).is_authorized() {
            warn!("Camera access not authorized");
            self.set_state(ControllerState::NotAuthorized);
            self.emit(SessionEvent::SetupFailed(SetupError::NotAuthorized));
            return Err(SetupError::NotAuthorized);
        }

        self.set_state(ControllerState::Configuring);
        match self.configure_session() {
            Ok(()) => {
                info!(
                    device = ?self.session.video_input.as_ref().map(|d| d.name.as_str()),
                    live_photo = self.session.photo_output.live_photo_enabled,
                    "Session configured"
                );
                self.set_state(ControllerState::Ready);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Session configuration failed");
                self.setup_error = Some(e);
                self.set_state(ControllerState::ConfigurationFailed);
                self.emit(SessionEvent::SetupFailed(e));
                Err(e)
            }
        }
    }

    fn configure_session(&mut self) -> Result<(), SetupError> {
        let devices = self.backend.devices(MediaType::Video);
        let remembered = self
            .config
            .preferred_camera
            .clone()
            .filter(|_| self.config.initial_camera_set);
        let video = default_video_device(&devices, remembered.as_ref())
            .or_else(|| self.backend.default_device(MediaType::Video))
            .ok_or(SetupError::NoVideoDevice)?;
        let microphone = match self.authorizations.microphone {
            Authorization::Denied => None,
            _ => self.backend.default_device(MediaType::Audio),
        };

        let mut txn = Transaction::begin(self.backend.as_mut(), &self.session);
        txn.set_preset(SessionPreset::Photo);
        if let Err(e) = txn.add_input(video.clone()) {
            warn!(device = %video, error = %e, "Couldn't add video device input to the session");
            txn.abort();
            return Err(SetupError::InputRejected);
        }
        if let Some(microphone) = microphone
            && let Err(e) = txn.add_input(microphone)
        {
            warn!(error = %e, "Could not add audio device input to the session");
        }
        if let Err(e) = txn.add_output(OutputKind::Photo) {
            warn!(error = %e, "Could not add photo output to the session");
            txn.abort();
            return Err(SetupError::OutputRejected);
        }
        txn.configure_photo_output();
        self.session = txn.commit();

        if !self.config.initial_camera_set {
            self.config.remember_camera(&video.id);
            self.save_config();
        }
        self.can_change_camera = can_change_camera(&devices);
        self.live_photo_capture_on =
            self.config.live_photo_enabled && self.session.photo_output.live_photo_enabled;
        self.photo_quality = self.config.photo_quality;
        self.refresh_photo_settings();
        Ok(())
    }

    fn start(&mut self) -> SessionResult<()> {
        self.ensure_configured()?;
        if !self.authorizations.camera.is_authorized() {
            return Err(SessionError::PermissionDenied);
        }
        if self.session.is_running && self.backend.is_running() {
            return Ok(());
        }

        self.backend.start_running()?;
        self.session.is_running = self.backend.is_running();
        if !self.session.is_running {
            return Err(SessionError::CameraUnavailable);
        }
        info!("Session running");
        self.sync_running_state();
        self.emit(SessionEvent::RunningChanged(true));
        Ok(())
    }

    fn stop(&mut self) -> SessionResult<()> {
        self.ensure_configured()?;
        if !self.session.is_running {
            return Ok(());
        }
        self.backend.stop_running();
        self.session.is_running = false;
        info!("Session stopped");
        self.sync_running_state();
        self.emit(SessionEvent::RunningChanged(false));
        Ok(())
    }

    fn shut_down(&mut self) {
        if self.tracker.is_recording()
            && let Err(e) = self.backend.stop_recording()
        {
            warn!(error = %e, "Could not stop recording during shutdown");
        }
        if self.session.is_running {
            self.backend.stop_running();
            self.session.is_running = false;
        }
        let pending = self.tracker.pending_cleanup();
        if !pending.is_empty() {
            info!(count = pending.len(), "Leaving recorded movies for the caller to clean up");
        }
        self.publish();
        info!("Session worker stopped");
    }

    // ===== Mode and device switching =====

    fn set_capture_mode(&mut self, mode: CaptureMode) -> SessionResult<()> {
        self.ensure_configured()?;
        if mode == self.capture_mode {
            debug!(?mode, "Capture mode unchanged");
            return Ok(());
        }
        if self.tracker.is_recording() {
            return Err(SessionError::Busy("cannot change mode while recording".to_string()));
        }

        let prior = self.enter_configuring();
        let result = match mode {
            CaptureMode::Video => self.enter_video_mode(),
            CaptureMode::Photo => {
                self.enter_photo_mode();
                Ok(())
            }
        };
        self.leave_configuring(prior);
        result?;

        info!(?mode, "Capture mode changed");
        self.capture_mode = mode;
        self.refresh_photo_settings();
        self.emit(SessionEvent::CaptureModeChanged(mode));
        Ok(())
    }

    fn enter_video_mode(&mut self) -> SessionResult<()> {
        let hdr_on = self.hdr_video_on;
        let mut txn = Transaction::begin(self.backend.as_mut(), &self.session);
        if let Err(e) = txn.add_output(OutputKind::Movie) {
            warn!(error = %e, "Could not add movie output to the session");
            txn.abort();
            return Err(SetupError::OutputRejected.into());
        }
        txn.set_preset(SessionPreset::High);
        let hdr_format = negotiate_hdr_format(&mut txn, hdr_on);
        txn.set_video_stabilization(VideoStabilizationMode::Auto);
        txn.configure_photo_output();
        self.session = txn.commit();

        self.hdr_format = hdr_format;
        self.photo_quality = QualityPrioritization::Balanced;
        Ok(())
    }

    fn enter_photo_mode(&mut self) {
        let mut txn = Transaction::begin(self.backend.as_mut(), &self.session);
        txn.remove_output(OutputKind::Movie);
        txn.set_preset(SessionPreset::Photo);
        txn.configure_photo_output();
        self.session = txn.commit();

        self.hdr_format = None;
        self.photo_quality = self.config.photo_quality;
        self.live_photo_capture_on =
            self.config.live_photo_enabled && self.session.photo_output.live_photo_enabled;
    }

    fn change_camera(
        &mut self,
        target: Option<DeviceId>,
        is_user_selection: bool,
    ) -> SessionResult<CameraDevice> {
        self.ensure_configured()?;
        if self.tracker.is_recording() {
            return Err(SessionError::Busy("cannot change camera while recording".to_string()));
        }

        let devices = self.backend.devices(MediaType::Video);
        let replacement = match &target {
            Some(id) => selection::device::find_device(&devices, id)
                .cloned()
                .ok_or_else(|| SessionError::DeviceNotFound(id.to_string()))?,
            None => {
                let current = self
                    .session
                    .video_input
                    .as_ref()
                    .map_or(DevicePosition::Unspecified, |d| d.position);
                next_device(&devices, current)
                    .ok_or_else(|| SessionError::DeviceNotFound("no other camera".to_string()))?
            }
        };
        if self.session.video_input.as_ref().is_some_and(|d| d.id == replacement.id) {
            debug!(device = %replacement, "Camera already active");
            return Ok(replacement);
        }

        self.changing_camera = true;
        self.emit(SessionEvent::CameraStartedChanging);
        let prior = self.enter_configuring();

        let video_mode = self.capture_mode == CaptureMode::Video;
        let hdr_on = self.hdr_video_on;
        let mut txn = Transaction::begin(self.backend.as_mut(), &self.session);
        txn.remove_input(MediaType::Video);
        let switched = match txn.add_input(replacement.clone()) {
            Ok(()) => {
                let hdr_format = if video_mode {
                    txn.set_preset(SessionPreset::High);
                    let format = negotiate_hdr_format(&mut txn, hdr_on);
                    txn.set_video_stabilization(VideoStabilizationMode::Auto);
                    format
                } else {
                    None
                };
                txn.configure_photo_output();
                self.session = txn.commit();
                self.hdr_format = hdr_format;
                Ok(())
            }
            Err(e) => {
                warn!(device = %replacement, error = %e, "Could not switch camera, restoring previous input");
                txn.abort();
                Err(e)
            }
        };

        self.changing_camera = false;
        self.leave_configuring(prior);

        match switched {
            Ok(()) => {
                info!(device = %replacement, "Camera changed");
                if is_user_selection {
                    self.config.remember_camera(&replacement.id);
                    self.save_config();
                }
                self.can_change_camera = can_change_camera(&devices);
                if !self.session.photo_output.live_photo_enabled {
                    self.live_photo_capture_on = false;
                }
                self.refresh_photo_settings();
                self.emit(SessionEvent::CameraFinishedChanging(replacement.id.clone()));
                Ok(replacement)
            }
            Err(_) => {
                self.emit(SessionEvent::CameraChangeFailed(replacement.id));
                Err(SetupError::InputRejected.into())
            }
        }
    }

    /// Record the HDR video preference and apply it to the active format
    ///
    /// Returns whether the format changed now. Enabling without a negotiated
    /// 10-bit format (photo mode, or a camera without one) only records the
    /// preference, which the next switch to video mode picks up.
    fn toggle_hdr(&mut self, on: bool) -> SessionResult<bool> {
        self.ensure_configured()?;

        let applied = if on {
            match self.hdr_format.clone() {
                Some(format) => {
                    let device = self
                        .session
                        .video_input
                        .as_ref()
                        .map(|d| d.id.clone())
                        .ok_or(DeviceConfigError::NoActiveDevice)?;
                    let applied = format.clone();
                    let result = with_device_lock(self.backend.as_mut(), &device, |lock| {
                        lock.apply(DeviceSetting::ActiveFormat(applied))
                    });
                    self.report_device_config(result)?;
                    if let Some(input) = self.session.video_input.as_mut() {
                        input.active_format = Some(format);
                    }
                    true
                }
                None => {
                    info!("No 10-bit format for this camera, keeping HDR as a preference");
                    false
                }
            }
        } else if self.capture_mode == CaptureMode::Video {
            // The preset's default format is the 8-bit one
            let prior = self.enter_configuring();
            let mut txn = Transaction::begin(self.backend.as_mut(), &self.session);
            txn.reapply_preset();
            self.session = txn.commit();
            self.leave_configuring(prior);
            true
        } else {
            false
        };

        info!(on, applied, "HDR video changed");
        self.hdr_video_on = on;
        self.config.hdr_video_enabled = on;
        self.save_config();
        self.emit(SessionEvent::HdrVideoChanged(on));
        Ok(applied)
    }

    // ===== Photo preferences =====

    fn set_live_photo_capture(&mut self, on: bool) -> SessionResult<()> {
        self.ensure_configured()?;
        if on && !self.session.photo_output.live_photo_enabled {
            info!("Live Photo capture is not available in the current mode");
        }
        self.live_photo_capture_on = on;
        self.config.live_photo_enabled = on;
        self.save_config();
        self.refresh_photo_settings();
        Ok(())
    }

    fn set_photo_quality(&mut self, quality: QualityPrioritization) -> SessionResult<()> {
        self.ensure_configured()?;
        self.photo_quality = quality;
        self.config.photo_quality = quality;
        self.save_config();
        self.refresh_photo_settings();
        Ok(())
    }

    fn set_flash_mode(&mut self, mode: FlashMode) -> SessionResult<()> {
        self.ensure_configured()?;
        self.flash_mode = mode;
        self.config.flash_mode = mode;
        self.save_config();
        self.refresh_photo_settings();
        Ok(())
    }

    fn refresh_photo_settings(&mut self) {
        if !self.session.outputs.photo {
            self.photo_settings = None;
            return;
        }
        let codecs = self.backend.available_photo_codecs();
        let inputs = PhotoSettingsInputs {
            codecs: &codecs,
            device: self.session.video_input.as_ref(),
            photo_output: &self.session.photo_output,
            flash_mode: self.flash_mode,
            live_photo_on: self.live_photo_capture_on,
            quality: self.photo_quality,
            orientation: self.orientation,
            temp_dir: &self.temp_dir,
        };
        let settings = PhotoSettings::derive(&inputs);
        debug!(?settings, "Photo settings updated");
        self.photo_settings = Some(settings);
    }

    // ===== Device configuration =====

    fn report_device_config<T>(&self, result: Result<T, DeviceConfigError>) -> SessionResult<T> {
        result.map_err(|e| {
            warn!(error = %e, "Device configuration skipped");
            self.emit(SessionEvent::DeviceConfigurationFailed(e.clone()));
            SessionError::DeviceConfig(e)
        })
    }

    fn active_video_device(&self) -> SessionResult<CameraDevice> {
        self.session
            .video_input
            .clone()
            .ok_or(SessionError::DeviceConfig(DeviceConfigError::NoActiveDevice))
    }

    fn focus(&mut self, request: FocusRequest) -> SessionResult<()> {
        self.ensure_configured()?;
        if !request.point.is_normalized() {
            return self.report_device_config(Err(DeviceConfigError::InvalidPoint {
                x: request.point.x,
                y: request.point.y,
            }));
        }
        let device = self.active_video_device()?;
        let capabilities = &device.capabilities;

        let result = with_device_lock(self.backend.as_mut(), &device.id, |lock| {
            if capabilities.focus_point_supported && capabilities.supports_focus_mode(request.focus_mode) {
                lock.apply(DeviceSetting::Focus {
                    mode: request.focus_mode,
                    point: request.point,
                })?;
            }
            if capabilities.exposure_point_supported
                && capabilities.supports_exposure_mode(request.exposure_mode)
            {
                lock.apply(DeviceSetting::Exposure {
                    mode: request.exposure_mode,
                    point: request.point,
                })?;
            }
            lock.apply(DeviceSetting::SubjectAreaMonitoring(request.monitor_subject_area))
        });
        self.report_device_config(result)
    }

    fn subject_area_changed(&mut self) {
        let recenter = FocusRequest {
            focus_mode: FocusMode::ContinuousAutoFocus,
            exposure_mode: ExposureMode::ContinuousAutoExposure,
            point: DevicePoint::CENTER,
            monitor_subject_area: false,
        };
        if let Err(e) = self.focus(recenter) {
            debug!(error = %e, "Could not re-center focus after subject area change");
        }
    }

    fn zoom(&mut self, scale: f64) -> SessionResult<f64> {
        self.ensure_configured()?;
        if !scale.is_finite() {
            return self.report_device_config(Err(DeviceConfigError::Unsupported(format!(
                "zoom factor {}",
                scale
            ))));
        }
        let device = self.active_video_device()?;
        let max = device
            .active_format
            .as_ref()
            .map_or(MIN_ZOOM_FACTOR, |f| f.max_zoom_factor)
            .max(MIN_ZOOM_FACTOR);
        let factor = scale.clamp(MIN_ZOOM_FACTOR, max);

        let result = with_device_lock(self.backend.as_mut(), &device.id, |lock| {
            lock.apply(DeviceSetting::ZoomFactor(factor))
        });
        self.report_device_config(result)?;
        debug!(requested = scale, factor, "Zoom applied");
        Ok(factor)
    }

    // ===== Capture =====

    fn capture_photo(&mut self) -> SessionResult<PhotoTicket> {
        self.ensure_configured()?;
        let settings = self
            .photo_settings
            .as_ref()
            .ok_or(SessionError::NotConfigured)?
            .unique_copy(&self.temp_dir);

        let (id, completion) = self.tracker.begin_photo_capture(&settings)?;
        let kind = if settings.requests_live_photo() {
            CaptureKind::LivePhotoCompanion
        } else {
            CaptureKind::Photo
        };
        info!(request = %id, ?kind, codec = ?settings.codec, "Capturing photo");
        self.emit(SessionEvent::CaptureStarted { id, kind });

        if let Err(e) = self.backend.capture_photo(&settings, self.capture_events.clone()) {
            warn!(request = %id, error = %e, "Photo capture refused");
            self.finish_request(id, Err(CaptureError::Hardware(e.to_string())));
        }
        Ok(CaptureTicket::new(id, kind, completion))
    }

    fn start_recording(&mut self) -> SessionResult<MovieTicket> {
        self.ensure_configured()?;
        if !self.session.outputs.movie {
            return Err(SessionError::NotInVideoMode);
        }

        let path = unique_temporary_path(&self.temp_dir);
        let (id, completion) = self.tracker.begin_movie_capture(path.clone())?;
        match self
            .backend
            .start_recording(id, &path, self.orientation, self.capture_events.clone())
        {
            Ok(()) => info!(request = %id, path = %path.display(), "Recording requested"),
            Err(e) => {
                warn!(request = %id, error = %e, "Recording refused");
                self.finish_request(id, Err(CaptureError::Hardware(e.to_string())));
            }
        }
        Ok(CaptureTicket::new(id, CaptureKind::Movie, completion))
    }

    fn stop_recording(&mut self) -> SessionResult<()> {
        let id = self.tracker.active_movie().ok_or(CaptureError::NotRecording)?;
        self.tracker.mark_finalizing(id)?;
        if let Err(e) = self.backend.stop_recording() {
            warn!(request = %id, error = %e, "Could not stop recording");
            self.finish_request(id, Err(CaptureError::Hardware(e.to_string())));
            return Err(e.into());
        }
        info!(request = %id, "Recording stopping");
        Ok(())
    }

    fn handle_capture_event(&mut self, event: CaptureEvent) {
        let id = event.request_id();
        if let Err(e) = self.apply_capture_event(event) {
            warn!(request = %id, error = %e, "Ignoring capture event");
        }
    }

    fn apply_capture_event(&mut self, event: CaptureEvent) -> Result<(), CaptureError> {
        match event {
            CaptureEvent::WillBeginCapture { id, live_photo_movie } => {
                self.tracker.mark_capturing(id)?;
                if live_photo_movie {
                    self.tracker.on_live_photo_companion_started(id)?;
                }
            }
            CaptureEvent::WillCapturePhoto { id } => self.emit(SessionEvent::ShutterFired(id)),
            CaptureEvent::PhotoProcessed { id, result } => {
                if let Err(e) = &result {
                    warn!(request = %id, error = %e, "Error capturing photo");
                }
                self.tracker.record_photo_data(id, result)?;
            }
            CaptureEvent::LivePhotoMovieRecorded { id } => {
                self.tracker.on_live_photo_companion_finished(id)?;
                self.tracker.mark_finalizing(id)?;
            }
            CaptureEvent::LivePhotoMovieProcessed { id, result } => match result {
                Ok(path) => self.tracker.record_companion_movie(id, path)?,
                Err(e) => warn!(request = %id, error = %e, "Error processing Live Photo companion movie"),
            },
            CaptureEvent::CaptureFinished { id, error } => {
                let outcome = match error {
                    Some(e) => Err(e),
                    None => self.tracker.take_photo_artifact(id),
                };
                self.finish_request(id, outcome);
            }
            CaptureEvent::RecordingStarted { id, path } => {
                self.tracker.mark_capturing(id)?;
                debug!(request = %id, path = %path.display(), "Recording started");
                self.emit(SessionEvent::RecordingStarted(id));
            }
            CaptureEvent::RecordingFinished {
                id,
                path,
                error,
                finished_successfully,
            } => {
                let outcome = match error {
                    Some(e) if !finished_successfully => Err(e),
                    Some(e) => {
                        info!(request = %id, error = %e, "Recording reported an error but the movie is usable");
                        Ok(CaptureArtifact::Movie { path })
                    }
                    None => Ok(CaptureArtifact::Movie { path }),
                };
                self.finish_request(id, outcome);
                self.emit(SessionEvent::RecordingFinished(id));
            }
        }
        Ok(())
    }

    /// Persist, then complete the request and notify observers
    fn finish_request(&mut self, id: RequestId, outcome: CaptureOutcome) {
        let Some(kind) = self
            .tracker
            .get(id)
            .filter(|r| !r.state.is_terminal())
            .map(|r| r.kind)
        else {
            // Let the tracker report the unknown or repeated completion
            if let Err(e) = self.tracker.complete_request(id, outcome) {
                debug!(request = %id, error = %e, "Completion ignored");
            }
            return;
        };

        if let Ok(artifact) = &outcome {
            self.persist(id, artifact);
        }
        let event = match &outcome {
            Ok(_) => SessionEvent::CaptureCompleted { id, kind },
            Err(error) => SessionEvent::CaptureFailed {
                id,
                error: error.clone(),
            },
        };

        match self.tracker.complete_request(id, outcome) {
            Ok(state) => {
                info!(request = %id, ?kind, ?state, "Capture finished");
                self.emit(event);
            }
            Err(e) => error!(request = %id, error = %e, "Capture completion rejected"),
        }
    }

    fn persist(&mut self, id: RequestId, artifact: &CaptureArtifact) {
        if !self.config.save_captures_to_library {
            return;
        }
        let location = if self.config.tag_location_in_captures && self.authorizations.location.is_authorized() {
            self.location.as_ref().and_then(|provider| provider.current_location())
        } else {
            None
        };
        let Some(sink) = self.persistence.as_mut() else {
            debug!(request = %id, "No library configured, skipping save");
            return;
        };

        match sink.save(artifact, location) {
            Ok(()) => debug!(request = %id, tagged = location.is_some(), "Capture saved"),
            Err(error) => {
                warn!(request = %id, error = %error, "Couldn't save capture to library");
                self.emit(SessionEvent::PersistenceFailed { id, error });
            }
        }
    }

    // ===== Hardware notifications =====

    fn handle_notification(&mut self, notification: HardwareNotification) {
        match notification {
            HardwareNotification::Interrupted(reason) => {
                if self.interruption.on_interrupted(reason) {
                    info!(?reason, "Capture session interrupted");
                    self.emit(SessionEvent::InterruptionChanged(self.interruption.state()));
                }
            }
            HardwareNotification::InterruptionEnded => {
                if self.interruption.on_interruption_ended() {
                    info!("Capture session interruption ended");
                    self.emit(SessionEvent::InterruptionChanged(self.interruption.state()));
                }
            }
            HardwareNotification::RuntimeError(code) => {
                let action = self.interruption.on_runtime_error(code, self.session.is_running);
                self.session.is_running = self.backend.is_running();
                self.sync_running_state();
                self.emit(SessionEvent::InterruptionChanged(self.interruption.state()));
                if action == RecoveryAction::RestartSession {
                    self.enqueue(Command::RecoverFromRuntimeError);
                }
            }
            HardwareNotification::OrientationChanged(orientation) => self.orientation_changed(orientation),
            HardwareNotification::SubjectAreaChanged => self.subject_area_changed(),
        }
    }

    fn recover_from_runtime_error(&mut self) {
        let running = match self.backend.start_running() {
            Ok(()) => self.backend.is_running(),
            Err(e) => {
                warn!(error = %e, "Restart after media services reset failed");
                false
            }
        };
        self.session.is_running = running;
        self.interruption.on_restart_finished(running);
        self.sync_running_state();
        info!(running, "Session restart finished");
        self.emit(SessionEvent::InterruptionChanged(self.interruption.state()));
        self.emit(SessionEvent::RunningChanged(running));
    }

    fn resume_interrupted_session(&mut self) -> SessionResult<()> {
        self.ensure_configured()?;
        if !self.authorizations.camera.is_authorized() {
            return Err(SessionError::PermissionDenied);
        }
        if !self.interruption.begin_resume() {
            debug!("Nothing to resume");
            return Ok(());
        }
        self.publish();

        let running = match self.backend.start_running() {
            Ok(()) => self.backend.is_running(),
            Err(e) => {
                warn!(error = %e, "Could not resume the session");
                false
            }
        };
        self.session.is_running = running;
        self.interruption.finish_resume(running);
        self.sync_running_state();
        self.emit(SessionEvent::InterruptionChanged(self.interruption.state()));

        if running {
            info!("Session resumed");
            self.emit(SessionEvent::RunningChanged(true));
            Ok(())
        } else {
            self.emit(SessionEvent::CameraUnavailable);
            Err(SessionError::CameraUnavailable)
        }
    }

    fn orientation_changed(&mut self, orientation: DeviceOrientation) {
        match CaptureOrientation::from_device(orientation) {
            Some(capture) => {
                if capture != self.orientation {
                    debug!(?orientation, ?capture, "Capture orientation changed");
                    self.orientation = capture;
                    self.refresh_photo_settings();
                }
            }
            None => debug!(?orientation, "Keeping last capture orientation"),
        }
    }
}

fn reply<T>(respond_to: oneshot::Sender<T>, value: T) {
    if respond_to.send(value).is_err() {
        debug!("Caller went away before the reply");
    }
}

/// Find the 10-bit variant of the staged active format, switching to it when
/// HDR video is on
fn negotiate_hdr_format(txn: &mut Transaction<'_>, hdr_on: bool) -> Option<CameraFormat> {
    let device = txn.session().video_input.as_ref()?;
    let active = device.active_format.as_ref()?;
    let variant = selection::ten_bit_variant(&device.formats, active)?;

    if hdr_on && let Err(e) = txn.set_active_format(variant.clone()) {
        warn!(error = %e, "Could not switch to the 10-bit format");
    }
    Some(variant)
}
