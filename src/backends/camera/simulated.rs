// SPDX-License-Identifier: GPL-3.0-only

//! In-process camera backend
//!
//! Models a phone-like device set (dual and wide back cameras, a TrueDepth
//! front camera, a microphone). Captures run on short-lived threads and
//! report progress through the injected [`CaptureEventSender`], so photo
//! requests genuinely overlap. Clones share state: keep one clone to inspect
//! the backend or inject faults while the session owns another.

use super::types::*;
use super::CameraBackend;
use crate::capture::{CaptureEvent, CaptureEventSender, RequestId};
use crate::constants::{timing, SIMULATED_MOVIE_PAYLOAD, SIMULATED_PHOTO_PAYLOAD};
use crate::errors::CaptureError;
use crate::session::photo_settings::PhotoSettings;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

struct ActiveRecording {
    id: RequestId,
    path: PathBuf,
    events: CaptureEventSender,
}

struct SimulatedState {
    devices: Vec<CameraDevice>,
    default_video: Option<DeviceId>,
    inputs: Vec<DeviceId>,
    outputs: Vec<OutputKind>,
    preset: SessionPreset,
    running: bool,
    configuration_depth: u32,
    commits: usize,
    photo_output: PhotoOutputConfig,
    live_photo_hardware: bool,
    codecs: Vec<PhotoCodec>,
    stabilization: VideoStabilizationMode,
    active_formats: HashMap<DeviceId, CameraFormat>,
    zoom: HashMap<DeviceId, f64>,
    focus: HashMap<DeviceId, (FocusMode, DevicePoint)>,
    exposure: HashMap<DeviceId, (ExposureMode, DevicePoint)>,
    subject_area_monitoring: HashMap<DeviceId, bool>,
    locked: HashSet<DeviceId>,
    lock_count: usize,
    recording: Option<ActiveRecording>,
    capture_delay: Duration,
    // Fault injection
    rejected_inputs: HashSet<DeviceId>,
    rejected_outputs: HashSet<OutputKind>,
    lock_failures: HashSet<DeviceId>,
    fail_start: bool,
    fail_captures: bool,
    fail_recordings: bool,
}

impl SimulatedState {
    fn device(&self, id: &DeviceId) -> Option<&CameraDevice> {
        self.devices.iter().find(|d| &d.id == id)
    }

    fn has_input_of(&self, media: MediaType) -> bool {
        self.inputs
            .iter()
            .filter_map(|id| self.device(id))
            .any(|d| d.media == media)
    }

    /// Presets pick the device default format
    fn reset_formats_to_default(&mut self) {
        for id in &self.inputs {
            if let Some(default) = self
                .devices
                .iter()
                .find(|d| &d.id == id)
                .and_then(|d| d.active_format.clone())
            {
                self.active_formats.insert(id.clone(), default);
            }
        }
    }
}

#[derive(Clone)]
pub struct SimulatedBackend {
    state: Arc<Mutex<SimulatedState>>,
}

impl std::fmt::Debug for SimulatedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("SimulatedBackend")
            .field("devices", &state.devices.len())
            .field("inputs", &state.inputs)
            .field("outputs", &state.outputs)
            .field("running", &state.running)
            .finish()
    }
}

impl SimulatedBackend {
    pub const BACK_DUAL: &'static str = "back-dual";
    pub const BACK_WIDE: &'static str = "back-wide";
    pub const FRONT_TRUE_DEPTH: &'static str = "front-true-depth";
    pub const MICROPHONE: &'static str = "microphone";

    /// Backend with an explicit device list; the first video device is the
    /// system default
    pub fn new(devices: Vec<CameraDevice>) -> Self {
        let default_video = devices
            .iter()
            .find(|d| d.media == MediaType::Video)
            .map(|d| d.id.clone());
        let active_formats = devices
            .iter()
            .filter_map(|d| d.active_format.clone().map(|f| (d.id.clone(), f)))
            .collect();

        Self {
            state: Arc::new(Mutex::new(SimulatedState {
                devices,
                default_video,
                inputs: Vec::new(),
                outputs: Vec::new(),
                preset: SessionPreset::Photo,
                running: false,
                configuration_depth: 0,
                commits: 0,
                photo_output: PhotoOutputConfig::default(),
                live_photo_hardware: true,
                codecs: vec![PhotoCodec::Hevc, PhotoCodec::Jpeg],
                stabilization: VideoStabilizationMode::Off,
                active_formats,
                zoom: HashMap::new(),
                focus: HashMap::new(),
                exposure: HashMap::new(),
                subject_area_monitoring: HashMap::new(),
                locked: HashSet::new(),
                lock_count: 0,
                recording: None,
                capture_delay: timing::SIMULATED_CAPTURE_STAGE,
                rejected_inputs: HashSet::new(),
                rejected_outputs: HashSet::new(),
                lock_failures: HashSet::new(),
                fail_start: false,
                fail_captures: false,
                fail_recordings: false,
            })),
        }
    }

    /// Phone-like device set
    pub fn with_default_devices() -> Self {
        Self::new(default_devices())
    }

    fn state(&self) -> MutexGuard<'_, SimulatedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ===== Fault injection =====

    pub fn add_device(&self, device: CameraDevice) {
        let mut state = self.state();
        if let Some(format) = device.active_format.clone() {
            state.active_formats.insert(device.id.clone(), format);
        }
        state.devices.push(device);
    }

    pub fn remove_device(&self, id: &DeviceId) {
        let mut state = self.state();
        state.devices.retain(|d| &d.id != id);
        if state.default_video.as_ref() == Some(id) {
            state.default_video = None;
        }
    }

    pub fn reject_input(&self, id: &DeviceId, rejected: bool) {
        let mut state = self.state();
        if rejected {
            state.rejected_inputs.insert(id.clone());
        } else {
            state.rejected_inputs.remove(id);
        }
    }

    pub fn reject_output(&self, output: OutputKind, rejected: bool) {
        let mut state = self.state();
        if rejected {
            state.rejected_outputs.insert(output);
        } else {
            state.rejected_outputs.remove(&output);
        }
    }

    pub fn fail_lock(&self, id: &DeviceId, fail: bool) {
        let mut state = self.state();
        if fail {
            state.lock_failures.insert(id.clone());
        } else {
            state.lock_failures.remove(id);
        }
    }

    pub fn fail_start(&self, fail: bool) {
        self.state().fail_start = fail;
    }

    pub fn fail_captures(&self, fail: bool) {
        self.state().fail_captures = fail;
    }

    pub fn fail_recordings(&self, fail: bool) {
        self.state().fail_recordings = fail;
    }

    pub fn set_live_photo_hardware(&self, supported: bool) {
        self.state().live_photo_hardware = supported;
    }

    pub fn set_capture_delay(&self, delay: Duration) {
        self.state().capture_delay = delay;
    }

    /// Drop the pipeline without the session asking, as a media server crash would
    pub fn crash(&self) {
        self.state().running = false;
    }

    // ===== Inspection =====

    pub fn inputs(&self) -> Vec<DeviceId> {
        self.state().inputs.clone()
    }

    pub fn outputs(&self) -> Vec<OutputKind> {
        self.state().outputs.clone()
    }

    pub fn preset(&self) -> SessionPreset {
        self.state().preset
    }

    pub fn photo_output(&self) -> PhotoOutputConfig {
        self.state().photo_output.clone()
    }

    pub fn stabilization(&self) -> VideoStabilizationMode {
        self.state().stabilization
    }

    pub fn zoom_factor(&self, id: &DeviceId) -> Option<f64> {
        self.state().zoom.get(id).copied()
    }

    pub fn focus(&self, id: &DeviceId) -> Option<(FocusMode, DevicePoint)> {
        self.state().focus.get(id).copied()
    }

    pub fn exposure(&self, id: &DeviceId) -> Option<(ExposureMode, DevicePoint)> {
        self.state().exposure.get(id).copied()
    }

    pub fn subject_area_monitoring(&self, id: &DeviceId) -> Option<bool> {
        self.state().subject_area_monitoring.get(id).copied()
    }

    pub fn is_locked(&self, id: &DeviceId) -> bool {
        self.state().locked.contains(id)
    }

    /// Total lock acquisitions so far
    pub fn lock_count(&self) -> usize {
        self.state().lock_count
    }

    pub fn commit_count(&self) -> usize {
        self.state().commits
    }

    pub fn is_configuring(&self) -> bool {
        self.state().configuration_depth > 0
    }
}

impl CameraBackend for SimulatedBackend {
    fn devices(&self, media: MediaType) -> Vec<CameraDevice> {
        let state = self.state();
        state
            .devices
            .iter()
            .filter(|d| d.media == media)
            .map(|d| {
                let mut device = d.clone();
                if let Some(active) = state.active_formats.get(&d.id) {
                    device.active_format = Some(active.clone());
                }
                device
            })
            .collect()
    }

    fn default_device(&self, media: MediaType) -> Option<CameraDevice> {
        let default_video = self.state().default_video.clone();
        let devices = self.devices(media);
        match media {
            MediaType::Video => default_video.and_then(|id| devices.into_iter().find(|d| d.id == id)),
            MediaType::Audio => devices.into_iter().next(),
        }
    }

    fn begin_configuration(&mut self) {
        self.state().configuration_depth += 1;
    }

    fn commit_configuration(&mut self) {
        let mut state = self.state();
        state.configuration_depth = state.configuration_depth.saturating_sub(1);
        state.commits += 1;
        debug!(inputs = ?state.inputs, outputs = ?state.outputs, preset = ?state.preset, "Simulated configuration committed");
    }

    fn set_preset(&mut self, preset: SessionPreset) {
        let mut state = self.state();
        state.preset = preset;
        state.reset_formats_to_default();
    }

    fn can_add_input(&self, device: &CameraDevice) -> bool {
        let state = self.state();
        state.device(&device.id).is_some()
            && !state.rejected_inputs.contains(&device.id)
            && !state.has_input_of(device.media)
    }

    fn add_input(&mut self, device: &CameraDevice) -> BackendResult<()> {
        if !self.can_add_input(device) {
            return Err(BackendError::InputRejected(device.id.to_string()));
        }
        self.state().inputs.push(device.id.clone());
        Ok(())
    }

    fn remove_input(&mut self, device: &DeviceId) {
        self.state().inputs.retain(|id| id != device);
    }

    fn can_add_output(&self, output: OutputKind) -> bool {
        let state = self.state();
        !state.rejected_outputs.contains(&output) && !state.outputs.contains(&output)
    }

    fn add_output(&mut self, output: OutputKind) -> BackendResult<()> {
        if !self.can_add_output(output) {
            return Err(BackendError::OutputRejected(format!("{:?}", output)));
        }
        self.state().outputs.push(output);
        Ok(())
    }

    fn remove_output(&mut self, output: OutputKind) {
        self.state().outputs.retain(|o| *o != output);
    }

    fn configure_photo_output(&mut self, config: &PhotoOutputConfig) {
        self.state().photo_output = config.clone();
    }

    fn live_photo_supported(&self) -> bool {
        let state = self.state();
        state.live_photo_hardware
            && state.outputs.contains(&OutputKind::Photo)
            && !state.outputs.contains(&OutputKind::Movie)
    }

    fn available_photo_codecs(&self) -> Vec<PhotoCodec> {
        self.state().codecs.clone()
    }

    fn video_stabilization_supported(&self) -> bool {
        let state = self.state();
        state
            .inputs
            .iter()
            .filter_map(|id| state.device(id))
            .any(|d| d.media == MediaType::Video && d.capabilities.video_stabilization_supported)
    }

    fn set_video_stabilization(&mut self, mode: VideoStabilizationMode) {
        self.state().stabilization = mode;
    }

    fn start_running(&mut self) -> BackendResult<()> {
        let mut state = self.state();
        if state.fail_start {
            return Err(BackendError::StartFailed("simulated start failure".to_string()));
        }
        if !state.has_input_of(MediaType::Video) {
            return Err(BackendError::StartFailed("no video input".to_string()));
        }
        state.running = true;
        info!("Simulated session running");
        Ok(())
    }

    fn stop_running(&mut self) {
        self.state().running = false;
    }

    fn is_running(&self) -> bool {
        self.state().running
    }

    fn lock_for_configuration(&mut self, device: &DeviceId) -> BackendResult<()> {
        let mut state = self.state();
        if state.lock_failures.contains(device) {
            return Err(BackendError::LockFailed(device.to_string()));
        }
        if state.device(device).is_none() {
            return Err(BackendError::DeviceNotFound(device.to_string()));
        }
        state.locked.insert(device.clone());
        state.lock_count += 1;
        Ok(())
    }

    fn unlock_for_configuration(&mut self, device: &DeviceId) {
        self.state().locked.remove(device);
    }

    fn apply_device_setting(&mut self, device: &DeviceId, setting: DeviceSetting) -> BackendResult<()> {
        let mut state = self.state();
        if !state.locked.contains(device) {
            return Err(BackendError::LockFailed(format!("{} is not locked", device)));
        }

        match setting {
            DeviceSetting::ActiveFormat(format) => {
                let supported = state
                    .device(device)
                    .is_some_and(|d| d.formats.contains(&format));
                if !supported {
                    return Err(BackendError::FormatNotSupported(format.to_string()));
                }
                state.active_formats.insert(device.clone(), format);
            }
            DeviceSetting::Focus { mode, point } => {
                state.focus.insert(device.clone(), (mode, point));
            }
            DeviceSetting::Exposure { mode, point } => {
                state.exposure.insert(device.clone(), (mode, point));
            }
            DeviceSetting::SubjectAreaMonitoring(enabled) => {
                state.subject_area_monitoring.insert(device.clone(), enabled);
            }
            DeviceSetting::ZoomFactor(factor) => {
                state.zoom.insert(device.clone(), factor);
            }
        }
        Ok(())
    }

    fn active_format(&self, device: &DeviceId) -> Option<CameraFormat> {
        self.state().active_formats.get(device).cloned()
    }

    fn capture_photo(&mut self, settings: &PhotoSettings, events: CaptureEventSender) -> BackendResult<()> {
        let (delay, fail) = {
            let state = self.state();
            if !state.outputs.contains(&OutputKind::Photo) {
                return Err(BackendError::NotAvailable("photo output is not attached".to_string()));
            }
            if !state.running {
                return Err(BackendError::NotAvailable("session is not running".to_string()));
            }
            (state.capture_delay, state.fail_captures)
        };

        let id = settings.unique_id;
        let live_movie = settings.live_photo_movie_path.clone();

        std::thread::Builder::new()
            .name("simulated-capture".to_string())
            .spawn(move || run_photo_capture(id, live_movie, delay, fail, events))
            .map_err(|e| BackendError::Other(e.to_string()))?;
        Ok(())
    }

    fn start_recording(
        &mut self,
        request: RequestId,
        path: &Path,
        orientation: CaptureOrientation,
        events: CaptureEventSender,
    ) -> BackendResult<()> {
        let mut state = self.state();
        if !state.outputs.contains(&OutputKind::Movie) {
            return Err(BackendError::NotAvailable("movie output is not attached".to_string()));
        }
        if state.recording.is_some() {
            return Err(BackendError::RecordingInProgress);
        }

        std::fs::write(path, SIMULATED_MOVIE_PAYLOAD)?;
        info!(request = %request, path = %path.display(), ?orientation, "Simulated recording started");

        events.send(CaptureEvent::RecordingStarted {
            id: request,
            path: path.to_path_buf(),
        });
        state.recording = Some(ActiveRecording {
            id: request,
            path: path.to_path_buf(),
            events,
        });
        Ok(())
    }

    fn stop_recording(&mut self) -> BackendResult<()> {
        let (recording, fail) = {
            let mut state = self.state();
            let recording = state.recording.take().ok_or(BackendError::NoRecordingInProgress)?;
            (recording, state.fail_recordings)
        };

        std::thread::Builder::new()
            .name("simulated-recording".to_string())
            .spawn(move || {
                std::thread::sleep(timing::SIMULATED_RECORDING_FINALIZE);
                let error = fail.then(|| CaptureError::Hardware("simulated encoder failure".to_string()));
                recording.events.send(CaptureEvent::RecordingFinished {
                    id: recording.id,
                    path: recording.path,
                    error,
                    finished_successfully: !fail,
                });
            })
            .map_err(|e| BackendError::Other(e.to_string()))?;
        Ok(())
    }
}

fn run_photo_capture(
    id: RequestId,
    live_movie: Option<PathBuf>,
    delay: Duration,
    fail: bool,
    events: CaptureEventSender,
) {
    events.send(CaptureEvent::WillBeginCapture {
        id,
        live_photo_movie: live_movie.is_some(),
    });
    std::thread::sleep(delay);
    events.send(CaptureEvent::WillCapturePhoto { id });

    if fail {
        if live_movie.is_some() {
            events.send(CaptureEvent::LivePhotoMovieRecorded { id });
        }
        events.send(CaptureEvent::CaptureFinished {
            id,
            error: Some(CaptureError::Hardware("simulated sensor failure".to_string())),
        });
        return;
    }

    std::thread::sleep(delay);
    events.send(CaptureEvent::PhotoProcessed {
        id,
        result: Ok(SIMULATED_PHOTO_PAYLOAD.to_vec()),
    });

    if let Some(path) = live_movie {
        std::thread::sleep(delay);
        events.send(CaptureEvent::LivePhotoMovieRecorded { id });
        let result = std::fs::write(&path, SIMULATED_MOVIE_PAYLOAD)
            .map(|_| path)
            .map_err(|e| {
                warn!(request = %id, error = %e, "Could not write companion movie");
                CaptureError::Hardware(e.to_string())
            });
        events.send(CaptureEvent::LivePhotoMovieProcessed { id, result });
    }

    events.send(CaptureEvent::CaptureFinished { id, error: None });
}

fn default_devices() -> Vec<CameraDevice> {
    let photo_dims = |w, h| vec![Dimensions::new(w / 2, h / 2), Dimensions::new(w, h)];

    let dual_formats = vec![
        CameraFormat::new(1280, 720, 30, PixelFormat::Yuv420VideoRange).with_max_zoom(4.0),
        CameraFormat::new(1280, 720, 30, PixelFormat::Yuv420FullRange).with_max_zoom(4.0),
        CameraFormat::new(1920, 1080, 30, PixelFormat::Yuv420VideoRange)
            .with_max_zoom(6.0)
            .with_photo_dimensions(photo_dims(4032, 3024)),
        CameraFormat::new(1920, 1080, 30, PixelFormat::Yuv420TenBitVideoRange)
            .with_max_zoom(6.0)
            .with_photo_dimensions(photo_dims(4032, 3024)),
        CameraFormat::new(3840, 2160, 30, PixelFormat::Yuv420VideoRange)
            .with_max_zoom(6.0)
            .with_photo_dimensions(photo_dims(4032, 3024)),
    ];
    let dual_active = dual_formats[2].clone();

    let wide_formats = vec![
        CameraFormat::new(1920, 1080, 30, PixelFormat::Yuv420VideoRange)
            .with_max_zoom(3.0)
            .with_photo_dimensions(photo_dims(4032, 3024)),
        CameraFormat::new(1920, 1080, 30, PixelFormat::Yuv420TenBitVideoRange)
            .with_max_zoom(3.0)
            .with_photo_dimensions(photo_dims(4032, 3024)),
    ];

    let front_formats = vec![
        CameraFormat::new(1280, 720, 30, PixelFormat::Yuv420VideoRange).with_max_zoom(2.0),
        CameraFormat::new(1920, 1080, 30, PixelFormat::Yuv420VideoRange)
            .with_max_zoom(2.0)
            .with_photo_dimensions(photo_dims(3088, 2316)),
    ];
    let front_active = front_formats[1].clone();
    let front_capabilities = DeviceCapabilities {
        flash_available: false,
        flash_modes: Vec::new(),
        focus_point_supported: false,
        exposure_point_supported: true,
        ..DeviceCapabilities::full()
    };

    vec![
        CameraDevice::video(
            SimulatedBackend::BACK_DUAL,
            "Back Dual Camera",
            DevicePosition::Back,
            DeviceType::DualCamera,
            dual_formats,
        )
        .with_active_format(dual_active),
        CameraDevice::video(
            SimulatedBackend::BACK_WIDE,
            "Back Camera",
            DevicePosition::Back,
            DeviceType::WideAngle,
            wide_formats,
        ),
        CameraDevice::video(
            SimulatedBackend::FRONT_TRUE_DEPTH,
            "Front TrueDepth Camera",
            DevicePosition::Front,
            DeviceType::TrueDepth,
            front_formats,
        )
        .with_active_format(front_active)
        .with_capabilities(front_capabilities),
        CameraDevice::microphone(SimulatedBackend::MICROPHONE, "Built-in Microphone"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_video_input_at_a_time() {
        let mut backend = SimulatedBackend::with_default_devices();
        let devices = backend.devices(MediaType::Video);

        backend.add_input(&devices[0]).unwrap();
        assert!(!backend.can_add_input(&devices[1]));
        assert!(matches!(
            backend.add_input(&devices[1]),
            Err(BackendError::InputRejected(_))
        ));

        backend.remove_input(&devices[0].id);
        assert!(backend.can_add_input(&devices[1]));
    }

    #[test]
    fn test_preset_resets_explicit_format() {
        let mut backend = SimulatedBackend::with_default_devices();
        let device = backend.default_device(MediaType::Video).unwrap();
        backend.add_input(&device).unwrap();

        let ten_bit = device.formats[3].clone();
        backend.lock_for_configuration(&device.id).unwrap();
        backend
            .apply_device_setting(&device.id, DeviceSetting::ActiveFormat(ten_bit.clone()))
            .unwrap();
        backend.unlock_for_configuration(&device.id);
        assert_eq!(backend.active_format(&device.id), Some(ten_bit));

        backend.set_preset(SessionPreset::High);
        assert_eq!(backend.active_format(&device.id), device.active_format);
    }

    #[test]
    fn test_live_photo_unsupported_with_movie_output() {
        let mut backend = SimulatedBackend::with_default_devices();
        backend.add_output(OutputKind::Photo).unwrap();
        assert!(backend.live_photo_supported());

        backend.add_output(OutputKind::Movie).unwrap();
        assert!(!backend.live_photo_supported());
    }
}
