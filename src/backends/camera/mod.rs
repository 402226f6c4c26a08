// SPDX-License-Identifier: MPL-2.0

//! Camera backend abstraction
//!
//! The session worker drives hardware exclusively through [`CameraBackend`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │    SessionHandle    │  ← Any thread, async
//! └──────────┬──────────┘
//!            │ commands
//!            ▼
//! ┌─────────────────────┐
//! │  SessionController  │  ← Single worker thread, transactions
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │  CameraBackend Trait│  ← Device provider + session + output sink
//! └──────────┬──────────┘
//!            │
//!            ▼
//!      ┌───────────┐
//!      │ Simulated │  ← In-process implementation
//!      └───────────┘
//! ```

pub mod device_lock;
pub mod simulated;
pub mod types;

pub use device_lock::{DeviceLock, with_device_lock};
pub use simulated::SimulatedBackend;
pub use types::*;

use crate::capture::{CaptureEventSender, RequestId};
use crate::session::photo_settings::PhotoSettings;
use std::path::Path;

/// Complete camera backend trait
///
/// Only the session worker calls these methods, one at a time. Configuration
/// calls between [`begin_configuration`](CameraBackend::begin_configuration)
/// and [`commit_configuration`](CameraBackend::commit_configuration) take
/// effect together at commit.
pub trait CameraBackend: Send {
    // ===== Enumeration =====

    /// Enumerate connected devices carrying `media`
    fn devices(&self, media: MediaType) -> Vec<CameraDevice>;

    /// System default device for `media`
    fn default_device(&self, media: MediaType) -> Option<CameraDevice>;

    // ===== Session configuration =====

    fn begin_configuration(&mut self);

    fn commit_configuration(&mut self);

    /// Select a preset
    ///
    /// A preset replaces any explicitly selected format on attached video
    /// inputs with the device default.
    fn set_preset(&mut self, preset: SessionPreset);

    fn can_add_input(&self, device: &CameraDevice) -> bool;

    /// Attach a device as an input
    ///
    /// # Returns
    /// * `Err(BackendError::InputRejected)` - The device is in use or unsupported
    fn add_input(&mut self, device: &CameraDevice) -> BackendResult<()>;

    fn remove_input(&mut self, device: &DeviceId);

    fn can_add_output(&self, output: OutputKind) -> bool;

    fn add_output(&mut self, output: OutputKind) -> BackendResult<()>;

    fn remove_output(&mut self, output: OutputKind);

    fn configure_photo_output(&mut self, config: &PhotoOutputConfig);

    /// Whether the attached photo output can record Live Photo companions
    fn live_photo_supported(&self) -> bool;

    /// Codecs the photo output can encode
    fn available_photo_codecs(&self) -> Vec<PhotoCodec>;

    fn video_stabilization_supported(&self) -> bool;

    fn set_video_stabilization(&mut self, mode: VideoStabilizationMode);

    // ===== Running =====

    /// Start the session; blocks until the pipeline is running or failed
    fn start_running(&mut self) -> BackendResult<()>;

    fn stop_running(&mut self);

    fn is_running(&self) -> bool;

    // ===== Device configuration =====

    /// Acquire the device configuration lock
    fn lock_for_configuration(&mut self, device: &DeviceId) -> BackendResult<()>;

    fn unlock_for_configuration(&mut self, device: &DeviceId);

    /// Apply a setting; the device must be locked
    fn apply_device_setting(&mut self, device: &DeviceId, setting: DeviceSetting) -> BackendResult<()>;

    /// Format the device is currently using
    fn active_format(&self, device: &DeviceId) -> Option<CameraFormat>;

    // ===== Capture =====

    /// Begin a photo capture
    ///
    /// Progress is reported through `events`, ending with
    /// `CaptureEvent::CaptureFinished` for `settings.unique_id`.
    fn capture_photo(&mut self, settings: &PhotoSettings, events: CaptureEventSender) -> BackendResult<()>;

    /// Begin recording a movie to `path`
    ///
    /// Progress is reported through `events`, ending with
    /// `CaptureEvent::RecordingFinished` for `request`.
    fn start_recording(
        &mut self,
        request: RequestId,
        path: &Path,
        orientation: CaptureOrientation,
        events: CaptureEventSender,
    ) -> BackendResult<()>;

    /// Stop the active recording; completion arrives as an event
    fn stop_recording(&mut self) -> BackendResult<()>;
}
