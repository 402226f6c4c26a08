// SPDX-License-Identifier: GPL-3.0-only

//! Atomic session reconfiguration
//!
//! A [`Transaction`] stages changes against a copy of the [`Session`] and
//! records how to undo each one. `commit` publishes the staged session;
//! dropping the transaction without committing replays the journal backwards
//! so the backend ends up where it started.

use super::state::Session;
use crate::backends::camera::types::{
    BackendError, BackendResult, CameraDevice, CameraFormat, DeviceId, DeviceSetting, MediaType,
    OutputKind, PhotoOutputConfig, SessionPreset, VideoStabilizationMode,
};
use crate::backends::camera::{CameraBackend, with_device_lock};
use crate::constants::QualityPrioritization;
use crate::errors::DeviceConfigError;
use tracing::{debug, error, warn};

enum Undo {
    Preset(SessionPreset),
    AddedInput(DeviceId),
    RemovedInput(CameraDevice),
    AddedOutput(OutputKind),
    RemovedOutput(OutputKind),
    PhotoOutput(PhotoOutputConfig),
    ActiveFormat { device: DeviceId, format: CameraFormat },
    Stabilization(VideoStabilizationMode),
}

pub struct Transaction<'a> {
    backend: &'a mut dyn CameraBackend,
    staged: Session,
    journal: Vec<Undo>,
    finished: bool,
}

impl<'a> Transaction<'a> {
    pub fn begin(backend: &'a mut dyn CameraBackend, current: &Session) -> Self {
        backend.begin_configuration();
        debug!("Session configuration started");
        Self {
            backend,
            staged: current.clone(),
            journal: Vec::new(),
            finished: false,
        }
    }

    pub fn session(&self) -> &Session {
        &self.staged
    }

    pub fn set_preset(&mut self, preset: SessionPreset) {
        if self.staged.preset == preset {
            return;
        }
        self.journal.push(Undo::Preset(self.staged.preset));
        self.apply_preset(preset);
    }

    /// Apply the current preset again, resetting the video input to its
    /// default format
    pub fn reapply_preset(&mut self) {
        if let Some(device) = self.staged.video_input.as_ref()
            && let Some(format) = device.active_format.clone()
        {
            self.journal.push(Undo::ActiveFormat {
                device: device.id.clone(),
                format,
            });
        }
        self.apply_preset(self.staged.preset);
    }

    fn apply_preset(&mut self, preset: SessionPreset) {
        self.backend.set_preset(preset);
        self.staged.preset = preset;

        // Preset changes can replace the device's active format
        if let Some(device) = self.staged.video_input.as_mut() {
            device.active_format = self.backend.active_format(&device.id);
        }
    }

    pub fn add_input(&mut self, device: CameraDevice) -> BackendResult<()> {
        if !self.backend.can_add_input(&device) {
            return Err(BackendError::InputRejected(device.id.to_string()));
        }
        self.backend.add_input(&device)?;
        self.journal.push(Undo::AddedInput(device.id.clone()));

        let active_format = self
            .backend
            .active_format(&device.id)
            .or_else(|| device.active_format.clone());
        let media = device.media;
        *self.staged.input_slot(media) = Some(CameraDevice {
            active_format,
            ..device
        });
        Ok(())
    }

    pub fn remove_input(&mut self, media: MediaType) -> Option<CameraDevice> {
        let device = self.staged.input_slot(media).take()?;
        self.backend.remove_input(&device.id);
        self.journal.push(Undo::RemovedInput(device.clone()));
        Some(device)
    }

    pub fn add_output(&mut self, output: OutputKind) -> BackendResult<()> {
        if self.staged.outputs.contains(output) {
            return Ok(());
        }
        if !self.backend.can_add_output(output) {
            return Err(BackendError::OutputRejected(format!("{:?}", output)));
        }
        self.backend.add_output(output)?;
        self.journal.push(Undo::AddedOutput(output));
        self.staged.outputs.set(output, true);
        Ok(())
    }

    pub fn remove_output(&mut self, output: OutputKind) -> bool {
        if !self.staged.outputs.contains(output) {
            return false;
        }
        self.backend.remove_output(output);
        self.journal.push(Undo::RemovedOutput(output));
        self.staged.outputs.set(output, false);
        true
    }

    /// Re-derive the photo output from the staged device and outputs
    ///
    /// Live Photo is only enabled while no movie output is attached.
    pub fn configure_photo_output(&mut self) {
        let max_dimensions = self
            .staged
            .video_input
            .as_ref()
            .and_then(|d| d.active_format.as_ref())
            .and_then(|f| f.max_photo_dimensions());
        let live_photo_enabled = self.backend.live_photo_supported() && !self.staged.outputs.movie;

        let config = PhotoOutputConfig {
            max_dimensions,
            live_photo_enabled,
            max_quality: QualityPrioritization::Quality,
        };
        if config == self.staged.photo_output {
            return;
        }

        self.journal.push(Undo::PhotoOutput(self.staged.photo_output.clone()));
        self.backend.configure_photo_output(&config);
        self.staged.photo_output = config;
    }

    /// Switch the staged video device's active format under its lock
    pub fn set_active_format(&mut self, format: CameraFormat) -> Result<(), DeviceConfigError> {
        let device = self
            .staged
            .video_input
            .as_ref()
            .ok_or(DeviceConfigError::NoActiveDevice)?;
        let id = device.id.clone();
        let previous = device.active_format.clone();

        let applied = format.clone();
        with_device_lock(&mut *self.backend, &id, |lock| {
            lock.apply(DeviceSetting::ActiveFormat(applied))
        })?;

        if let Some(previous) = previous {
            self.journal.push(Undo::ActiveFormat {
                device: id,
                format: previous,
            });
        }
        if let Some(device) = self.staged.video_input.as_mut() {
            device.active_format = Some(format);
        }
        Ok(())
    }

    /// Returns `false` when the connection has no stabilization support
    pub fn set_video_stabilization(&mut self, mode: VideoStabilizationMode) -> bool {
        if !self.backend.video_stabilization_supported() {
            return false;
        }
        if self.staged.stabilization != mode {
            self.journal.push(Undo::Stabilization(self.staged.stabilization));
            self.backend.set_video_stabilization(mode);
            self.staged.stabilization = mode;
        }
        true
    }

    pub fn commit(mut self) -> Session {
        self.backend.commit_configuration();
        self.journal.clear();
        self.finished = true;
        debug!("Session configuration committed");
        std::mem::take(&mut self.staged)
    }

    /// Undo every staged change and commit the restored configuration
    pub fn abort(mut self) {
        self.roll_back();
    }

    fn roll_back(&mut self) {
        let steps = self.journal.len();
        for undo in self.journal.drain(..).rev() {
            match undo {
                Undo::Preset(preset) => self.backend.set_preset(preset),
                Undo::AddedInput(device) => self.backend.remove_input(&device),
                Undo::RemovedInput(device) => {
                    if let Err(e) = self.backend.add_input(&device) {
                        error!(device = %device, error = %e, "Could not restore session input");
                    }
                }
                Undo::AddedOutput(output) => self.backend.remove_output(output),
                Undo::RemovedOutput(output) => {
                    if let Err(e) = self.backend.add_output(output) {
                        error!(?output, error = %e, "Could not restore session output");
                    }
                }
                Undo::PhotoOutput(config) => self.backend.configure_photo_output(&config),
                Undo::ActiveFormat { device, format } => {
                    let restored = with_device_lock(&mut *self.backend, &device, |lock| {
                        lock.apply(DeviceSetting::ActiveFormat(format))
                    });
                    if let Err(e) = restored {
                        warn!(device = %device, error = %e, "Could not restore active format");
                    }
                }
                Undo::Stabilization(mode) => self.backend.set_video_stabilization(mode),
            }
        }
        self.backend.commit_configuration();
        self.finished = true;
        warn!(steps, "Session configuration rolled back");
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.roll_back();
        }
    }
}
