// SPDX-License-Identifier: GPL-3.0-only

//! Scoped device configuration lock
//!
//! Zoom, focus/exposure and format changes all go through [`DeviceLock`]. The
//! lock is released when the guard drops, on success and failure alike.

use super::{CameraBackend, DeviceId, DeviceSetting};
use crate::errors::DeviceConfigError;
use tracing::{debug, warn};

pub struct DeviceLock<'a> {
    backend: &'a mut dyn CameraBackend,
    device: DeviceId,
}

impl<'a> DeviceLock<'a> {
    /// Lock `device`; failure leaves the device untouched
    pub fn acquire(backend: &'a mut dyn CameraBackend, device: &DeviceId) -> Result<Self, DeviceConfigError> {
        backend.lock_for_configuration(device).map_err(|e| {
            warn!(device = %device, error = %e, "Could not lock device for configuration");
            DeviceConfigError::LockFailed {
                device: device.to_string(),
                reason: e.to_string(),
            }
        })?;
        debug!(device = %device, "Device locked for configuration");

        Ok(Self {
            backend,
            device: device.clone(),
        })
    }

    pub fn apply(&mut self, setting: DeviceSetting) -> Result<(), DeviceConfigError> {
        self.backend
            .apply_device_setting(&self.device, setting)
            .map_err(DeviceConfigError::from)
    }
}

impl Drop for DeviceLock<'_> {
    fn drop(&mut self) {
        self.backend.unlock_for_configuration(&self.device);
        debug!(device = %self.device, "Device unlocked");
    }
}

/// Lock `device`, run `mutate`, unlock
pub fn with_device_lock<T>(
    backend: &mut dyn CameraBackend,
    device: &DeviceId,
    mutate: impl FnOnce(&mut DeviceLock<'_>) -> Result<T, DeviceConfigError>,
) -> Result<T, DeviceConfigError> {
    let mut lock = DeviceLock::acquire(backend, device)?;
    mutate(&mut lock)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::SimulatedBackend;
    use crate::backends::camera::types::{CameraFormat, PixelFormat};

    #[test]
    fn test_lock_released_after_failed_mutation() {
        let control = SimulatedBackend::with_default_devices();
        let mut backend = control.clone();
        let device = DeviceId::new(SimulatedBackend::BACK_DUAL);

        let bogus = CameraFormat::new(1, 1, 1, PixelFormat::Bgra);
        let result = with_device_lock(&mut backend, &device, |lock| {
            lock.apply(DeviceSetting::ActiveFormat(bogus))
        });

        assert!(matches!(result, Err(DeviceConfigError::Unsupported(_))));
        assert!(!control.is_locked(&device));
        assert_eq!(control.lock_count(), 1);
    }

    #[test]
    fn test_lock_failure_skips_mutation() {
        let control = SimulatedBackend::with_default_devices();
        let mut backend = control.clone();
        let device = DeviceId::new(SimulatedBackend::BACK_DUAL);
        control.fail_lock(&device, true);

        let mut ran = false;
        let result = with_device_lock(&mut backend, &device, |_| {
            ran = true;
            Ok(())
        });

        assert!(matches!(result, Err(DeviceConfigError::LockFailed { .. })));
        assert!(!ran);
        assert!(!control.is_locked(&device));
    }

    #[test]
    fn test_zoom_applied_under_lock() {
        let control = SimulatedBackend::with_default_devices();
        let mut backend = control.clone();
        let device = DeviceId::new(SimulatedBackend::BACK_DUAL);

        with_device_lock(&mut backend, &device, |lock| {
            lock.apply(DeviceSetting::ZoomFactor(2.0))
        })
        .unwrap();

        assert_eq!(control.zoom_factor(&device), Some(2.0));
        assert!(!control.is_locked(&device));
    }
}
