// SPDX-License-Identifier: GPL-3.0-only

//! Video device selection
//!
//! Pure functions over a device list; nothing here touches the session.

use crate::backends::camera::types::{CameraDevice, DeviceId, DevicePosition, DeviceType, MediaType};
use std::collections::HashSet;

/// Discovery order for back-facing cameras
pub const BACK_DEVICE_TYPES: [DeviceType; 2] = [DeviceType::DualCamera, DeviceType::WideAngle];

/// Discovery order for front-facing cameras
pub const FRONT_DEVICE_TYPES: [DeviceType; 2] = [DeviceType::TrueDepth, DeviceType::WideAngle];

/// First video device at `position`, trying `device_types` in order
pub fn discover<'a>(
    devices: &'a [CameraDevice],
    device_types: &[DeviceType],
    position: DevicePosition,
) -> Option<&'a CameraDevice> {
    device_types.iter().find_map(|device_type| {
        devices.iter().find(|d| {
            d.media == MediaType::Video && d.position == position && d.device_type == *device_type
        })
    })
}

/// Pick the device to switch to from a camera at `current`
///
/// Leaving the back camera prefers an external camera over the front one.
/// Every other position returns to the back camera.
pub fn next_device(devices: &[CameraDevice], current: DevicePosition) -> Option<CameraDevice> {
    let next = match current {
        DevicePosition::Back => first_external(devices)
            .or_else(|| discover(devices, &FRONT_DEVICE_TYPES, DevicePosition::Front)),
        DevicePosition::Front | DevicePosition::Unspecified | DevicePosition::External => {
            discover(devices, &BACK_DEVICE_TYPES, DevicePosition::Back)
        }
    };
    next.cloned()
}

/// Device to attach during initial setup
///
/// A remembered device wins while it is still connected; otherwise the first
/// back-facing dual or wide-angle camera.
pub fn default_video_device(
    devices: &[CameraDevice],
    remembered: Option<&DeviceId>,
) -> Option<CameraDevice> {
    remembered
        .and_then(|id| find_device(devices, id))
        .or_else(|| discover(devices, &BACK_DEVICE_TYPES, DevicePosition::Back))
        .cloned()
}

/// Look a video device up by id
pub fn find_device<'a>(devices: &'a [CameraDevice], id: &DeviceId) -> Option<&'a CameraDevice> {
    devices
        .iter()
        .find(|d| d.media == MediaType::Video && &d.id == id)
}

/// Switching cameras only makes sense with more than one distinct position
pub fn can_change_camera(devices: &[CameraDevice]) -> bool {
    devices
        .iter()
        .filter(|d| d.media == MediaType::Video)
        .map(|d| d.position)
        .collect::<HashSet<_>>()
        .len()
        > 1
}

fn first_external(devices: &[CameraDevice]) -> Option<&CameraDevice> {
    devices
        .iter()
        .find(|d| d.media == MediaType::Video && d.position == DevicePosition::External)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(id: &str, position: DevicePosition, device_type: DeviceType) -> CameraDevice {
        CameraDevice::video(id, id, position, device_type, Vec::new())
    }

    fn phone_devices() -> Vec<CameraDevice> {
        vec![
            device("back-wide", DevicePosition::Back, DeviceType::WideAngle),
            device("back-dual", DevicePosition::Back, DeviceType::DualCamera),
            device("front-wide", DevicePosition::Front, DeviceType::WideAngle),
            device("front-depth", DevicePosition::Front, DeviceType::TrueDepth),
            CameraDevice::microphone("mic", "Microphone"),
        ]
    }

    #[test]
    fn test_front_goes_to_back_preferring_dual() {
        let next = next_device(&phone_devices(), DevicePosition::Front).unwrap();
        assert_eq!(next.id.as_str(), "back-dual");
    }

    #[test]
    fn test_back_goes_to_front_preferring_true_depth() {
        let next = next_device(&phone_devices(), DevicePosition::Back).unwrap();
        assert_eq!(next.id.as_str(), "front-depth");
    }

    #[test]
    fn test_back_prefers_external() {
        let mut devices = phone_devices();
        devices.push(device("usb", DevicePosition::External, DeviceType::External));

        let next = next_device(&devices, DevicePosition::Back).unwrap();
        assert_eq!(next.id.as_str(), "usb");

        let back = next_device(&devices, DevicePosition::External).unwrap();
        assert_eq!(back.position, DevicePosition::Back);
    }

    #[test]
    fn test_unspecified_goes_to_back() {
        let next = next_device(&phone_devices(), DevicePosition::Unspecified).unwrap();
        assert_eq!(next.position, DevicePosition::Back);
    }

    #[test]
    fn test_no_candidate() {
        let devices = vec![device("back-wide", DevicePosition::Back, DeviceType::WideAngle)];
        assert!(next_device(&devices, DevicePosition::Back).is_none());
        assert!(next_device(&[], DevicePosition::Front).is_none());
    }

    #[test]
    fn test_default_prefers_remembered_device() {
        let devices = phone_devices();
        let remembered = DeviceId::new("front-wide");
        let chosen = default_video_device(&devices, Some(&remembered)).unwrap();
        assert_eq!(chosen.id, remembered);
    }

    #[test]
    fn test_default_falls_back_to_back_discovery() {
        let devices = phone_devices();
        let gone = DeviceId::new("unplugged");
        assert_eq!(
            default_video_device(&devices, Some(&gone)).unwrap().id.as_str(),
            "back-dual"
        );
        assert_eq!(
            default_video_device(&devices, None).unwrap().id.as_str(),
            "back-dual"
        );

        let front_only = vec![device("front-wide", DevicePosition::Front, DeviceType::WideAngle)];
        assert!(default_video_device(&front_only, None).is_none());
    }

    #[test]
    fn test_can_change_camera_counts_positions() {
        assert!(can_change_camera(&phone_devices()));

        let back_only = vec![
            device("back-wide", DevicePosition::Back, DeviceType::WideAngle),
            device("back-dual", DevicePosition::Back, DeviceType::DualCamera),
            CameraDevice::microphone("mic", "Microphone"),
        ];
        assert!(!can_change_camera(&back_only));
    }
}
