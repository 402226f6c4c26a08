// SPDX-License-Identifier: GPL-3.0-only

//! Device and format selection
//!
//! - [`device`]: which camera to attach or switch to
//! - [`format`]: which format variant to use for HDR video

pub mod device;
pub mod format;

pub use device::{can_change_camera, default_video_device, next_device};
pub use format::{clusters, ten_bit_variant};
