// SPDX-License-Identifier: GPL-3.0-only

//! Photo capture settings
//!
//! The controller keeps one derived template and hands each capture a unique
//! copy, so overlapping captures never share an id or a companion movie path.

use crate::backends::camera::types::{
    CameraDevice, CaptureOrientation, Dimensions, FlashMode, PhotoCodec, PhotoOutputConfig,
};
use crate::capture::RequestId;
use crate::constants::{QualityPrioritization, TEMP_MOVIE_EXTENSION};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub struct PhotoSettings {
    /// Identity of the capture; also the request id
    pub unique_id: RequestId,
    pub codec: PhotoCodec,
    /// `None` when the device has no flash
    pub flash_mode: Option<FlashMode>,
    pub max_dimensions: Option<Dimensions>,
    /// Where the companion movie goes when a Live Photo is requested
    pub live_photo_movie_path: Option<PathBuf>,
    pub quality: QualityPrioritization,
    pub orientation: CaptureOrientation,
}

/// Everything photo settings are derived from
#[derive(Debug, Clone, Copy)]
pub struct PhotoSettingsInputs<'a> {
    pub codecs: &'a [PhotoCodec],
    pub device: Option<&'a CameraDevice>,
    pub photo_output: &'a PhotoOutputConfig,
    pub flash_mode: FlashMode,
    pub live_photo_on: bool,
    pub quality: QualityPrioritization,
    pub orientation: CaptureOrientation,
    pub temp_dir: &'a Path,
}

impl PhotoSettings {
    pub fn derive(inputs: &PhotoSettingsInputs<'_>) -> Self {
        let codec = if inputs.codecs.contains(&PhotoCodec::Hevc) {
            PhotoCodec::Hevc
        } else {
            PhotoCodec::Jpeg
        };

        let flash_mode = inputs
            .device
            .filter(|d| d.capabilities.supports_flash_mode(inputs.flash_mode))
            .map(|_| inputs.flash_mode);

        let max_dimensions = inputs
            .device
            .and_then(|d| d.active_format.as_ref())
            .and_then(|f| f.max_photo_dimensions())
            .or(inputs.photo_output.max_dimensions);

        let live_photo_movie_path = (inputs.live_photo_on && inputs.photo_output.live_photo_enabled)
            .then(|| unique_temporary_path(inputs.temp_dir));

        Self {
            unique_id: RequestId::next(),
            codec,
            flash_mode,
            max_dimensions,
            live_photo_movie_path,
            quality: inputs.quality.capped_at(inputs.photo_output.max_quality),
            orientation: inputs.orientation,
        }
    }

    /// Copy with a fresh identity and companion movie path
    pub fn unique_copy(&self, temp_dir: &Path) -> Self {
        Self {
            unique_id: RequestId::next(),
            live_photo_movie_path: self
                .live_photo_movie_path
                .as_ref()
                .map(|_| unique_temporary_path(temp_dir)),
            ..self.clone()
        }
    }

    pub fn requests_live_photo(&self) -> bool {
        self.live_photo_movie_path.is_some()
    }
}

/// Fresh `<uuid>.mov` path inside `dir`
pub fn unique_temporary_path(dir: &Path) -> PathBuf {
    dir.join(uuid::Uuid::new_v4().to_string())
        .with_extension(TEMP_MOVIE_EXTENSION)
}
