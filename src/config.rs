// SPDX-License-Identifier: GPL-3.0-only

//! Persistent user preferences
//!
//! Stored as JSON under the platform config directory. A missing or corrupt
//! file yields the defaults.

use crate::backends::camera::types::{DeviceId, FlashMode};
use crate::constants::{APP_DIR_NAME, CONFIG_FILE_NAME, QualityPrioritization};
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Camera the user last picked, restored on the next setup
    pub preferred_camera: Option<DeviceId>,
    /// Set once the first default camera has been recorded
    pub initial_camera_set: bool,
    /// Attach the current location to saved captures
    pub tag_location_in_captures: bool,
    /// Hand finished captures to the persistence sink
    pub save_captures_to_library: bool,
    /// Delete temporary movie files as soon as their completion is delivered
    pub clean_up_movies_automatically: bool,
    /// HDR video preference applied when entering video mode
    pub hdr_video_enabled: bool,
    /// Live Photo preference applied when supported
    pub live_photo_enabled: bool,
    /// Photo quality prioritization used in photo mode
    pub photo_quality: QualityPrioritization,
    /// Flash mode for still captures
    pub flash_mode: FlashMode,
    /// Destination for the directory library (defaults to the pictures dir)
    pub library_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            preferred_camera: None,
            initial_camera_set: false,
            tag_location_in_captures: false,
            save_captures_to_library: false,
            clean_up_movies_automatically: true,
            hdr_video_enabled: true,
            live_photo_enabled: true,
            photo_quality: QualityPrioritization::default(),
            flash_mode: FlashMode::default(),
            library_dir: None,
        }
    }
}

impl Config {
    /// Default location: `<config_dir>/camera-session/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Parse a config file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        serde_json::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Load a config file, falling back to defaults when it is missing or corrupt
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Self::default();
        }

        match Self::load_from(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable config, using defaults");
                Self::default()
            }
        }
    }

    /// Write the config, creating parent directories as needed
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |message: String| ConfigError::Write {
            path: path.to_path_buf(),
            message,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
        }

        let json = serde_json::to_string_pretty(self).map_err(|e| write_err(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| write_err(e.to_string()))?;
        debug!(path = %path.display(), "Saved config");
        Ok(())
    }

    /// Remember a camera as the one to restore on the next setup
    pub fn remember_camera(&mut self, device: &DeviceId) {
        self.preferred_camera = Some(device.clone());
        self.initial_camera_set = true;
    }
}
