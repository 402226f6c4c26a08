// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Still-photo quality prioritization
///
/// Trades capture latency for image processing quality. Video mode forces
/// `Balanced`; photo mode uses the user's preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum QualityPrioritization {
    /// Fastest shot-to-shot time
    Speed,
    /// Balanced processing (default)
    #[default]
    Balanced,
    /// Maximum processing, slowest
    Quality,
}

impl QualityPrioritization {
    /// Get all variants for UI iteration
    pub const ALL: [QualityPrioritization; 3] = [
        QualityPrioritization::Speed,
        QualityPrioritization::Balanced,
        QualityPrioritization::Quality,
    ];

    /// Get display name for the prioritization
    pub fn display_name(&self) -> &'static str {
        match self {
            QualityPrioritization::Speed => "Speed",
            QualityPrioritization::Balanced => "Balanced",
            QualityPrioritization::Quality => "Quality",
        }
    }

    /// Clamp a requested prioritization to what the photo output allows
    pub fn capped_at(self, max: QualityPrioritization) -> QualityPrioritization {
        self.min(max)
    }
}

/// Timing constants
pub mod timing {
    use super::Duration;

    /// Delay between stages of a simulated photo capture
    pub const SIMULATED_CAPTURE_STAGE: Duration = Duration::from_millis(5);
    /// Delay before a simulated recording reports it has finished
    pub const SIMULATED_RECORDING_FINALIZE: Duration = Duration::from_millis(10);
    /// Delay before a simulated permission prompt is answered
    pub const SIMULATED_PERMISSION_PROMPT: Duration = Duration::from_millis(20);
    /// How long the CLI waits for a capture to complete
    pub const CAPTURE_COMPLETION_TIMEOUT: Duration = Duration::from_secs(10);
}

/// Capacity of the session event broadcast channel
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Name of the worker thread that owns the capture session
pub const SESSION_THREAD_NAME: &str = "camera-session";

/// Smallest zoom factor a device accepts
pub const MIN_ZOOM_FACTOR: f64 = 1.0;

/// Extension of temporary movie files (recordings and Live Photo companions)
pub const TEMP_MOVIE_EXTENSION: &str = "mov";

/// Directory name used under the config and temp directories
pub const APP_DIR_NAME: &str = "camera-session";

/// Configuration file name
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Payload returned by simulated photo captures
pub const SIMULATED_PHOTO_PAYLOAD: &[u8] = b"simulated-photo";

/// Payload written into simulated movie files
pub const SIMULATED_MOVIE_PAYLOAD: &[u8] = b"simulated-movie";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_all_is_ordered() {
        let mut sorted = QualityPrioritization::ALL;
        sorted.sort();
        assert_eq!(sorted, QualityPrioritization::ALL);
    }

    #[test]
    fn test_quality_capped() {
        assert_eq!(
            QualityPrioritization::Quality.capped_at(QualityPrioritization::Balanced),
            QualityPrioritization::Balanced
        );
        assert_eq!(
            QualityPrioritization::Speed.capped_at(QualityPrioritization::Quality),
            QualityPrioritization::Speed
        );
    }
}
