// SPDX-License-Identifier: MPL-2.0

//! Integration tests for constants module

use camera_session::constants::{self, QualityPrioritization};

#[test]
fn test_quality_prioritization_values() {
    assert_eq!(QualityPrioritization::ALL.len(), 3);
}

#[test]
fn test_quality_prioritization_display_names() {
    for quality in QualityPrioritization::ALL {
        let name = quality.display_name();
        assert!(!name.is_empty(), "{:?} has empty display name", quality);
    }
}

#[test]
fn test_zoom_floor() {
    assert_eq!(constants::MIN_ZOOM_FACTOR, 1.0);
}

#[test]
fn test_temporary_movie_extension() {
    assert_eq!(constants::TEMP_MOVIE_EXTENSION, "mov");
}
