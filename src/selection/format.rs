// SPDX-License-Identifier: GPL-3.0-only

//! HDR format negotiation
//!
//! Device formats arrive ordered by increasing resolution and frame rate, and
//! formats sharing `(width, height, max_framerate)` are contiguous. The 10-bit
//! variant of a format is searched for only inside that run; scanning past the
//! cluster boundary could match a variant of an unrelated resolution.

use crate::backends::camera::types::{CameraFormat, PixelFormat};
use tracing::debug;

/// Pixel encoding used for HDR video
pub const HDR_PIXEL_FORMAT: PixelFormat = PixelFormat::Yuv420TenBitVideoRange;

/// Find the 10-bit variant of `active` inside its cluster
///
/// Returns `active` itself when it already uses the 10-bit encoding, and
/// `None` when `active` is not in `formats` or its cluster has no 10-bit
/// variant.
pub fn ten_bit_variant(formats: &[CameraFormat], active: &CameraFormat) -> Option<CameraFormat> {
    variant_in_cluster(formats, active, HDR_PIXEL_FORMAT)
}

/// Find the format with `pixel_format` inside the cluster of `active`
pub fn variant_in_cluster(
    formats: &[CameraFormat],
    active: &CameraFormat,
    pixel_format: PixelFormat,
) -> Option<CameraFormat> {
    let index = formats.iter().position(|f| f == active)?;

    if active.pixel_format == pixel_format {
        return Some(active.clone());
    }

    let found = formats[index..]
        .iter()
        .take_while(|f| f.same_cluster(active))
        .find(|f| f.pixel_format == pixel_format)
        .cloned();

    if found.is_none() {
        debug!(format = %active, fourcc = pixel_format.fourcc(), "No variant in cluster");
    }
    found
}

/// Group an ordered format list into its clusters
pub fn clusters(formats: &[CameraFormat]) -> Vec<&[CameraFormat]> {
    let mut groups = Vec::new();
    let mut start = 0;

    for index in 1..=formats.len() {
        let boundary = index == formats.len() || !formats[index].same_cluster(&formats[start]);
        if boundary {
            groups.push(&formats[start..index]);
            start = index;
        }
    }

    groups
}

/// Whether any cluster of the list offers a 10-bit variant
pub fn supports_hdr(formats: &[CameraFormat]) -> bool {
    formats.iter().any(|f| f.pixel_format == HDR_PIXEL_FORMAT)
}
