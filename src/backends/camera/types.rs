// SPDX-License-Identifier: GPL-3.0-only
// Shared types for camera backend abstraction

//! Shared types for camera backends

use crate::constants::QualityPrioritization;
use serde::{Deserialize, Serialize};

/// Stable identifier of a capture device as reported by the backend
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Media carried by a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    Video,
    Audio,
}

/// Physical placement of a camera relative to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DevicePosition {
    Back,
    Front,
    External,
    #[default]
    Unspecified,
}

impl std::fmt::Display for DevicePosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DevicePosition::Back => write!(f, "back"),
            DevicePosition::Front => write!(f, "front"),
            DevicePosition::External => write!(f, "external"),
            DevicePosition::Unspecified => write!(f, "unspecified"),
        }
    }
}

/// Kind of hardware behind a device, used by discovery queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    /// Single wide-angle camera
    WideAngle,
    /// Virtual device fusing a wide and telephoto camera
    DualCamera,
    /// Front-facing depth-sensing camera
    TrueDepth,
    /// Camera attached over USB or similar
    External,
    /// Audio input
    Microphone,
}

/// Framerate as a fraction (numerator/denominator)
/// Stores exact framerate to handle NTSC rates like 59.94fps (60000/1001)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Framerate {
    pub num: u32,
    pub denom: u32,
}

impl Framerate {
    /// Create a new framerate from numerator and denominator
    pub fn new(num: u32, denom: u32) -> Self {
        Self {
            num,
            denom: if denom == 0 { 1 } else { denom },
        }
    }

    /// Create a framerate from an integer (e.g., 30 becomes 30/1)
    pub fn from_int(fps: u32) -> Self {
        Self { num: fps, denom: 1 }
    }

    /// Get the framerate as a floating point value
    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.denom as f64
    }
}

impl std::fmt::Display for Framerate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show decimal for non-integer framerates (NTSC)
        if self.denom != 1 {
            write!(f, "{:.2}", self.as_f64())
        } else {
            write!(f, "{}", self.num)
        }
    }
}

impl Default for Framerate {
    fn default() -> Self {
        Self { num: 30, denom: 1 }
    }
}

/// Pixel encoding of a device format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 8-bit 4:2:0 bi-planar, video range ('420v')
    Yuv420VideoRange,
    /// 8-bit 4:2:0 bi-planar, full range ('420f')
    Yuv420FullRange,
    /// 10-bit 4:2:0 bi-planar, video range ('x420'), used for HDR video
    Yuv420TenBitVideoRange,
    /// 32-bit BGRA
    Bgra,
}

impl PixelFormat {
    /// FourCC code of the encoding
    pub fn fourcc(&self) -> &'static str {
        match self {
            PixelFormat::Yuv420VideoRange => "420v",
            PixelFormat::Yuv420FullRange => "420f",
            PixelFormat::Yuv420TenBitVideoRange => "x420",
            PixelFormat::Bgra => "BGRA",
        }
    }

    /// Parse a FourCC code
    pub fn from_fourcc(code: &str) -> Option<Self> {
        match code {
            "420v" => Some(PixelFormat::Yuv420VideoRange),
            "420f" => Some(PixelFormat::Yuv420FullRange),
            "x420" => Some(PixelFormat::Yuv420TenBitVideoRange),
            "BGRA" => Some(PixelFormat::Bgra),
            _ => None,
        }
    }

    /// Whether this is the high-bit-depth encoding used for HDR video
    pub fn is_ten_bit(&self) -> bool {
        matches!(self, PixelFormat::Yuv420TenBitVideoRange)
    }
}

/// Width and height in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Camera format specification
///
/// A device reports its formats ordered by increasing resolution and frame
/// rate. Formats sharing `(width, height, max_framerate)` are contiguous and
/// form a cluster that differs only by pixel encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraFormat {
    pub width: u32,
    pub height: u32,
    pub max_framerate: Framerate,
    pub pixel_format: PixelFormat,
    /// Largest zoom factor the format supports
    pub max_zoom_factor: f64,
    /// Still-photo dimensions available with this format, smallest first
    pub photo_dimensions: Vec<Dimensions>,
}

impl CameraFormat {
    pub fn new(width: u32, height: u32, fps: u32, pixel_format: PixelFormat) -> Self {
        Self {
            width,
            height,
            max_framerate: Framerate::from_int(fps),
            pixel_format,
            max_zoom_factor: 1.0,
            photo_dimensions: vec![Dimensions::new(width, height)],
        }
    }

    pub fn with_max_zoom(mut self, max_zoom_factor: f64) -> Self {
        self.max_zoom_factor = max_zoom_factor;
        self
    }

    pub fn with_photo_dimensions(mut self, photo_dimensions: Vec<Dimensions>) -> Self {
        self.photo_dimensions = photo_dimensions;
        self
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    /// Whether both formats belong to the same cluster
    pub fn same_cluster(&self, other: &CameraFormat) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.max_framerate == other.max_framerate
    }

    /// Largest still-photo dimensions supported by this format
    pub fn max_photo_dimensions(&self) -> Option<Dimensions> {
        self.photo_dimensions.last().copied()
    }
}

impl std::fmt::Display for CameraFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{} @ {}fps '{}'",
            self.width,
            self.height,
            self.max_framerate,
            self.pixel_format.fourcc()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FlashMode {
    Off,
    On,
    #[default]
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FocusMode {
    Locked,
    AutoFocus,
    ContinuousAutoFocus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExposureMode {
    Locked,
    AutoExpose,
    ContinuousAutoExposure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoStabilizationMode {
    #[default]
    Off,
    Auto,
}

/// A point in normalized device coordinates, (0, 0) top-left to (1, 1) bottom-right
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DevicePoint {
    pub x: f64,
    pub y: f64,
}

impl DevicePoint {
    pub const CENTER: DevicePoint = DevicePoint { x: 0.5, y: 0.5 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Whether the point lies inside the unit square
    pub fn is_normalized(&self) -> bool {
        (0.0..=1.0).contains(&self.x) && (0.0..=1.0).contains(&self.y)
    }
}

/// What a device can do
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceCapabilities {
    pub flash_available: bool,
    pub flash_modes: Vec<FlashMode>,
    pub focus_point_supported: bool,
    pub exposure_point_supported: bool,
    pub focus_modes: Vec<FocusMode>,
    pub exposure_modes: Vec<ExposureMode>,
    pub video_stabilization_supported: bool,
}

impl DeviceCapabilities {
    /// Capabilities of a typical built-in rear camera
    pub fn full() -> Self {
        Self {
            flash_available: true,
            flash_modes: vec![FlashMode::Off, FlashMode::On, FlashMode::Auto],
            focus_point_supported: true,
            exposure_point_supported: true,
            focus_modes: vec![
                FocusMode::Locked,
                FocusMode::AutoFocus,
                FocusMode::ContinuousAutoFocus,
            ],
            exposure_modes: vec![
                ExposureMode::Locked,
                ExposureMode::AutoExpose,
                ExposureMode::ContinuousAutoExposure,
            ],
            video_stabilization_supported: true,
        }
    }

    pub fn supports_focus_mode(&self, mode: FocusMode) -> bool {
        self.focus_modes.contains(&mode)
    }

    pub fn supports_exposure_mode(&self, mode: ExposureMode) -> bool {
        self.exposure_modes.contains(&mode)
    }

    pub fn supports_flash_mode(&self, mode: FlashMode) -> bool {
        self.flash_available && self.flash_modes.contains(&mode)
    }
}

/// Represents a capture device
#[derive(Debug, Clone, PartialEq)]
pub struct CameraDevice {
    pub id: DeviceId,
    pub name: String,
    pub media: MediaType,
    pub position: DevicePosition,
    pub device_type: DeviceType,
    /// Ordered, clustered format list (empty for audio devices)
    pub formats: Vec<CameraFormat>,
    pub active_format: Option<CameraFormat>,
    pub capabilities: DeviceCapabilities,
}

impl CameraDevice {
    /// Create a video device; the first format becomes the active one
    pub fn video(
        id: impl Into<String>,
        name: impl Into<String>,
        position: DevicePosition,
        device_type: DeviceType,
        formats: Vec<CameraFormat>,
    ) -> Self {
        let active_format = formats.first().cloned();
        Self {
            id: DeviceId::new(id),
            name: name.into(),
            media: MediaType::Video,
            position,
            device_type,
            formats,
            active_format,
            capabilities: DeviceCapabilities::full(),
        }
    }

    /// Create an audio input device
    pub fn microphone(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: DeviceId::new(id),
            name: name.into(),
            media: MediaType::Audio,
            position: DevicePosition::Unspecified,
            device_type: DeviceType::Microphone,
            formats: Vec::new(),
            active_format: None,
            capabilities: DeviceCapabilities::default(),
        }
    }

    pub fn with_active_format(mut self, format: CameraFormat) -> Self {
        self.active_format = Some(format);
        self
    }

    pub fn with_capabilities(mut self, capabilities: DeviceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }
}

impl std::fmt::Display for CameraDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}, {})", self.name, self.id, self.position)
    }
}

/// Session preset; mutually exclusive with an explicitly chosen device format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPreset {
    /// Full-resolution stills
    #[default]
    Photo,
    /// High quality video
    High,
}

/// Outputs that can be attached to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputKind {
    Photo,
    Movie,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhotoCodec {
    Hevc,
    Jpeg,
}

impl PhotoCodec {
    pub fn file_extension(&self) -> &'static str {
        match self {
            PhotoCodec::Hevc => "heic",
            PhotoCodec::Jpeg => "jpg",
        }
    }
}

/// Photo output configuration applied inside a transaction
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoOutputConfig {
    pub max_dimensions: Option<Dimensions>,
    pub live_photo_enabled: bool,
    pub max_quality: QualityPrioritization,
}

impl Default for PhotoOutputConfig {
    fn default() -> Self {
        Self {
            max_dimensions: None,
            live_photo_enabled: false,
            max_quality: QualityPrioritization::Quality,
        }
    }
}

/// Physical device orientation as reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceOrientation {
    #[default]
    Unknown,
    Portrait,
    PortraitUpsideDown,
    LandscapeLeft,
    LandscapeRight,
    FaceUp,
    FaceDown,
}

/// Orientation stamped on captures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureOrientation {
    #[default]
    Portrait,
    PortraitUpsideDown,
    LandscapeLeft,
    LandscapeRight,
}

impl CaptureOrientation {
    /// Map a device orientation to a capture orientation
    ///
    /// Landscape values are intentionally swapped: the sensor's landscape-left
    /// is the device's landscape-right. Orientations without a capture
    /// equivalent (unknown, face up, face down) return `None`.
    pub fn from_device(orientation: DeviceOrientation) -> Option<Self> {
        match orientation {
            DeviceOrientation::Portrait => Some(CaptureOrientation::Portrait),
            DeviceOrientation::PortraitUpsideDown => Some(CaptureOrientation::PortraitUpsideDown),
            DeviceOrientation::LandscapeLeft => Some(CaptureOrientation::LandscapeRight),
            DeviceOrientation::LandscapeRight => Some(CaptureOrientation::LandscapeLeft),
            DeviceOrientation::Unknown | DeviceOrientation::FaceUp | DeviceOrientation::FaceDown => {
                None
            }
        }
    }
}

/// A device mutation applied while holding the device configuration lock
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceSetting {
    ActiveFormat(CameraFormat),
    Focus {
        mode: FocusMode,
        point: DevicePoint,
    },
    Exposure {
        mode: ExposureMode,
        point: DevicePoint,
    },
    SubjectAreaMonitoring(bool),
    ZoomFactor(f64),
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Error types for backend operations
#[derive(Debug, Clone, PartialEq)]
pub enum BackendError {
    /// Backend is not available on this system
    NotAvailable(String),
    /// Camera device not found
    DeviceNotFound(String),
    /// The session refused an input
    InputRejected(String),
    /// The session refused an output
    OutputRejected(String),
    /// Device could not be locked for configuration
    LockFailed(String),
    /// Format not supported
    FormatNotSupported(String),
    /// The session failed to start running
    StartFailed(String),
    /// Recording already in progress
    RecordingInProgress,
    /// No recording in progress
    NoRecordingInProgress,
    /// General I/O error
    IoError(String),
    /// Other errors
    Other(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::NotAvailable(msg) => write!(f, "Backend not available: {}", msg),
            BackendError::DeviceNotFound(msg) => write!(f, "Device not found: {}", msg),
            BackendError::InputRejected(msg) => write!(f, "Input rejected: {}", msg),
            BackendError::OutputRejected(msg) => write!(f, "Output rejected: {}", msg),
            BackendError::LockFailed(msg) => write!(f, "Could not lock device: {}", msg),
            BackendError::FormatNotSupported(msg) => write!(f, "Format not supported: {}", msg),
            BackendError::StartFailed(msg) => write!(f, "Session failed to start: {}", msg),
            BackendError::RecordingInProgress => write!(f, "Recording already in progress"),
            BackendError::NoRecordingInProgress => write!(f, "No recording in progress"),
            BackendError::IoError(msg) => write!(f, "I/O error: {}", msg),
            BackendError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::IoError(err.to_string())
    }
}
