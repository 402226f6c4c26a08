// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the capture session

use crate::backends::camera::types::BackendError;
use crate::capture::RequestId;
use std::fmt;
use std::path::PathBuf;

/// Result type alias using SessionError
pub type SessionResult<T> = Result<T, SessionError>;

/// Error returned by every `SessionHandle` operation
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    /// Initial session setup failed
    Setup(SetupError),
    /// A device mutation was skipped
    DeviceConfig(DeviceConfigError),
    /// A capture request failed or was refused
    Capture(CaptureError),
    /// The backend reported an error
    Backend(BackendError),
    /// Filesystem errors around temporary artifacts
    Storage(StorageError),
    /// Camera access has not been granted
    PermissionDenied,
    /// The operation needs a configured session
    NotConfigured,
    /// The operation conflicts with work in progress
    Busy(String),
    /// No device matches the request
    DeviceNotFound(String),
    /// Recording needs the session in video mode
    NotInVideoMode,
    /// Resuming an interrupted session failed
    CameraUnavailable,
    /// The session worker has exited
    WorkerUnavailable,
}

/// Initial configuration failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupError {
    /// No default video device could be found
    NoVideoDevice,
    /// The session refused the video input
    InputRejected,
    /// The session refused the photo output
    OutputRejected,
    /// Camera authorization was not granted
    NotAuthorized,
}

/// Failures configuring a device under its configuration lock
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceConfigError {
    /// The device configuration lock could not be acquired
    LockFailed { device: String, reason: String },
    /// The device does not support the requested mutation
    Unsupported(String),
    /// Focus/exposure point outside the unit square
    InvalidPoint { x: f64, y: f64 },
    /// No video input is attached
    NoActiveDevice,
    /// The backend refused the mutation while locked
    ApplyFailed(String),
}

/// Capture request failures
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureError {
    /// A movie request is already active
    AlreadyRecording,
    /// No movie request is active
    NotRecording,
    /// Capture finished without photo data
    NoPhotoData,
    /// The hardware reported a capture error
    Hardware(String),
    /// A request with this id is already tracked
    DuplicateRequest(RequestId),
    /// No request with this id is tracked
    UnknownRequest(RequestId),
    /// The request already reached a terminal state
    AlreadyCompleted(RequestId),
    /// A temporary artifact could not be removed
    Cleanup { path: PathBuf, reason: String },
}

/// Filesystem and persistence errors
#[derive(Debug, Clone, PartialEq)]
pub enum StorageError {
    /// I/O failure
    Io(String),
}

/// Configuration file errors
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    Read { path: PathBuf, message: String },
    Parse { path: PathBuf, message: String },
    Write { path: PathBuf, message: String },
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Setup(e) => write!(f, "Session setup failed: {}", e),
            SessionError::DeviceConfig(e) => write!(f, "Device configuration failed: {}", e),
            SessionError::Capture(e) => write!(f, "Capture error: {}", e),
            SessionError::Backend(e) => write!(f, "Backend error: {}", e),
            SessionError::Storage(e) => write!(f, "Storage error: {}", e),
            SessionError::PermissionDenied => write!(f, "Camera access was not granted"),
            SessionError::NotConfigured => write!(f, "Session is not configured"),
            SessionError::Busy(msg) => write!(f, "Session is busy: {}", msg),
            SessionError::DeviceNotFound(msg) => write!(f, "Device not found: {}", msg),
            SessionError::NotInVideoMode => write!(f, "Session is not in video mode"),
            SessionError::CameraUnavailable => write!(f, "Camera is unavailable"),
            SessionError::WorkerUnavailable => write!(f, "Session worker is not running"),
        }
    }
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetupError::NoVideoDevice => write!(f, "Default video device is unavailable"),
            SetupError::InputRejected => write!(f, "Couldn't add video device input to the session"),
            SetupError::OutputRejected => write!(f, "Could not add photo output to the session"),
            SetupError::NotAuthorized => write!(f, "Camera access is not authorized"),
        }
    }
}

impl fmt::Display for DeviceConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceConfigError::LockFailed { device, reason } => {
                write!(f, "Could not lock {} for configuration: {}", device, reason)
            }
            DeviceConfigError::Unsupported(msg) => write!(f, "Unsupported: {}", msg),
            DeviceConfigError::InvalidPoint { x, y } => {
                write!(f, "Point ({}, {}) is outside the unit square", x, y)
            }
            DeviceConfigError::NoActiveDevice => write!(f, "No video input is attached"),
            DeviceConfigError::ApplyFailed(msg) => write!(f, "Mutation failed: {}", msg),
        }
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::AlreadyRecording => write!(f, "Recording already in progress"),
            CaptureError::NotRecording => write!(f, "No recording in progress"),
            CaptureError::NoPhotoData => write!(f, "No photo data resource"),
            CaptureError::Hardware(msg) => write!(f, "Hardware error: {}", msg),
            CaptureError::DuplicateRequest(id) => write!(f, "Request {} already exists", id),
            CaptureError::UnknownRequest(id) => write!(f, "Request {} is not tracked", id),
            CaptureError::AlreadyCompleted(id) => write!(f, "Request {} already completed", id),
            CaptureError::Cleanup { path, reason } => {
                write!(f, "Could not remove {}: {}", path.display(), reason)
            }
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, message } => {
                write!(f, "Failed to read {}: {}", path.display(), message)
            }
            ConfigError::Parse { path, message } => {
                write!(f, "Failed to parse {}: {}", path.display(), message)
            }
            ConfigError::Write { path, message } => {
                write!(f, "Failed to write {}: {}", path.display(), message)
            }
        }
    }
}

impl std::error::Error for SessionError {}
impl std::error::Error for SetupError {}
impl std::error::Error for DeviceConfigError {}
impl std::error::Error for CaptureError {}
impl std::error::Error for StorageError {}
impl std::error::Error for ConfigError {}

// Conversions from sub-errors to SessionError
impl From<SetupError> for SessionError {
    fn from(err: SetupError) -> Self {
        SessionError::Setup(err)
    }
}

impl From<DeviceConfigError> for SessionError {
    fn from(err: DeviceConfigError) -> Self {
        SessionError::DeviceConfig(err)
    }
}

impl From<CaptureError> for SessionError {
    fn from(err: CaptureError) -> Self {
        SessionError::Capture(err)
    }
}

impl From<BackendError> for SessionError {
    fn from(err: BackendError) -> Self {
        SessionError::Backend(err)
    }
}

impl From<StorageError> for SessionError {
    fn from(err: StorageError) -> Self {
        SessionError::Storage(err)
    }
}

impl From<BackendError> for DeviceConfigError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::FormatNotSupported(msg) => DeviceConfigError::Unsupported(msg),
            other => DeviceConfigError::ApplyFailed(other.to_string()),
        }
    }
}

// Conversions for I/O errors
impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}
