// SPDX-License-Identifier: GPL-3.0-only

//! Capture request lifecycle
//!
//! Photos may overlap freely, Live Photo companion movies may overlap each
//! other, and at most one movie recording is active. Each accepted request is
//! answered exactly once through its ticket.

pub mod events;
pub mod live_photo;
pub mod tracker;

pub use events::{CaptureEvent, CaptureEventSender};
pub use live_photo::LivePhotoCounter;
pub use tracker::{CaptureRequest, CaptureRequestTracker};

use crate::backends::camera::types::PhotoCodec;
use crate::errors::{CaptureError, SessionError, SessionResult};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::oneshot;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identity of a capture request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    /// Allocate a process-wide unique id
    pub fn next() -> Self {
        Self(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureKind {
    Photo,
    /// A still that also records a short companion movie
    LivePhotoCompanion,
    Movie,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestState {
    Requested,
    Capturing,
    Finalizing,
    Completed,
    Failed,
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestState::Completed | RequestState::Failed)
    }
}

/// Result of a finished capture
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureArtifact {
    Photo {
        data: Vec<u8>,
        codec: PhotoCodec,
        /// Temporary Live Photo companion movie
        companion_movie: Option<PathBuf>,
    },
    Movie {
        /// Temporary movie file
        path: PathBuf,
    },
}

impl CaptureArtifact {
    /// Temporary files governed by the cleanup contract
    pub fn temporary_files(&self) -> Vec<PathBuf> {
        match self {
            CaptureArtifact::Photo { companion_movie, .. } => {
                companion_movie.iter().cloned().collect()
            }
            CaptureArtifact::Movie { path } => vec![path.clone()],
        }
    }

    /// Location handle of the artifact, if it lives on disk
    pub fn location(&self) -> Option<&Path> {
        match self {
            CaptureArtifact::Photo { companion_movie, .. } => companion_movie.as_deref(),
            CaptureArtifact::Movie { path } => Some(path),
        }
    }
}

/// Outcome delivered on a request's completion channel
pub type CaptureOutcome = Result<CaptureArtifact, CaptureError>;

/// Handle to an accepted capture request
///
/// Resolves once the request reaches `Completed` or `Failed`.
#[derive(Debug)]
pub struct CaptureTicket {
    pub id: RequestId,
    pub kind: CaptureKind,
    completion: oneshot::Receiver<CaptureOutcome>,
}

pub type PhotoTicket = CaptureTicket;
pub type MovieTicket = CaptureTicket;

impl CaptureTicket {
    pub(crate) fn new(
        id: RequestId,
        kind: CaptureKind,
        completion: oneshot::Receiver<CaptureOutcome>,
    ) -> Self {
        Self {
            id,
            kind,
            completion,
        }
    }

    /// Wait for the capture to finish
    pub async fn wait(self) -> SessionResult<CaptureArtifact> {
        match self.completion.await {
            Ok(outcome) => outcome.map_err(SessionError::from),
            Err(_) => Err(SessionError::WorkerUnavailable),
        }
    }

    /// Blocking variant of [`CaptureTicket::wait`] for non-async callers
    pub fn blocking_wait(self) -> SessionResult<CaptureArtifact> {
        match self.completion.blocking_recv() {
            Ok(outcome) => outcome.map_err(SessionError::from),
            Err(_) => Err(SessionError::WorkerUnavailable),
        }
    }
}
