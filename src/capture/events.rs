// SPDX-License-Identifier: GPL-3.0-only

//! Capture progress events
//!
//! Backends report capture progress through a [`CaptureEventSender`] from
//! whatever context their hardware callbacks run on. The sender updates the
//! Live Photo counter in place and forwards everything else to the session
//! worker, which owns the request map.

use super::{LivePhotoCounter, RequestId};
use crate::errors::CaptureError;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    /// The output accepted the settings; `live_photo_movie` is set when a
    /// companion movie will be recorded
    WillBeginCapture { id: RequestId, live_photo_movie: bool },
    /// The shutter fired
    WillCapturePhoto { id: RequestId },
    /// Photo data is ready
    PhotoProcessed {
        id: RequestId,
        result: Result<Vec<u8>, CaptureError>,
    },
    /// The companion movie stopped recording
    LivePhotoMovieRecorded { id: RequestId },
    /// The companion movie file is written
    LivePhotoMovieProcessed {
        id: RequestId,
        result: Result<PathBuf, CaptureError>,
    },
    /// Last event for a photo request
    CaptureFinished {
        id: RequestId,
        error: Option<CaptureError>,
    },
    RecordingStarted { id: RequestId, path: PathBuf },
    /// Last event for a movie request; a recording can report an error and
    /// still have finished successfully
    RecordingFinished {
        id: RequestId,
        path: PathBuf,
        error: Option<CaptureError>,
        finished_successfully: bool,
    },
}

impl CaptureEvent {
    pub fn request_id(&self) -> RequestId {
        match self {
            CaptureEvent::WillBeginCapture { id, .. }
            | CaptureEvent::WillCapturePhoto { id }
            | CaptureEvent::PhotoProcessed { id, .. }
            | CaptureEvent::LivePhotoMovieRecorded { id }
            | CaptureEvent::LivePhotoMovieProcessed { id, .. }
            | CaptureEvent::CaptureFinished { id, .. }
            | CaptureEvent::RecordingStarted { id, .. }
            | CaptureEvent::RecordingFinished { id, .. } => *id,
        }
    }
}

type Forward = dyn Fn(CaptureEvent) -> bool + Send + Sync;

/// Injected into backend capture calls
#[derive(Clone)]
pub struct CaptureEventSender {
    live_photos: LivePhotoCounter,
    forward: Arc<Forward>,
}

impl std::fmt::Debug for CaptureEventSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureEventSender")
            .field("live_photos", &self.live_photos)
            .finish_non_exhaustive()
    }
}

impl CaptureEventSender {
    /// `forward` returns `false` once the receiving side is gone
    pub fn new(
        live_photos: LivePhotoCounter,
        forward: impl Fn(CaptureEvent) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            live_photos,
            forward: Arc::new(forward),
        }
    }

    pub fn send(&self, event: CaptureEvent) {
        match &event {
            CaptureEvent::WillBeginCapture {
                live_photo_movie: true,
                ..
            } => {
                self.live_photos.companion_started();
            }
            CaptureEvent::LivePhotoMovieRecorded { .. } => {
                self.live_photos.companion_finished();
            }
            _ => {}
        }

        let id = event.request_id();
        if !(self.forward)(event) {
            debug!(request = %id, "Session worker gone, dropping capture event");
        }
    }
}
