// SPDX-License-Identifier: GPL-3.0-only

//! In-flight capture request bookkeeping
//!
//! The tracker is owned by the session worker. Requests move
//! `Requested → Capturing → Finalizing → Completed | Failed`; the completion
//! is sent exactly once. A completed request stays in the map only while its
//! temporary files wait for [`CaptureRequestTracker::clean_up`].

use super::{
    CaptureArtifact, CaptureKind, CaptureOutcome, LivePhotoCounter, RequestId, RequestState,
};
use crate::backends::camera::types::PhotoCodec;
use crate::errors::CaptureError;
use crate::session::photo_settings::PhotoSettings;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

#[derive(Debug)]
pub struct CaptureRequest {
    pub id: RequestId,
    pub kind: CaptureKind,
    pub state: RequestState,
    /// Set once the request has completed with an on-disk artifact
    pub artifact_location: Option<PathBuf>,
    codec: PhotoCodec,
    photo_data: Option<Vec<u8>>,
    photo_error: Option<CaptureError>,
    companion_movie: Option<PathBuf>,
    companion_recording: bool,
    movie_path: Option<PathBuf>,
    temporary_files: Vec<PathBuf>,
    completion: Option<oneshot::Sender<CaptureOutcome>>,
}

impl CaptureRequest {
    fn new(id: RequestId, kind: CaptureKind, completion: oneshot::Sender<CaptureOutcome>) -> Self {
        Self {
            id,
            kind,
            state: RequestState::Requested,
            artifact_location: None,
            codec: PhotoCodec::Jpeg,
            photo_data: None,
            photo_error: None,
            companion_movie: None,
            companion_recording: false,
            movie_path: None,
            temporary_files: Vec::new(),
            completion: Some(completion),
        }
    }

    fn is_active(&self) -> bool {
        !self.state.is_terminal()
    }

    /// Files written so far that belong to this request
    fn written_files(&self) -> Vec<PathBuf> {
        self.movie_path
            .iter()
            .chain(self.companion_movie.iter())
            .cloned()
            .collect()
    }
}

#[derive(Debug)]
pub struct CaptureRequestTracker {
    requests: HashMap<RequestId, CaptureRequest>,
    live_photos: LivePhotoCounter,
    auto_cleanup: bool,
}

impl CaptureRequestTracker {
    pub fn new(live_photos: LivePhotoCounter, auto_cleanup: bool) -> Self {
        Self {
            requests: HashMap::new(),
            live_photos,
            auto_cleanup,
        }
    }

    /// Track a photo request keyed by the settings' unique id
    pub fn begin_photo_capture(
        &mut self,
        settings: &PhotoSettings,
    ) -> Result<(RequestId, oneshot::Receiver<CaptureOutcome>), CaptureError> {
        let id = settings.unique_id;
        if self.requests.contains_key(&id) {
            return Err(CaptureError::DuplicateRequest(id));
        }

        let kind = if settings.requests_live_photo() {
            CaptureKind::LivePhotoCompanion
        } else {
            CaptureKind::Photo
        };

        let (tx, rx) = oneshot::channel();
        let mut request = CaptureRequest::new(id, kind, tx);
        request.codec = settings.codec;
        self.requests.insert(id, request);
        debug!(request = %id, ?kind, "Tracking capture request");
        Ok((id, rx))
    }

    /// Track a movie recording that will be written to `path`
    pub fn begin_movie_capture(
        &mut self,
        path: PathBuf,
    ) -> Result<(RequestId, oneshot::Receiver<CaptureOutcome>), CaptureError> {
        if self.active_movie().is_some() {
            return Err(CaptureError::AlreadyRecording);
        }

        let id = RequestId::next();
        let (tx, rx) = oneshot::channel();
        let mut request = CaptureRequest::new(id, CaptureKind::Movie, tx);
        request.movie_path = Some(path);
        self.requests.insert(id, request);
        debug!(request = %id, "Tracking movie request");
        Ok((id, rx))
    }

    pub fn mark_capturing(&mut self, id: RequestId) -> Result<(), CaptureError> {
        self.advance(id, RequestState::Capturing)
    }

    pub fn mark_finalizing(&mut self, id: RequestId) -> Result<(), CaptureError> {
        self.advance(id, RequestState::Finalizing)
    }

    pub fn record_photo_data(
        &mut self,
        id: RequestId,
        result: Result<Vec<u8>, CaptureError>,
    ) -> Result<(), CaptureError> {
        let request = self.active_mut(id)?;
        match result {
            Ok(data) => request.photo_data = Some(data),
            Err(e) => {
                warn!(request = %id, error = %e, "Error capturing photo");
                request.photo_error = Some(e);
            }
        }
        Ok(())
    }

    pub fn record_companion_movie(&mut self, id: RequestId, path: PathBuf) -> Result<(), CaptureError> {
        self.active_mut(id)?.companion_movie = Some(path);
        Ok(())
    }

    /// The request's companion movie started recording
    pub fn on_live_photo_companion_started(&mut self, id: RequestId) -> Result<(), CaptureError> {
        let request = self.active_mut(id)?;
        request.kind = CaptureKind::LivePhotoCompanion;
        request.companion_recording = true;
        Ok(())
    }

    /// The request's companion movie finished recording
    pub fn on_live_photo_companion_finished(&mut self, id: RequestId) -> Result<(), CaptureError> {
        self.active_mut(id)?.companion_recording = false;
        Ok(())
    }

    /// Whether any Live Photo companion movie is recording
    pub fn live_photo_in_progress(&self) -> bool {
        self.live_photos.is_capturing()
    }

    /// Assemble the photo artifact from the data recorded so far
    pub fn take_photo_artifact(&mut self, id: RequestId) -> CaptureOutcome {
        let request = self.active_mut(id)?;
        match request.photo_data.take() {
            Some(data) => Ok(CaptureArtifact::Photo {
                data,
                codec: request.codec,
                companion_movie: request.companion_movie.clone(),
            }),
            None => Err(request.photo_error.take().unwrap_or(CaptureError::NoPhotoData)),
        }
    }

    /// Deliver the request's outcome
    ///
    /// The completion fires exactly once. Temporary files are deleted right
    /// away when automatic cleanup is on or the request failed; otherwise the
    /// request stays registered until [`Self::clean_up`].
    pub fn complete_request(&mut self, id: RequestId, outcome: CaptureOutcome) -> Result<RequestState, CaptureError> {
        let Some(request) = self.requests.get_mut(&id) else {
            error!(request = %id, "Completion for unknown request");
            return Err(CaptureError::UnknownRequest(id));
        };
        if !request.is_active() {
            error!(request = %id, "Completion delivered twice, ignoring");
            return Err(CaptureError::AlreadyCompleted(id));
        }

        if request.companion_recording {
            // The companion never reported its end; keep the counter balanced
            request.companion_recording = false;
            self.live_photos.companion_finished();
        }

        let state = match &outcome {
            Ok(artifact) => {
                request.temporary_files = artifact.temporary_files();
                request.artifact_location = artifact.location().map(Path::to_path_buf);
                RequestState::Completed
            }
            Err(e) => {
                warn!(request = %id, error = %e, "Capture request failed");
                request.temporary_files = request.written_files();
                RequestState::Failed
            }
        };
        request.state = state;

        if let Some(completion) = request.completion.take()
            && completion.send(outcome).is_err()
        {
            debug!(request = %id, "Capture ticket dropped before completion");
        }

        let keep_for_caller =
            state == RequestState::Completed && !self.auto_cleanup && !request.temporary_files.is_empty();
        if keep_for_caller {
            info!(request = %id, "Temporary artifact awaiting cleanup");
        } else if let Err(e) = self.clean_up(id) {
            warn!(request = %id, error = %e, "Could not remove temporary artifact");
        }

        Ok(state)
    }

    /// Delete a completed request's temporary files and forget it
    ///
    /// Idempotent: unknown ids and already-missing files are not errors.
    /// In-flight requests are left alone. A request whose files could not all
    /// be removed stays registered with the remaining files, so a later call
    /// can retry.
    pub fn clean_up(&mut self, id: RequestId) -> Result<(), CaptureError> {
        let Some(request) = self.requests.get_mut(&id) else {
            return Ok(());
        };
        if request.is_active() {
            debug!(request = %id, "Request still in flight, nothing to clean up");
            return Ok(());
        }

        let mut first_error = None;
        request.temporary_files.retain(|path| match remove_artifact(path) {
            Ok(()) => false,
            Err(e) => {
                first_error.get_or_insert(e);
                true
            }
        });

        match first_error {
            Some(e) => {
                warn!(request = %id, remaining = request.temporary_files.len(), "Temporary artifact left on disk");
                Err(e)
            }
            None => {
                self.requests.remove(&id);
                Ok(())
            }
        }
    }

    /// Clean up every completed request; in-flight requests are untouched
    pub fn clean_up_all(&mut self) -> Result<(), CaptureError> {
        let mut result = Ok(());
        for id in self.pending_cleanup() {
            if let Err(e) = self.clean_up(id) {
                result = Err(e);
            }
        }
        result
    }

    /// Completed requests whose temporary files await cleanup
    pub fn pending_cleanup(&self) -> Vec<RequestId> {
        let mut ids: Vec<_> = self
            .requests
            .values()
            .filter(|r| !r.is_active())
            .map(|r| r.id)
            .collect();
        ids.sort();
        ids
    }

    pub fn active_movie(&self) -> Option<RequestId> {
        self.requests
            .values()
            .find(|r| r.kind == CaptureKind::Movie && r.is_active())
            .map(|r| r.id)
    }

    pub fn is_recording(&self) -> bool {
        self.active_movie().is_some()
    }

    /// Number of requests that have not completed
    pub fn in_flight(&self) -> usize {
        self.requests.values().filter(|r| r.is_active()).count()
    }

    pub fn get(&self, id: RequestId) -> Option<&CaptureRequest> {
        self.requests.get(&id)
    }

    fn active_mut(&mut self, id: RequestId) -> Result<&mut CaptureRequest, CaptureError> {
        match self.requests.get_mut(&id) {
            Some(request) if request.is_active() => Ok(request),
            Some(_) => Err(CaptureError::AlreadyCompleted(id)),
            None => Err(CaptureError::UnknownRequest(id)),
        }
    }

    fn advance(&mut self, id: RequestId, state: RequestState) -> Result<(), CaptureError> {
        let request = self.active_mut(id)?;
        if request.state != state {
            debug!(request = %id, from = ?request.state, to = ?state, "Capture request advanced");
            request.state = state;
        }
        Ok(())
    }
}

/// Remove a temporary file; a file that is already gone is not an error
fn remove_artifact(path: &Path) -> Result<(), CaptureError> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "Removed temporary artifact");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CaptureError::Cleanup {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::CaptureOrientation;
    use crate::constants::QualityPrioritization;

    fn photo_settings(live: Option<PathBuf>) -> PhotoSettings {
        PhotoSettings {
            unique_id: RequestId::next(),
            codec: PhotoCodec::Hevc,
            flash_mode: None,
            max_dimensions: None,
            live_photo_movie_path: live,
            quality: QualityPrioritization::Balanced,
            orientation: CaptureOrientation::Portrait,
        }
    }

    fn temp_file(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("camera-session-tracker-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, b"movie").unwrap();
        path
    }

    fn photo_artifact() -> CaptureArtifact {
        CaptureArtifact::Photo {
            data: vec![0xff, 0xd8],
            codec: PhotoCodec::Hevc,
            companion_movie: None,
        }
    }

    #[test]
    fn test_overlapping_photos_complete_exactly_once() {
        let mut tracker = CaptureRequestTracker::new(LivePhotoCounter::new(), true);
        let mut receivers = Vec::new();
        for _ in 0..3 {
            let (id, rx) = tracker.begin_photo_capture(&photo_settings(None)).unwrap();
            receivers.push((id, rx));
        }
        assert_eq!(tracker.in_flight(), 3);

        for (id, _) in &receivers {
            let state = tracker.complete_request(*id, Ok(photo_artifact())).unwrap();
            assert_eq!(state, RequestState::Completed);
        }

        for (id, rx) in receivers {
            assert!(rx.blocking_recv().unwrap().is_ok());
            assert!(tracker.complete_request(id, Ok(photo_artifact())).is_err());
        }
        assert_eq!(tracker.in_flight(), 0);
    }

    #[test]
    fn test_duplicate_settings_rejected() {
        let mut tracker = CaptureRequestTracker::new(LivePhotoCounter::new(), true);
        let settings = photo_settings(None);
        tracker.begin_photo_capture(&settings).unwrap();
        assert_eq!(
            tracker.begin_photo_capture(&settings).unwrap_err(),
            CaptureError::DuplicateRequest(settings.unique_id)
        );
    }

    #[test]
    fn test_live_photo_settings_track_companion_kind() {
        let mut tracker = CaptureRequestTracker::new(LivePhotoCounter::new(), true);
        let (id, _rx) = tracker
            .begin_photo_capture(&photo_settings(Some(PathBuf::from("/tmp/live.mov"))))
            .unwrap();
        assert_eq!(tracker.get(id).unwrap().kind, CaptureKind::LivePhotoCompanion);
    }

    #[test]
    fn test_second_movie_rejected() {
        let mut tracker = CaptureRequestTracker::new(LivePhotoCounter::new(), true);
        let (id, _rx) = tracker.begin_movie_capture(PathBuf::from("/tmp/a.mov")).unwrap();
        tracker.mark_capturing(id).unwrap();

        assert_eq!(
            tracker.begin_movie_capture(PathBuf::from("/tmp/b.mov")).unwrap_err(),
            CaptureError::AlreadyRecording
        );
        assert_eq!(tracker.active_movie(), Some(id));
    }

    #[test]
    fn test_missing_photo_data_fails() {
        let mut tracker = CaptureRequestTracker::new(LivePhotoCounter::new(), true);
        let (id, rx) = tracker.begin_photo_capture(&photo_settings(None)).unwrap();

        let outcome = tracker.take_photo_artifact(id);
        assert_eq!(outcome, Err(CaptureError::NoPhotoData));

        let state = tracker.complete_request(id, outcome).unwrap();
        assert_eq!(state, RequestState::Failed);
        assert_eq!(rx.blocking_recv().unwrap(), Err(CaptureError::NoPhotoData));
    }

    #[test]
    fn test_manual_cleanup_is_idempotent() {
        let mut tracker = CaptureRequestTracker::new(LivePhotoCounter::new(), false);
        let path = temp_file("manual.mov");
        let (id, _rx) = tracker.begin_movie_capture(path.clone()).unwrap();

        tracker
            .complete_request(id, Ok(CaptureArtifact::Movie { path: path.clone() }))
            .unwrap();
        assert!(path.exists());
        assert_eq!(tracker.pending_cleanup(), vec![id]);
        assert_eq!(tracker.get(id).unwrap().artifact_location, Some(path.clone()));

        tracker.clean_up(id).unwrap();
        assert!(!path.exists());
        tracker.clean_up(id).unwrap();
        assert!(tracker.pending_cleanup().is_empty());
    }

    #[test]
    fn test_cleanup_tolerates_missing_file() {
        let mut tracker = CaptureRequestTracker::new(LivePhotoCounter::new(), false);
        let path = temp_file("gone.mov");
        let (id, _rx) = tracker.begin_movie_capture(path.clone()).unwrap();
        tracker
            .complete_request(id, Ok(CaptureArtifact::Movie { path: path.clone() }))
            .unwrap();

        std::fs::remove_file(&path).unwrap();
        assert!(tracker.clean_up_all().is_ok());
        assert!(tracker.pending_cleanup().is_empty());
    }

    #[test]
    fn test_failed_cleanup_keeps_request_for_retry() {
        let mut tracker = CaptureRequestTracker::new(LivePhotoCounter::new(), false);
        // A directory cannot be removed with remove_file
        let stuck = temp_file("stuck.mov");
        std::fs::remove_file(&stuck).unwrap();
        std::fs::create_dir_all(&stuck).unwrap();
        let (id, _rx) = tracker.begin_movie_capture(stuck.clone()).unwrap();
        tracker
            .complete_request(id, Ok(CaptureArtifact::Movie { path: stuck.clone() }))
            .unwrap();

        assert!(matches!(tracker.clean_up(id), Err(CaptureError::Cleanup { .. })));
        assert!(stuck.exists());
        assert_eq!(tracker.pending_cleanup(), vec![id]);
        assert!(tracker.clean_up_all().is_err());

        std::fs::remove_dir(&stuck).unwrap();
        tracker.clean_up(id).unwrap();
        assert!(tracker.pending_cleanup().is_empty());
    }

    #[test]
    fn test_failed_auto_cleanup_stays_pending() {
        let mut tracker = CaptureRequestTracker::new(LivePhotoCounter::new(), true);
        let stuck = temp_file("auto-stuck.mov");
        std::fs::remove_file(&stuck).unwrap();
        std::fs::create_dir_all(&stuck).unwrap();
        let (id, rx) = tracker.begin_movie_capture(stuck.clone()).unwrap();

        let state = tracker
            .complete_request(id, Ok(CaptureArtifact::Movie { path: stuck.clone() }))
            .unwrap();
        assert_eq!(state, RequestState::Completed);
        assert!(rx.blocking_recv().unwrap().is_ok());
        assert_eq!(tracker.pending_cleanup(), vec![id]);

        let _ = std::fs::remove_dir(&stuck);
    }

    #[test]
    fn test_auto_cleanup_removes_after_delivery() {
        let mut tracker = CaptureRequestTracker::new(LivePhotoCounter::new(), true);
        let path = temp_file("auto.mov");
        let (id, rx) = tracker.begin_movie_capture(path.clone()).unwrap();
        tracker
            .complete_request(id, Ok(CaptureArtifact::Movie { path: path.clone() }))
            .unwrap();

        assert!(rx.blocking_recv().unwrap().is_ok());
        assert!(!path.exists());
        assert!(tracker.get(id).is_none());
    }

    #[test]
    fn test_failed_movie_removes_partial_file() {
        let mut tracker = CaptureRequestTracker::new(LivePhotoCounter::new(), false);
        let path = temp_file("partial.mov");
        let (id, _rx) = tracker.begin_movie_capture(path.clone()).unwrap();

        let state = tracker
            .complete_request(id, Err(CaptureError::Hardware("disk full".into())))
            .unwrap();
        assert_eq!(state, RequestState::Failed);
        assert!(!path.exists());
        assert!(!tracker.is_recording());
    }

    #[test]
    fn test_unfinished_companion_balances_counter() {
        let counter = LivePhotoCounter::new();
        let mut tracker = CaptureRequestTracker::new(counter.clone(), true);
        let (id, _rx) = tracker
            .begin_photo_capture(&photo_settings(Some(PathBuf::from("/tmp/live.mov"))))
            .unwrap();

        counter.companion_started();
        tracker.on_live_photo_companion_started(id).unwrap();
        assert!(tracker.live_photo_in_progress());

        tracker
            .complete_request(id, Err(CaptureError::Hardware("sensor".into())))
            .unwrap();
        assert!(!tracker.live_photo_in_progress());
    }
}
