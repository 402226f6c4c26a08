// SPDX-License-Identifier: MPL-2.0

//! Integration tests for the capture session worker

use camera_session::backends::camera::{CameraBackend, SimulatedBackend};
use camera_session::backends::camera::types::{
    CameraDevice, CameraFormat, CaptureOrientation, DeviceId, DeviceOrientation, DevicePoint,
    DevicePosition, DeviceType, ExposureMode, FlashMode, FocusMode, OutputKind, PixelFormat,
    SessionPreset, VideoStabilizationMode,
};
use camera_session::backends::permissions::{Authorization, PermissionKind, StaticPermissions};
use camera_session::capture::CaptureKind;
use camera_session::errors::{CaptureError, DeviceConfigError, SetupError};
use camera_session::interruption::{InterruptionReason, InterruptionState, RuntimeErrorCode};
use camera_session::session::{ControllerState, FocusRequest, SessionSnapshot};
use camera_session::storage::{DirectoryLibrary, FixedLocation, GeoLocation};
use camera_session::{
    CaptureArtifact, CaptureMode, Config, SessionBuilder, SessionError, SessionEvent, SessionHandle,
};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

const WAIT: Duration = Duration::from_secs(5);

fn temp_dir(label: &str) -> PathBuf {
    std::env::temp_dir().join(format!("camera-session-{}-{}", label, uuid::Uuid::new_v4()))
}

fn device_id(id: &str) -> DeviceId {
    DeviceId::new(id)
}

fn builder(backend: SimulatedBackend, config: Config) -> SessionBuilder {
    SessionBuilder::new(backend, StaticPermissions::authorized())
        .config(config)
        .temp_dir(temp_dir("tmp"))
}

async fn running_session(config: Config) -> (SessionHandle, SimulatedBackend) {
    let backend = SimulatedBackend::with_default_devices();
    let control = backend.clone();
    let session = builder(backend, config).spawn().unwrap();
    session.configure().await.unwrap();
    session.start().await.unwrap();
    (session, control)
}

/// Snapshot after every queued command has been published
async fn published(session: &SessionHandle) -> SessionSnapshot {
    session.sync().await.unwrap();
    session.snapshot()
}

/// Collect events until `done` matches one
async fn events_until(
    events: &mut broadcast::Receiver<SessionEvent>,
    done: impl Fn(&SessionEvent) -> bool,
) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    tokio::time::timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let finished = done(&event);
                    seen.push(event);
                    if finished {
                        break;
                    }
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    })
    .await
    .expect("timed out waiting for session event");
    seen
}

// ===== Setup =====

#[tokio::test]
async fn test_configure_and_start() {
    let (session, control) = running_session(Config::default()).await;
    let snapshot = published(&session).await;

    assert_eq!(snapshot.state, ControllerState::Running);
    assert!(snapshot.session.is_running);
    assert!(snapshot.session.outputs.photo);
    assert!(!snapshot.session.outputs.movie);
    assert_eq!(snapshot.session.preset, SessionPreset::Photo);
    assert_eq!(
        snapshot.session.video_input.as_ref().map(|d| d.id.clone()),
        Some(device_id(SimulatedBackend::BACK_DUAL))
    );
    assert!(snapshot.session.audio_input.is_some());
    assert!(snapshot.session.photo_output.live_photo_enabled);
    assert!(snapshot.live_photo_capture_on);
    assert!(snapshot.can_change_camera);
    assert!(snapshot.photo_settings.is_some());
    assert_eq!(control.inputs().len(), 2);
    assert!(!control.is_configuring());
}

#[tokio::test]
async fn test_configure_is_idempotent() {
    let (session, control) = running_session(Config::default()).await;
    let commits = control.commit_count();

    session.configure().await.unwrap();
    assert_eq!(control.commit_count(), commits);
    assert_eq!(published(&session).await.state, ControllerState::Running);
}

#[tokio::test]
async fn test_denied_camera_is_not_authorized() {
    let backend = SimulatedBackend::with_default_devices();
    let session = SessionBuilder::new(backend, StaticPermissions::undetermined(Authorization::Denied))
        .temp_dir(temp_dir("tmp"))
        .spawn()
        .unwrap();

    let result = session.configure().await;
    assert_eq!(result, Err(SessionError::Setup(SetupError::NotAuthorized)));
    assert_eq!(published(&session).await.state, ControllerState::NotAuthorized);
    assert_eq!(session.start().await, Err(SessionError::PermissionDenied));
}

#[tokio::test]
async fn test_permission_prompt_suspends_setup() {
    let backend = SimulatedBackend::with_default_devices();
    let session = SessionBuilder::new(backend, StaticPermissions::undetermined(Authorization::Authorized))
        .temp_dir(temp_dir("tmp"))
        .spawn()
        .unwrap();

    let authorizations = session.request_permissions().await.unwrap();
    assert!(authorizations.camera.is_authorized());
    assert!(authorizations.microphone.is_authorized());

    session.configure().await.unwrap();
    assert_eq!(published(&session).await.state, ControllerState::Ready);
}

#[tokio::test]
async fn test_no_video_device_fails_configuration() {
    let backend = SimulatedBackend::new(vec![CameraDevice::microphone("mic", "Microphone")]);
    let session = builder(backend, Config::default()).spawn().unwrap();

    let expected = Err(SessionError::Setup(SetupError::NoVideoDevice));
    assert_eq!(session.configure().await, expected);
    assert_eq!(published(&session).await.state, ControllerState::ConfigurationFailed);

    // Terminal: a second attempt reports the same failure
    assert_eq!(session.configure().await, expected);
    assert_eq!(session.start().await, Err(SessionError::NotConfigured));
}

#[tokio::test]
async fn test_rejected_input_rolls_back_setup() {
    let backend = SimulatedBackend::with_default_devices();
    let control = backend.clone();
    control.reject_input(&device_id(SimulatedBackend::BACK_DUAL), true);
    let session = builder(backend, Config::default()).spawn().unwrap();

    assert_eq!(
        session.configure().await,
        Err(SessionError::Setup(SetupError::InputRejected))
    );
    assert!(control.inputs().is_empty());
    assert!(control.outputs().is_empty());
    assert!(!control.is_configuring());
}

#[tokio::test]
async fn test_live_photo_off_without_hardware_support() {
    let backend = SimulatedBackend::with_default_devices();
    backend.set_live_photo_hardware(false);
    let session = builder(backend, Config::default()).spawn().unwrap();
    session.configure().await.unwrap();
    session.start().await.unwrap();

    let snapshot = published(&session).await;
    assert!(!snapshot.session.photo_output.live_photo_enabled);
    assert!(!snapshot.live_photo_capture_on);

    let ticket = session.capture_photo().await.unwrap();
    assert_eq!(ticket.kind, CaptureKind::Photo);
    match ticket.wait().await.unwrap() {
        CaptureArtifact::Photo { companion_movie, .. } => assert!(companion_movie.is_none()),
        other => panic!("expected a photo, got {:?}", other),
    }
}

// ===== Photo capture =====

#[tokio::test]
async fn test_overlapping_photos_complete_independently() {
    let (session, _control) = running_session(Config::default()).await;

    let mut tickets = Vec::new();
    for _ in 0..3 {
        tickets.push(session.capture_photo().await.unwrap());
    }
    let mut ids: Vec<_> = tickets.iter().map(|t| t.id).collect();
    ids.dedup();
    assert_eq!(ids.len(), 3);

    for ticket in tickets {
        assert_eq!(ticket.kind, CaptureKind::LivePhotoCompanion);
        match tokio::time::timeout(WAIT, ticket.wait()).await.unwrap().unwrap() {
            CaptureArtifact::Photo {
                data,
                companion_movie,
                ..
            } => {
                assert!(!data.is_empty());
                assert!(companion_movie.is_some());
            }
            other => panic!("expected a photo, got {:?}", other),
        }
    }

    session.sync().await.unwrap();
    assert!(!session.live_photo_in_progress());
    assert_eq!(published(&session).await.captures_in_flight, 0);
}

#[tokio::test]
async fn test_photo_events_reach_subscribers() {
    let (session, _control) = running_session(Config::default()).await;
    let mut events = session.subscribe();

    let ticket = session.capture_photo().await.unwrap();
    let id = ticket.id;
    let seen = events_until(&mut events, |e| {
        matches!(e, SessionEvent::CaptureCompleted { .. } | SessionEvent::CaptureFailed { .. })
    })
    .await;

    assert!(seen.contains(&SessionEvent::ShutterFired(id)));
    assert_eq!(
        seen.last(),
        Some(&SessionEvent::CaptureCompleted {
            id,
            kind: CaptureKind::LivePhotoCompanion
        })
    );
    assert!(ticket.wait().await.is_ok());
}

#[tokio::test]
async fn test_failed_capture_reports_error() {
    let (session, control) = running_session(Config::default()).await;
    control.fail_captures(true);

    let ticket = session.capture_photo().await.unwrap();
    let result = tokio::time::timeout(WAIT, ticket.wait()).await.unwrap();
    assert!(matches!(
        result,
        Err(SessionError::Capture(CaptureError::Hardware(_)))
    ));

    session.sync().await.unwrap();
    assert!(!session.live_photo_in_progress());
}

#[tokio::test]
async fn test_capture_before_start_fails_request() {
    let backend = SimulatedBackend::with_default_devices();
    let session = builder(backend, Config::default()).spawn().unwrap();
    session.configure().await.unwrap();

    let ticket = session.capture_photo().await.unwrap();
    assert!(matches!(
        ticket.wait().await,
        Err(SessionError::Capture(CaptureError::Hardware(_)))
    ));
}

#[tokio::test]
async fn test_capture_needs_configuration() {
    let backend = SimulatedBackend::with_default_devices();
    let session = builder(backend, Config::default()).spawn().unwrap();

    assert!(matches!(
        session.capture_photo().await,
        Err(SessionError::NotConfigured)
    ));
}

#[tokio::test]
async fn test_orientation_follows_device_and_skips_face_up() {
    let (session, _control) = running_session(Config::default()).await;

    session.notify_orientation(DeviceOrientation::LandscapeLeft).unwrap();
    session.sync().await.unwrap();
    assert_eq!(published(&session).await.orientation, CaptureOrientation::LandscapeRight);

    session.notify_orientation(DeviceOrientation::FaceUp).unwrap();
    session.sync().await.unwrap();
    let snapshot = published(&session).await;
    assert_eq!(snapshot.orientation, CaptureOrientation::LandscapeRight);
    assert_eq!(
        snapshot.photo_settings.map(|s| s.orientation),
        Some(CaptureOrientation::LandscapeRight)
    );
}

#[tokio::test]
async fn test_saves_to_library_with_location() {
    let library = temp_dir("library");
    let config = Config {
        save_captures_to_library: true,
        tag_location_in_captures: true,
        ..Config::default()
    };
    let backend = SimulatedBackend::with_default_devices();
    let session = builder(backend, config)
        .persistence(DirectoryLibrary::new(&library))
        .location(FixedLocation(GeoLocation {
            latitude: 35.68,
            longitude: 139.76,
        }))
        .spawn()
        .unwrap();
    session.request_permissions().await.unwrap();
    session.configure().await.unwrap();
    session.start().await.unwrap();

    let ticket = session.capture_photo().await.unwrap();
    tokio::time::timeout(WAIT, ticket.wait()).await.unwrap().unwrap();

    let mut extensions: Vec<String> = std::fs::read_dir(&library)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            entry
                .path()
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
        })
        .collect();
    extensions.sort();
    assert_eq!(extensions, vec!["heic", "json", "mov"]);

    let _ = std::fs::remove_dir_all(&library);
}

// ===== Capture mode and recording =====

#[tokio::test]
async fn test_video_mode_is_idempotent() {
    let (session, control) = running_session(Config::default()).await;

    session.set_capture_mode(CaptureMode::Video).await.unwrap();
    session.set_capture_mode(CaptureMode::Video).await.unwrap();

    let movies = control
        .outputs()
        .into_iter()
        .filter(|o| *o == OutputKind::Movie)
        .count();
    assert_eq!(movies, 1);
    assert_eq!(control.preset(), SessionPreset::High);

    let snapshot = published(&session).await;
    assert_eq!(snapshot.capture_mode, CaptureMode::Video);
    assert!(!snapshot.session.photo_output.live_photo_enabled);
    assert!(snapshot.hdr_format_available);
}

#[tokio::test]
async fn test_photo_mode_restores_live_photo() {
    let (session, control) = running_session(Config::default()).await;

    session.set_capture_mode(CaptureMode::Video).await.unwrap();
    session.set_capture_mode(CaptureMode::Photo).await.unwrap();

    assert_eq!(control.outputs(), vec![OutputKind::Photo]);
    assert_eq!(control.preset(), SessionPreset::Photo);
    let snapshot = published(&session).await;
    assert!(snapshot.session.photo_output.live_photo_enabled);
    assert!(snapshot.live_photo_capture_on);
    assert!(!snapshot.hdr_format_available);
    assert_eq!(snapshot.state, ControllerState::Running);
}

#[tokio::test]
async fn test_recording_needs_video_mode() {
    let (session, _control) = running_session(Config::default()).await;
    assert!(matches!(
        session.start_recording().await,
        Err(SessionError::NotInVideoMode)
    ));
}

#[tokio::test]
async fn test_recording_lifecycle_with_manual_cleanup() {
    let config = Config {
        clean_up_movies_automatically: false,
        ..Config::default()
    };
    let (session, _control) = running_session(config).await;
    session.set_capture_mode(CaptureMode::Video).await.unwrap();

    let ticket = session.start_recording().await.unwrap();
    let id = ticket.id;
    assert!(matches!(
        session.start_recording().await,
        Err(SessionError::Capture(CaptureError::AlreadyRecording))
    ));
    assert!(matches!(
        session.set_capture_mode(CaptureMode::Photo).await,
        Err(SessionError::Busy(_))
    ));
    assert!(matches!(session.change_camera().await, Err(SessionError::Busy(_))));
    assert_eq!(published(&session).await.recording, Some(id));

    session.stop_recording().await.unwrap();
    let artifact = tokio::time::timeout(WAIT, ticket.wait()).await.unwrap().unwrap();
    let path = artifact.location().map(|p| p.to_path_buf()).unwrap();
    assert!(path.exists());

    session.sync().await.unwrap();
    assert_eq!(published(&session).await.pending_cleanup, vec![id]);
    assert_eq!(published(&session).await.recording, None);

    session.clean_up_movie(id).await.unwrap();
    session.clean_up_movie(id).await.unwrap();
    assert!(!path.exists());
    session.sync().await.unwrap();
    assert!(published(&session).await.pending_cleanup.is_empty());
}

#[tokio::test]
async fn test_failed_recording_removes_file() {
    let (session, control) = running_session(Config {
        clean_up_movies_automatically: false,
        ..Config::default()
    })
    .await;
    session.set_capture_mode(CaptureMode::Video).await.unwrap();
    control.fail_recordings(true);

    let ticket = session.start_recording().await.unwrap();
    session.stop_recording().await.unwrap();
    assert!(matches!(
        tokio::time::timeout(WAIT, ticket.wait()).await.unwrap(),
        Err(SessionError::Capture(CaptureError::Hardware(_)))
    ));

    session.sync().await.unwrap();
    assert!(published(&session).await.pending_cleanup.is_empty());
}

#[tokio::test]
async fn test_stop_without_recording() {
    let (session, _control) = running_session(Config::default()).await;
    assert_eq!(
        session.stop_recording().await,
        Err(SessionError::Capture(CaptureError::NotRecording))
    );
}

// ===== Camera switching =====

#[tokio::test]
async fn test_change_camera_cycles_positions() {
    let (session, control) = running_session(Config::default()).await;

    let front = session.change_camera().await.unwrap();
    assert_eq!(front.id, device_id(SimulatedBackend::FRONT_TRUE_DEPTH));
    assert!(control.inputs().contains(&front.id));

    let back = session.change_camera().await.unwrap();
    assert_eq!(back.id, device_id(SimulatedBackend::BACK_DUAL));

    let snapshot = published(&session).await;
    assert!(!snapshot.changing_camera);
    assert_eq!(snapshot.state, ControllerState::Running);
}

#[tokio::test]
async fn test_rejected_camera_keeps_previous_input() {
    let (session, control) = running_session(Config::default()).await;
    control.reject_input(&device_id(SimulatedBackend::FRONT_TRUE_DEPTH), true);
    let mut events = session.subscribe();

    assert_eq!(
        session.change_camera().await,
        Err(SessionError::Setup(SetupError::InputRejected))
    );
    assert!(control.inputs().contains(&device_id(SimulatedBackend::BACK_DUAL)));
    assert!(!control.inputs().contains(&device_id(SimulatedBackend::FRONT_TRUE_DEPTH)));
    assert_eq!(
        published(&session).await.session.video_input.map(|d| d.id),
        Some(device_id(SimulatedBackend::BACK_DUAL))
    );

    let seen = events_until(&mut events, |e| matches!(e, SessionEvent::CameraChangeFailed(_))).await;
    assert!(seen.contains(&SessionEvent::CameraStartedChanging));
}

#[tokio::test]
async fn test_selected_camera_is_remembered() {
    let dir = temp_dir("config");
    let config_path = dir.join("config.json");
    let backend = SimulatedBackend::with_default_devices();
    let session = builder(backend, Config::default())
        .config_path(&config_path)
        .spawn()
        .unwrap();
    session.configure().await.unwrap();

    let saved = Config::load_from(&config_path).unwrap();
    assert!(saved.initial_camera_set);
    assert_eq!(saved.preferred_camera, Some(device_id(SimulatedBackend::BACK_DUAL)));

    session
        .select_camera(device_id(SimulatedBackend::BACK_WIDE))
        .await
        .unwrap();
    session.shutdown().await.unwrap();

    let saved = Config::load_from(&config_path).unwrap();
    assert_eq!(saved.preferred_camera, Some(device_id(SimulatedBackend::BACK_WIDE)));

    // A new session starts on the remembered camera
    let backend = SimulatedBackend::with_default_devices();
    let session = builder(backend, saved).spawn().unwrap();
    session.configure().await.unwrap();
    assert_eq!(
        published(&session).await.session.video_input.map(|d| d.id),
        Some(device_id(SimulatedBackend::BACK_WIDE))
    );

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_cycled_camera_is_remembered() {
    let dir = temp_dir("config");
    let config_path = dir.join("config.json");
    let backend = SimulatedBackend::with_default_devices();
    let session = builder(backend, Config::default())
        .config_path(&config_path)
        .spawn()
        .unwrap();
    session.configure().await.unwrap();

    let front = session.change_camera().await.unwrap();
    session.shutdown().await.unwrap();

    let saved = Config::load_from(&config_path).unwrap();
    assert_eq!(saved.preferred_camera, Some(front.id));

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_select_unknown_camera() {
    let (session, _control) = running_session(Config::default()).await;
    assert!(matches!(
        session.select_camera(device_id("nope")).await,
        Err(SessionError::DeviceNotFound(_))
    ));
}

// ===== HDR =====

async fn pixel_format(session: &SessionHandle) -> Option<PixelFormat> {
    published(session)
        .await
        .session
        .video_input
        .and_then(|d| d.active_format)
        .map(|f| f.pixel_format)
}

#[tokio::test]
async fn test_hdr_follows_toggle_in_video_mode() {
    let (session, _control) = running_session(Config::default()).await;

    session.set_capture_mode(CaptureMode::Video).await.unwrap();
    assert_eq!(pixel_format(&session).await, Some(PixelFormat::Yuv420TenBitVideoRange));

    assert!(session.toggle_hdr_video(false).await.unwrap());
    assert_eq!(pixel_format(&session).await, Some(PixelFormat::Yuv420VideoRange));
    assert!(!published(&session).await.hdr_video_on);

    assert!(session.toggle_hdr_video(true).await.unwrap());
    assert_eq!(pixel_format(&session).await, Some(PixelFormat::Yuv420TenBitVideoRange));
}

#[tokio::test]
async fn test_hdr_without_ten_bit_format_is_noop() {
    let (session, _control) = running_session(Config {
        hdr_video_enabled: false,
        ..Config::default()
    })
    .await;

    // The front camera has no 10-bit format in either mode
    session
        .select_camera(device_id(SimulatedBackend::FRONT_TRUE_DEPTH))
        .await
        .unwrap();
    session.set_capture_mode(CaptureMode::Video).await.unwrap();
    assert!(!published(&session).await.hdr_format_available);
    assert!(!session.toggle_hdr_video(true).await.unwrap());
    assert_eq!(pixel_format(&session).await, Some(PixelFormat::Yuv420VideoRange));
}

#[tokio::test]
async fn test_hdr_enabled_in_photo_mode_applies_in_video_mode() {
    let (session, _control) = running_session(Config {
        hdr_video_enabled: false,
        ..Config::default()
    })
    .await;

    // Nothing to switch in photo mode, but the preference sticks
    assert!(!session.toggle_hdr_video(true).await.unwrap());
    assert!(published(&session).await.hdr_video_on);
    assert_eq!(pixel_format(&session).await, Some(PixelFormat::Yuv420VideoRange));

    session.set_capture_mode(CaptureMode::Video).await.unwrap();
    assert_eq!(pixel_format(&session).await, Some(PixelFormat::Yuv420TenBitVideoRange));
}

// ===== Device configuration =====

#[tokio::test]
async fn test_zoom_is_clamped() {
    let (session, control) = running_session(Config::default()).await;
    let back = device_id(SimulatedBackend::BACK_DUAL);

    assert_eq!(session.zoom(100.0).await.unwrap(), 6.0);
    assert_eq!(control.zoom_factor(&back), Some(6.0));
    assert_eq!(session.zoom(0.25).await.unwrap(), 1.0);
    assert_eq!(session.zoom(2.5).await.unwrap(), 2.5);
    assert!(matches!(
        session.zoom(f64::NAN).await,
        Err(SessionError::DeviceConfig(DeviceConfigError::Unsupported(_)))
    ));
    assert!(!control.is_locked(&back));
}

#[tokio::test]
async fn test_lock_failure_leaves_device_untouched() {
    let (session, control) = running_session(Config::default()).await;
    let back = device_id(SimulatedBackend::BACK_DUAL);
    session.zoom(2.0).await.unwrap();
    control.fail_lock(&back, true);

    assert!(matches!(
        session.zoom(3.0).await,
        Err(SessionError::DeviceConfig(DeviceConfigError::LockFailed { .. }))
    ));
    assert_eq!(control.zoom_factor(&back), Some(2.0));
    assert!(!control.is_locked(&back));
}

#[tokio::test]
async fn test_tap_to_focus() {
    let (session, control) = running_session(Config::default()).await;
    let back = device_id(SimulatedBackend::BACK_DUAL);
    let point = DevicePoint::new(0.3, 0.7);

    session.focus(FocusRequest::tap(point)).await.unwrap();
    assert_eq!(control.focus(&back), Some((FocusMode::AutoFocus, point)));
    assert_eq!(control.exposure(&back), Some((ExposureMode::AutoExpose, point)));
    assert_eq!(control.subject_area_monitoring(&back), Some(true));

    session.notify_subject_area_changed().unwrap();
    session.sync().await.unwrap();
    assert_eq!(
        control.focus(&back),
        Some((FocusMode::ContinuousAutoFocus, DevicePoint::CENTER))
    );
    assert_eq!(control.subject_area_monitoring(&back), Some(false));
}

#[tokio::test]
async fn test_focus_rejects_points_outside_unit_square() {
    let (session, control) = running_session(Config::default()).await;
    let locks = control.lock_count();

    let result = session.focus(FocusRequest::tap(DevicePoint::new(1.5, 0.5))).await;
    assert!(matches!(
        result,
        Err(SessionError::DeviceConfig(DeviceConfigError::InvalidPoint { .. }))
    ));
    assert_eq!(control.lock_count(), locks);
}

#[tokio::test]
async fn test_focus_skips_unsupported_point_of_interest() {
    let (session, control) = running_session(Config::default()).await;
    let front = device_id(SimulatedBackend::FRONT_TRUE_DEPTH);
    session.select_camera(front.clone()).await.unwrap();

    let point = DevicePoint::new(0.4, 0.4);
    session.focus(FocusRequest::tap(point)).await.unwrap();
    assert_eq!(control.focus(&front), None);
    assert_eq!(control.exposure(&front), Some((ExposureMode::AutoExpose, point)));
}

// ===== Interruptions =====

#[tokio::test]
async fn test_interruption_and_end() {
    let (session, _control) = running_session(Config::default()).await;

    session
        .notify_interrupted(InterruptionReason::VideoDeviceInUseByAnotherClient)
        .unwrap();
    session.sync().await.unwrap();
    let interruption = published(&session).await.interruption;
    assert_eq!(
        interruption,
        InterruptionState::Interrupted {
            reason: InterruptionReason::VideoDeviceInUseByAnotherClient,
            resumable: true,
        }
    );
    assert!(interruption.can_resume());

    session.notify_interruption_ended().unwrap();
    session.sync().await.unwrap();
    assert!(published(&session).await.interruption.is_idle());
}

#[tokio::test]
async fn test_media_services_reset_restarts_session() {
    let (session, control) = running_session(Config::default()).await;
    let mut events = session.subscribe();

    control.crash();
    session
        .notify_runtime_error(RuntimeErrorCode::MediaServicesWereReset)
        .unwrap();

    let seen = events_until(&mut events, |e| matches!(e, SessionEvent::RunningChanged(_))).await;
    assert!(seen.contains(&SessionEvent::InterruptionChanged(
        InterruptionState::RuntimeError {
            code: RuntimeErrorCode::MediaServicesWereReset
        }
    )));
    assert_eq!(seen.last(), Some(&SessionEvent::RunningChanged(true)));

    session.sync().await.unwrap();
    let snapshot = published(&session).await;
    assert!(snapshot.interruption.is_idle());
    assert!(snapshot.session.is_running);
    assert_eq!(snapshot.state, ControllerState::Running);
}

#[tokio::test]
async fn test_failed_resume_reports_camera_unavailable() {
    let (session, control) = running_session(Config::default()).await;

    control.crash();
    session
        .notify_runtime_error(RuntimeErrorCode::DeviceWasDisconnected)
        .unwrap();
    session.sync().await.unwrap();
    let snapshot = published(&session).await;
    assert_eq!(
        snapshot.interruption,
        InterruptionState::RuntimeError {
            code: RuntimeErrorCode::DeviceWasDisconnected
        }
    );
    assert!(!snapshot.session.is_running);

    control.fail_start(true);
    assert_eq!(
        session.resume_interrupted_session().await,
        Err(SessionError::CameraUnavailable)
    );
    assert_eq!(
        published(&session).await.interruption,
        InterruptionState::RuntimeError {
            code: RuntimeErrorCode::UnableToResume
        }
    );

    control.fail_start(false);
    session.resume_interrupted_session().await.unwrap();
    session.sync().await.unwrap();
    let snapshot = published(&session).await;
    assert!(snapshot.interruption.is_idle());
    assert_eq!(snapshot.state, ControllerState::Running);
}

#[tokio::test]
async fn test_microphone_denied_skips_audio_input() {
    let backend = SimulatedBackend::with_default_devices();
    let control = backend.clone();
    let permissions = StaticPermissions::authorized()
        .with_status(PermissionKind::Microphone, Authorization::Denied);
    let session = SessionBuilder::new(backend, permissions)
        .temp_dir(temp_dir("tmp"))
        .spawn()
        .unwrap();

    let authorizations = session.request_permissions().await.unwrap();
    assert_eq!(authorizations.microphone, Authorization::Denied);
    session.configure().await.unwrap();

    assert!(published(&session).await.session.audio_input.is_none());
    assert_eq!(control.inputs(), vec![device_id(SimulatedBackend::BACK_DUAL)]);
}

#[tokio::test]
async fn test_flash_follows_device_support() {
    let (session, _control) = running_session(Config::default()).await;

    session.set_flash_mode(FlashMode::On).await.unwrap();
    let settings = published(&session).await.photo_settings.unwrap();
    assert_eq!(settings.flash_mode, Some(FlashMode::On));

    // The front camera has no flash
    session
        .select_camera(device_id(SimulatedBackend::FRONT_TRUE_DEPTH))
        .await
        .unwrap();
    let snapshot = published(&session).await;
    assert_eq!(snapshot.flash_mode, FlashMode::On);
    assert_eq!(snapshot.photo_settings.unwrap().flash_mode, None);
}

#[tokio::test]
async fn test_live_photo_flag_tracks_companions() {
    let (session, control) = running_session(Config::default()).await;
    control.set_capture_delay(Duration::from_millis(100));
    let mut flag = session.watch_live_photo();
    assert!(!*flag.borrow());

    let ticket = session.capture_photo().await.unwrap();
    tokio::time::timeout(WAIT, flag.wait_for(|on| *on))
        .await
        .unwrap()
        .unwrap();
    assert!(session.live_photo_in_progress());

    tokio::time::timeout(WAIT, ticket.wait()).await.unwrap().unwrap();
    tokio::time::timeout(WAIT, flag.wait_for(|on| !*on))
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_blocking_wait_outside_runtime() {
    let (session, _control) = running_session(Config::default()).await;
    let ticket = session.capture_photo().await.unwrap();

    let artifact = tokio::task::spawn_blocking(move || ticket.blocking_wait())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(artifact, CaptureArtifact::Photo { .. }));
}

#[tokio::test]
async fn test_video_mode_enables_stabilization() {
    let (session, control) = running_session(Config::default()).await;
    assert_eq!(control.stabilization(), VideoStabilizationMode::Off);

    session.set_capture_mode(CaptureMode::Video).await.unwrap();
    assert_eq!(control.stabilization(), VideoStabilizationMode::Auto);
    assert!(!control.photo_output().live_photo_enabled);
}

#[tokio::test]
async fn test_clean_up_all_movies() {
    let config = Config {
        clean_up_movies_automatically: false,
        ..Config::default()
    };
    let (session, _control) = running_session(config).await;
    session.set_capture_mode(CaptureMode::Video).await.unwrap();

    let mut paths = Vec::new();
    for _ in 0..2 {
        let ticket = session.start_recording().await.unwrap();
        session.stop_recording().await.unwrap();
        let artifact = tokio::time::timeout(WAIT, ticket.wait()).await.unwrap().unwrap();
        paths.extend(artifact.temporary_files());
    }
    assert_eq!(published(&session).await.pending_cleanup.len(), 2);

    session.clean_up_all_movies().await.unwrap();
    assert!(paths.iter().all(|p| !p.exists()));
    assert!(published(&session).await.pending_cleanup.is_empty());
}

#[tokio::test]
async fn test_external_camera_joins_rotation() {
    let (session, control) = running_session(Config::default()).await;
    let external = CameraDevice::video(
        "usb-webcam",
        "USB Webcam",
        DevicePosition::External,
        DeviceType::External,
        vec![CameraFormat::new(1280, 720, 30, PixelFormat::Yuv420VideoRange)],
    );
    control.add_device(external);

    let next = session.change_camera().await.unwrap();
    assert_eq!(next.id, device_id("usb-webcam"));

    let back = session.change_camera().await.unwrap();
    assert_eq!(back.id, device_id(SimulatedBackend::BACK_DUAL));

    control.remove_device(&device_id("usb-webcam"));
    let front = session.change_camera().await.unwrap();
    assert_eq!(front.id, device_id(SimulatedBackend::FRONT_TRUE_DEPTH));
}

#[tokio::test]
async fn test_resume_needs_configured_session() {
    let backend = SimulatedBackend::with_default_devices();
    let control = backend.clone();
    let session = builder(backend, Config::default()).spawn().unwrap();

    session
        .notify_runtime_error(RuntimeErrorCode::DeviceWasDisconnected)
        .unwrap();
    assert_eq!(
        session.resume_interrupted_session().await,
        Err(SessionError::NotConfigured)
    );
    assert!(!control.is_running());
    assert_eq!(
        published(&session).await.interruption,
        InterruptionState::RuntimeError {
            code: RuntimeErrorCode::DeviceWasDisconnected
        }
    );
}

#[tokio::test]
async fn test_resume_refused_without_authorization() {
    let backend = SimulatedBackend::with_default_devices();
    let control = backend.clone();
    let session = SessionBuilder::new(backend, StaticPermissions::undetermined(Authorization::Denied))
        .temp_dir(temp_dir("tmp"))
        .spawn()
        .unwrap();
    let _ = session.configure().await;

    session
        .notify_interrupted(InterruptionReason::VideoDeviceInUseByAnotherClient)
        .unwrap();
    assert_eq!(
        session.resume_interrupted_session().await,
        Err(SessionError::PermissionDenied)
    );
    assert!(!control.is_running());
}

// ===== Lifecycle =====

#[tokio::test]
async fn test_stop_and_shutdown() {
    let (session, control) = running_session(Config::default()).await;

    session.stop().await.unwrap();
    assert!(!control.is_running());
    assert_eq!(published(&session).await.state, ControllerState::Ready);

    session.shutdown().await.unwrap();
    assert!(matches!(
        session.capture_photo().await,
        Err(SessionError::WorkerUnavailable)
    ));
}
