// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for camera operations
//!
//! Each command drives a session over the simulated backend:
//! - Listing available cameras
//! - Taking photos, optionally several overlapping ones
//! - Recording movies
//!
//! The CLI reads preferences from the config file but never writes them back.

use camera_session::backends::camera::SimulatedBackend;
use camera_session::backends::camera::types::{DeviceId, MediaType};
use camera_session::backends::permissions::StaticPermissions;
use camera_session::constants::timing::CAPTURE_COMPLETION_TIMEOUT;
use camera_session::storage::DirectoryLibrary;
use camera_session::{CaptureArtifact, CaptureMode, Config, SessionBuilder, SessionHandle};
use chrono::Local;
use futures::future::try_join_all;
use std::path::{Path, PathBuf};
use std::time::Duration;

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// List all available cameras
pub fn list_cameras(config_path: Option<PathBuf>) -> CliResult {
    let config = load_config(config_path.as_deref());
    runtime()?.block_on(list(config))
}

async fn list(config: Config) -> CliResult {
    let session = spawn_session(config, None)?;
    let devices = session.devices().await?;
    session.shutdown().await?;

    if devices.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Available devices:");
    println!();
    for device in &devices {
        match device.media {
            MediaType::Video => {
                println!(
                    "  [{}] {} ({}, {:?})",
                    device.id, device.name, device.position, device.device_type
                );
                let formats: Vec<String> = device.formats.iter().map(ToString::to_string).collect();
                println!("      Formats: {}", formats.join(", "));
            }
            MediaType::Audio => println!("  [{}] {} (microphone)", device.id, device.name),
        }
        println!();
    }
    Ok(())
}

/// Take `count` overlapping photos and save them to the library
pub fn take_photos(
    config_path: Option<PathBuf>,
    camera: Option<String>,
    count: usize,
    live: bool,
    output: Option<PathBuf>,
) -> CliResult {
    let mut config = load_config(config_path.as_deref());
    config.live_photo_enabled = live;
    config.save_captures_to_library = true;
    let library = library_for(&config, output)?;
    println!("Saving to {}", library.dir().display());

    runtime()?.block_on(photos(config, library, camera, count))
}

async fn photos(
    config: Config,
    library: DirectoryLibrary,
    camera: Option<String>,
    count: usize,
) -> CliResult {
    let session = spawn_session(config, Some(library))?;
    prepare(&session, camera).await?;

    let mut tickets = Vec::with_capacity(count);
    for _ in 0..count.max(1) {
        tickets.push(session.capture_photo().await?);
    }
    println!("Capturing {} photo(s)...", tickets.len());

    let artifacts = tokio::time::timeout(
        CAPTURE_COMPLETION_TIMEOUT,
        try_join_all(tickets.into_iter().map(|ticket| ticket.wait())),
    )
    .await??;
    for artifact in &artifacts {
        describe(artifact);
    }

    session.stop().await?;
    session.shutdown().await?;
    Ok(())
}

/// Record a movie for `duration` seconds and save it to the library
pub fn record_video(
    config_path: Option<PathBuf>,
    camera: Option<String>,
    duration: u64,
    hdr: bool,
    output: Option<PathBuf>,
) -> CliResult {
    let mut config = load_config(config_path.as_deref());
    config.save_captures_to_library = true;
    let library = library_for(&config, output)?;
    println!("Saving to {}", library.dir().display());

    runtime()?.block_on(video(config, library, camera, duration, hdr))
}

async fn video(
    config: Config,
    library: DirectoryLibrary,
    camera: Option<String>,
    duration: u64,
    hdr: bool,
) -> CliResult {
    let session = spawn_session(config, Some(library))?;
    prepare(&session, camera).await?;

    session.set_capture_mode(CaptureMode::Video).await?;
    if session.toggle_hdr_video(hdr).await? {
        if hdr {
            println!("HDR video enabled");
        }
    } else {
        println!("HDR video is not available on this camera");
    }

    let ticket = session.start_recording().await?;
    println!("Recording for {} seconds...", duration);
    tokio::time::sleep(Duration::from_secs(duration)).await;
    session.stop_recording().await?;

    let artifact = tokio::time::timeout(CAPTURE_COMPLETION_TIMEOUT, ticket.wait()).await??;
    describe(&artifact);

    session.stop().await?;
    session.shutdown().await?;
    Ok(())
}

fn runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
}

fn load_config(path: Option<&Path>) -> Config {
    path.map(Config::load_or_default).unwrap_or_default()
}

fn library_for(config: &Config, output: Option<PathBuf>) -> Result<DirectoryLibrary, Box<dyn std::error::Error>> {
    output
        .or_else(|| config.library_dir.clone())
        .map(DirectoryLibrary::new)
        .or_else(DirectoryLibrary::in_pictures_dir)
        .ok_or_else(|| "No pictures directory found; pass --output".into())
}

fn spawn_session(
    config: Config,
    library: Option<DirectoryLibrary>,
) -> camera_session::SessionResult<SessionHandle> {
    let mut builder = SessionBuilder::new(
        SimulatedBackend::with_default_devices(),
        StaticPermissions::authorized(),
    )
    .config(config);
    if let Some(library) = library {
        builder = builder.persistence(library);
    }
    builder.spawn()
}

/// Resolve permissions, configure, pick the camera and start running
async fn prepare(session: &SessionHandle, camera: Option<String>) -> CliResult {
    let authorizations = session.request_permissions().await?;
    if !authorizations.camera.is_authorized() {
        return Err("Camera access was not granted".into());
    }
    session.configure().await?;

    let device = match camera {
        Some(id) => Some(session.select_camera(DeviceId::new(id)).await?),
        None => session.snapshot().session.video_input,
    };
    if let Some(device) = device {
        println!("Using camera: {}", device.name);
    }

    session.start().await?;
    Ok(())
}

fn describe(artifact: &CaptureArtifact) {
    let time = Local::now().format("%H:%M:%S");
    match artifact {
        CaptureArtifact::Photo {
            data,
            codec,
            companion_movie,
        } => {
            let live = if companion_movie.is_some() { " with Live Photo movie" } else { "" };
            println!("[{}] Photo saved: {} bytes ({:?}){}", time, data.len(), codec, live);
        }
        CaptureArtifact::Movie { .. } => println!("[{}] Movie saved", time),
    }
}
