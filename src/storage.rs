// SPDX-License-Identifier: MPL-2.0

//! Saving finished captures
//!
//! The session hands completed artifacts to a [`PersistenceSink`] before their
//! temporary files are cleaned up. Only success or failure matters to the
//! session; the layout on disk belongs to the sink.

use crate::capture::CaptureArtifact;
use crate::constants::TEMP_MOVIE_EXTENSION;
use crate::errors::StorageError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Location tag attached to saved captures
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
}

pub trait PersistenceSink: Send {
    fn save(&mut self, artifact: &CaptureArtifact, location: Option<GeoLocation>) -> Result<(), StorageError>;
}

pub trait LocationProvider: Send {
    /// Most recent known location, if any
    fn current_location(&self) -> Option<GeoLocation>;
}

/// Provider that always reports the same position
#[derive(Debug, Clone, Copy)]
pub struct FixedLocation(pub GeoLocation);

impl LocationProvider for FixedLocation {
    fn current_location(&self) -> Option<GeoLocation> {
        Some(self.0)
    }
}

/// Writes photos and movies into a directory with timestamped names
///
/// Live Photo companions are stored next to their still with the same stem,
/// and a location tag is written as a `.json` sidecar.
#[derive(Debug, Clone)]
pub struct DirectoryLibrary {
    dir: PathBuf,
    /// Files written by the most recent save
    last_saved: Vec<PathBuf>,
}

impl DirectoryLibrary {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            last_saved: Vec::new(),
        }
    }

    /// Library in the user's pictures directory
    pub fn in_pictures_dir() -> Option<Self> {
        dirs::picture_dir().map(|dir| Self::new(dir.join("Camera")))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Files written by the most recent save, in write order
    pub fn last_saved(&self) -> &[PathBuf] {
        &self.last_saved
    }

    fn unique_stem(prefix: &str) -> String {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!("{}_{}_{}", prefix, timestamp, &suffix[..8])
    }

    fn write(&mut self, path: PathBuf, data: &[u8]) -> Result<(), StorageError> {
        std::fs::write(&path, data)?;
        debug!(path = %path.display(), "Wrote library file");
        self.last_saved.push(path);
        Ok(())
    }

    fn copy(&mut self, from: &Path, to: PathBuf) -> Result<(), StorageError> {
        std::fs::copy(from, &to)?;
        debug!(from = %from.display(), to = %to.display(), "Copied into library");
        self.last_saved.push(to);
        Ok(())
    }

    fn write_location(&mut self, stem: &str, location: GeoLocation) -> Result<(), StorageError> {
        let json = serde_json::to_vec_pretty(&location).map_err(|e| StorageError::Io(e.to_string()))?;
        self.write(self.dir.join(format!("{}.json", stem)), &json)
    }
}

impl PersistenceSink for DirectoryLibrary {
    fn save(&mut self, artifact: &CaptureArtifact, location: Option<GeoLocation>) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.dir)?;
        self.last_saved.clear();

        let stem = match artifact {
            CaptureArtifact::Photo {
                data,
                codec,
                companion_movie,
            } => {
                let stem = Self::unique_stem("IMG");
                self.write(
                    self.dir.join(format!("{}.{}", stem, codec.file_extension())),
                    data,
                )?;
                if let Some(movie) = companion_movie {
                    self.copy(movie, self.dir.join(format!("{}.{}", stem, TEMP_MOVIE_EXTENSION)))?;
                }
                stem
            }
            CaptureArtifact::Movie { path } => {
                if !path.exists() {
                    return Err(StorageError::Io(format!("{} does not exist", path.display())));
                }
                let stem = Self::unique_stem("VID");
                self.copy(path, self.dir.join(format!("{}.{}", stem, TEMP_MOVIE_EXTENSION)))?;
                stem
            }
        };

        if let Some(location) = location {
            self.write_location(&stem, location)?;
        }

        info!(dir = %self.dir.display(), stem = %stem, "Capture saved to library");
        Ok(())
    }
}
