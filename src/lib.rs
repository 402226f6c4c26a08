// SPDX-License-Identifier: MPL-2.0

//! Camera Session - capture session coordination for still and video capture
//!
//! This library owns a camera capture session on a dedicated worker thread:
//! device selection, atomic reconfiguration, photo and movie capture tracking,
//! Live Photo bookkeeping, and recovery from interruptions.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Camera and permission abstraction, plus a simulated backend
//! - [`session`]: Session worker, command handle and configuration transactions
//! - [`capture`]: Capture request lifecycle and Live Photo tracking
//! - [`interruption`]: Interruption and runtime error recovery
//! - [`selection`]: Device and HDR format selection
//! - [`config`]: User configuration handling
//! - [`storage`]: Saving finished captures
//!
//! # Example
//!
//! ```no_run
//! use camera_session::backends::camera::SimulatedBackend;
//! use camera_session::backends::permissions::StaticPermissions;
//! use camera_session::session::SessionBuilder;
//!
//! # async fn run() -> camera_session::SessionResult<()> {
//! let session = SessionBuilder::new(
//!     SimulatedBackend::with_default_devices(),
//!     StaticPermissions::authorized(),
//! )
//! .spawn()?;
//! session.configure().await?;
//! session.start().await?;
//! let photo = session.capture_photo().await?.wait().await?;
//! # let _ = photo;
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod capture;
pub mod config;
pub mod constants;
pub mod errors;
pub mod interruption;
pub mod selection;
pub mod session;
pub mod storage;

// Re-export commonly used types
pub use capture::{CaptureArtifact, CaptureTicket, RequestId};
pub use config::Config;
pub use constants::QualityPrioritization;
pub use errors::{SessionError, SessionResult};
pub use session::{CaptureMode, SessionBuilder, SessionEvent, SessionHandle, SessionSnapshot};
