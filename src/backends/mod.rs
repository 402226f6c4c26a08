// SPDX-License-Identifier: MPL-2.0

//! Backend abstraction layer for the capture session
//!
//! Everything the session needs from the platform goes through a trait here:
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              Session worker                  │
//! └────────────────────┬────────────────────────┘
//!                      │
//! ┌────────────────────┴────────────────────────┐
//! │              Backend Layer                   │
//! │  ┌─────────────┐    ┌──────────────────┐   │
//! │  │ Permissions │    │     Camera       │   │
//! │  │ (authority) │    │ (device/session/ │   │
//! │  │             │    │   output sink)   │   │
//! │  └─────────────┘    └──────────────────┘   │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`camera`]: Device enumeration, session configuration and capture
//! - [`permissions`]: Camera, microphone and location authorization

pub mod camera;
pub mod permissions;
