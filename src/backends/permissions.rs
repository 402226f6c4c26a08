// SPDX-License-Identifier: GPL-3.0-only

//! Capture permissions
//!
//! The session asks a [`PermissionAuthority`] before touching the camera.
//! Requests resolve asynchronously; the session worker waits on the answer.

use crate::constants::timing;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionKind {
    Camera,
    Microphone,
    Location,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Authorization {
    Authorized,
    Denied,
    #[default]
    NotDetermined,
}

impl Authorization {
    pub fn is_authorized(&self) -> bool {
        matches!(self, Authorization::Authorized)
    }
}

/// Recorded answers for each permission kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Authorizations {
    pub camera: Authorization,
    pub microphone: Authorization,
    pub location: Authorization,
}

impl Authorizations {
    pub fn get(&self, kind: PermissionKind) -> Authorization {
        match kind {
            PermissionKind::Camera => self.camera,
            PermissionKind::Microphone => self.microphone,
            PermissionKind::Location => self.location,
        }
    }

    pub fn set(&mut self, kind: PermissionKind, authorization: Authorization) {
        match kind {
            PermissionKind::Camera => self.camera = authorization,
            PermissionKind::Microphone => self.microphone = authorization,
            PermissionKind::Location => self.location = authorization,
        }
    }
}

pub trait PermissionAuthority: Send {
    /// Current status without prompting
    fn status(&self, kind: PermissionKind) -> Authorization;

    /// Prompt for `kind`; the receiver resolves with the user's answer
    fn request(&mut self, kind: PermissionKind) -> oneshot::Receiver<Authorization>;
}

/// Authority with fixed statuses and scripted prompt answers
#[derive(Debug, Clone)]
pub struct StaticPermissions {
    statuses: HashMap<PermissionKind, Authorization>,
    answers: HashMap<PermissionKind, Authorization>,
    prompt_delay: Duration,
}

impl StaticPermissions {
    /// Everything already authorized
    pub fn authorized() -> Self {
        Self::uniform(Authorization::Authorized, Authorization::Authorized)
    }

    /// Nothing decided yet; prompts answer with `answer`
    pub fn undetermined(answer: Authorization) -> Self {
        Self::uniform(Authorization::NotDetermined, answer)
    }

    fn uniform(status: Authorization, answer: Authorization) -> Self {
        let kinds = [
            PermissionKind::Camera,
            PermissionKind::Microphone,
            PermissionKind::Location,
        ];
        Self {
            statuses: kinds.iter().map(|k| (*k, status)).collect(),
            answers: kinds.iter().map(|k| (*k, answer)).collect(),
            prompt_delay: timing::SIMULATED_PERMISSION_PROMPT,
        }
    }

    pub fn with_status(mut self, kind: PermissionKind, status: Authorization) -> Self {
        self.statuses.insert(kind, status);
        self
    }

    pub fn with_answer(mut self, kind: PermissionKind, answer: Authorization) -> Self {
        self.answers.insert(kind, answer);
        self
    }
}

impl PermissionAuthority for StaticPermissions {
    fn status(&self, kind: PermissionKind) -> Authorization {
        self.statuses.get(&kind).copied().unwrap_or_default()
    }

    fn request(&mut self, kind: PermissionKind) -> oneshot::Receiver<Authorization> {
        let (tx, rx) = oneshot::channel();
        let answer = self.answers.get(&kind).copied().unwrap_or(Authorization::Denied);
        let delay = self.prompt_delay;
        self.statuses.insert(kind, answer);
        debug!(?kind, ?answer, "Prompting for permission");

        let spawned = std::thread::Builder::new()
            .name("permission-prompt".to_string())
            .spawn(move || {
                std::thread::sleep(delay);
                let _ = tx.send(answer);
            });
        if let Err(e) = spawned {
            // Dropping the sender resolves the receiver with an error
            warn!(error = %e, "Could not spawn permission prompt");
        }
        rx
    }
}
