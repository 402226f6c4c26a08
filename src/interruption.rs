// SPDX-License-Identifier: GPL-3.0-only

//! Interruption and runtime error handling
//!
//! The state machine only decides; the session worker performs the restart
//! it asks for and reports back. It never calls into the controller.

use tracing::{debug, error, info, warn};

/// Why the system took the camera away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptionReason {
    VideoDeviceInUseByAnotherClient,
    AudioDeviceInUseByAnotherClient,
    VideoDeviceNotAvailableWithMultipleForegroundApps,
    VideoDeviceNotAvailableDueToSystemPressure,
    VideoDeviceNotAvailableInBackground,
}

impl InterruptionReason {
    /// Whether the user can take the camera back with an explicit resume
    pub fn is_resumable(&self) -> bool {
        matches!(
            self,
            InterruptionReason::VideoDeviceInUseByAnotherClient
                | InterruptionReason::AudioDeviceInUseByAnotherClient
        )
    }
}

/// Runtime errors reported by the capture pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeErrorCode {
    MediaServicesWereReset,
    DeviceWasDisconnected,
    /// An explicit resume did not get the session running again
    UnableToResume,
    Other(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterruptionState {
    #[default]
    Idle,
    Interrupted {
        reason: InterruptionReason,
        resumable: bool,
    },
    Resuming,
    RuntimeError {
        code: RuntimeErrorCode,
    },
}

impl InterruptionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, InterruptionState::Idle)
    }

    /// Whether an explicit resume may be offered to the user
    pub fn can_resume(&self) -> bool {
        match self {
            InterruptionState::Interrupted { resumable, .. } => *resumable,
            InterruptionState::RuntimeError { .. } => true,
            InterruptionState::Idle | InterruptionState::Resuming => false,
        }
    }
}

/// Follow-up work requested from the session worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    None,
    /// Enqueue a session restart
    RestartSession,
}

#[derive(Debug, Default)]
pub struct InterruptionStateMachine {
    state: InterruptionState,
    restart_pending: bool,
}

impl InterruptionStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> InterruptionState {
        self.state
    }

    /// Returns `true` when the state changed
    pub fn on_interrupted(&mut self, reason: InterruptionReason) -> bool {
        match self.state {
            InterruptionState::Idle | InterruptionState::Interrupted { .. } => {
                let resumable = reason.is_resumable();
                info!(?reason, resumable, "Capture session was interrupted");
                self.state = InterruptionState::Interrupted { reason, resumable };
                true
            }
            InterruptionState::Resuming | InterruptionState::RuntimeError { .. } => {
                debug!(?reason, state = ?self.state, "Ignoring interruption");
                false
            }
        }
    }

    /// Returns `true` when the state changed
    pub fn on_interruption_ended(&mut self) -> bool {
        if let InterruptionState::Interrupted { .. } = self.state {
            info!("Capture session interruption ended");
            self.state = InterruptionState::Idle;
            return true;
        }
        debug!(state = ?self.state, "Interruption ended while not interrupted");
        false
    }

    /// A runtime error was reported while the session `was_running` or not
    pub fn on_runtime_error(&mut self, code: RuntimeErrorCode, was_running: bool) -> RecoveryAction {
        error!(?code, was_running, "Capture session runtime error");
        self.state = InterruptionState::RuntimeError { code };

        if code == RuntimeErrorCode::MediaServicesWereReset && was_running {
            self.restart_pending = true;
            RecoveryAction::RestartSession
        } else {
            self.restart_pending = false;
            RecoveryAction::None
        }
    }

    /// Result of the restart requested by [`Self::on_runtime_error`]
    pub fn on_restart_finished(&mut self, running: bool) {
        if !std::mem::take(&mut self.restart_pending) {
            debug!("Restart finished with no recovery pending");
            return;
        }
        if !matches!(self.state, InterruptionState::RuntimeError { .. }) {
            return;
        }

        if running {
            info!("Capture session recovered after media services reset");
            self.state = InterruptionState::Idle;
        } else {
            warn!("Capture session did not restart after media services reset");
        }
    }

    /// Enter `Resuming`; returns `false` when there is nothing to resume
    pub fn begin_resume(&mut self) -> bool {
        match self.state {
            InterruptionState::Interrupted { .. } | InterruptionState::RuntimeError { .. } => {
                self.restart_pending = false;
                self.state = InterruptionState::Resuming;
                true
            }
            InterruptionState::Idle | InterruptionState::Resuming => false,
        }
    }

    /// Result of an explicit resume; failure is terminal until the next resume
    pub fn finish_resume(&mut self, running: bool) {
        if self.state != InterruptionState::Resuming {
            return;
        }
        self.state = if running {
            info!("Capture session resumed");
            InterruptionState::Idle
        } else {
            warn!("Unable to resume capture session");
            InterruptionState::RuntimeError {
                code: RuntimeErrorCode::UnableToResume,
            }
        };
    }
}
