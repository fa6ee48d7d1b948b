use super::capture::CapturedImage;
use crate::model::SessionPhase;
use std::sync::Arc;
use tokio::time::Instant;

/// Operations that drive the session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    BeginCapture,
    CameraFailed,
    SubmitImage,
    AwaitResult,
    ApplyResult,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{action:?} is not allowed while {from:?}")]
pub struct TransitionError {
    pub from: SessionPhase,
    pub action: SessionAction,
}

/// Target phase for `action` from `from`, if the transition is legal.
/// Reset is legal from every phase and is not listed here.
pub fn next_phase(from: SessionPhase, action: SessionAction) -> Option<SessionPhase> {
    use SessionAction::*;
    use SessionPhase::*;
    match (from, action) {
        (Idle, BeginCapture) => Some(Capturing),
        (Capturing, BeginCapture) | (Failed, BeginCapture) => Some(Capturing),
        (Capturing, CameraFailed) => Some(Failed),
        (Capturing, SubmitImage) => Some(Processing),
        (Processing, AwaitResult) => Some(AwaitingResult),
        (AwaitingResult, ApplyResult) => Some(Complete),
        _ => None,
    }
}

/// State owned by the controller for one analysis attempt.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub started_at: Option<Instant>,
    pub pending_image: Option<Arc<CapturedImage>>,
    pub last_error: Option<String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `action`, returning the new phase.
    pub fn advance(&mut self, action: SessionAction) -> Result<SessionPhase, TransitionError> {
        let to = next_phase(self.phase, action).ok_or(TransitionError {
            from: self.phase,
            action,
        })?;
        self.phase = to;
        Ok(to)
    }

    pub fn begin_processing(&mut self, image: Arc<CapturedImage>, now: Instant) {
        self.started_at = Some(now);
        self.pending_image = Some(image);
        self.last_error = None;
    }

    pub fn elapsed(&self, now: Instant) -> std::time::Duration {
        self.started_at
            .map(|t| now.saturating_duration_since(t))
            .unwrap_or_default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
