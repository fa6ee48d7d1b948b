//! Analysis session lifecycle controller.
//!
//! Owns the session state machine and the timer tasks attached to it. Every
//! task is tagged with the generation it was spawned for; a callback whose
//! generation no longer matches is dropped without touching state.

use super::capture::{self, CaptureError, CapturedImage};
use super::state::{SessionAction, SessionState, TransitionError};
use super::{fallback, poller, SessionError};
use crate::model::{
    InfoEvent, ResultRecord, ResultSource, SessionConfig, SessionEvent, SessionPhase,
};
use crate::publisher::{StatusBoard, STATUS_COMPLETED, STATUS_READY, STATUS_STARTED};
use crate::report::Report;
use crate::store::ResultStore;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc::UnboundedSender, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub const PROCESSING_STEPS: [&str; 8] = [
    "Initializing computer vision algorithms...",
    "Preprocessing image data...",
    "Detecting hair follicle patterns...",
    "Analyzing hair strand thickness...",
    "Calculating spatial hair density...",
    "Processing pattern recognition...",
    "Generating confidence metrics...",
    "Finalizing analysis results...",
];

/// Progress shown while staging; 100 is reserved for a completed session.
const STAGED_PROGRESS_CAP: usize = 85;

#[derive(Default)]
struct SessionTasks {
    staging: Option<JoinHandle<()>>,
    poller: Option<JoinHandle<()>>,
    fallback: Option<JoinHandle<()>>,
}

impl SessionTasks {
    fn abort_all(&mut self) {
        for handle in [self.staging.take(), self.poller.take(), self.fallback.take()]
            .into_iter()
            .flatten()
        {
            handle.abort();
        }
    }

    fn live(&self) -> usize {
        [&self.staging, &self.poller, &self.fallback]
            .into_iter()
            .flatten()
            .filter(|h| !h.is_finished())
            .count()
    }
}

struct Inner {
    state: SessionState,
    generation: u64,
    tasks: SessionTasks,
    report: Option<Report>,
}

/// Point-in-time view of the controller.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub generation: u64,
    pub live_tasks: usize,
    pub has_pending_image: bool,
    pub last_error: Option<String>,
}

pub struct SessionController<S> {
    inner: Arc<Mutex<Inner>>,
    store: Arc<S>,
    cfg: Arc<SessionConfig>,
    event_tx: UnboundedSender<SessionEvent>,
    status: StatusBoard,
}

impl<S> Clone for SessionController<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            store: self.store.clone(),
            cfg: self.cfg.clone(),
            event_tx: self.event_tx.clone(),
            status: self.status.clone(),
        }
    }
}

impl<S: ResultStore + 'static> SessionController<S> {
    pub fn new(
        store: Arc<S>,
        cfg: SessionConfig,
        event_tx: UnboundedSender<SessionEvent>,
        status: StatusBoard,
    ) -> Self {
        status.post(STATUS_READY, false);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: SessionState::new(),
                generation: 0,
                tasks: SessionTasks::default(),
                report: None,
            })),
            store,
            cfg: Arc::new(cfg),
            event_tx,
            status,
        }
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.lock().await;
        SessionSnapshot {
            phase: inner.state.phase,
            generation: inner.generation,
            live_tasks: inner.tasks.live(),
            has_pending_image: inner.state.pending_image.is_some(),
            last_error: inner.state.last_error.clone(),
        }
    }

    pub async fn phase(&self) -> SessionPhase {
        self.inner.lock().await.state.phase
    }

    #[cfg(test)]
    pub async fn report(&self) -> Option<Report> {
        self.inner.lock().await.report.clone()
    }

    /// Image of the current attempt, for the operator's reference.
    pub async fn pending_image(&self) -> Option<Arc<CapturedImage>> {
        self.inner.lock().await.state.pending_image.clone()
    }

    pub async fn begin_capture(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        let phase = inner.state.advance(SessionAction::BeginCapture)?;
        log::info!("session {}: capturing", inner.generation);
        self.emit(SessionEvent::PhaseChanged { phase });
        Ok(())
    }

    /// Camera denied or unavailable. Passes through `Failed` and lands back in
    /// `Capturing` with the reason recorded.
    pub async fn report_camera_failure(&self, reason: &str) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        let phase = inner.state.advance(SessionAction::CameraFailed)?;
        self.emit(SessionEvent::PhaseChanged { phase });

        let err = CaptureError::CameraUnavailable(reason.to_string());
        log::warn!("session {}: {err}", inner.generation);
        inner.state.last_error = Some(err.to_string());
        self.emit(SessionEvent::Info(InfoEvent::CameraFailed(reason.to_string())));

        let phase = inner.state.advance(SessionAction::BeginCapture)?;
        self.emit(SessionEvent::PhaseChanged { phase });
        Ok(())
    }

    /// Validate an image and start processing it.
    ///
    /// A rejected image leaves the session in `Capturing`.
    pub async fn submit_image(&self, image: CapturedImage) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        if inner.state.phase != SessionPhase::Capturing {
            return Err(TransitionError {
                from: inner.state.phase,
                action: SessionAction::SubmitImage,
            }
            .into());
        }
        if let Err(e) = capture::validate(&image, self.cfg.max_image_bytes) {
            log::info!("session {}: image rejected: {e}", inner.generation);
            inner.state.last_error = Some(e.to_string());
            self.emit(SessionEvent::Info(InfoEvent::Validation(e.to_string())));
            return Err(e.into());
        }

        let phase = inner.state.advance(SessionAction::SubmitImage)?;
        let generation = inner.generation;
        log::info!(
            "session {generation}: processing {} bytes ({})",
            image.size(),
            image.mime
        );
        inner.state.begin_processing(Arc::new(image), Instant::now());
        self.status.post(STATUS_STARTED, true);
        self.emit(SessionEvent::PhaseChanged { phase });
        inner.tasks.staging = Some(self.spawn_staging(generation));
        Ok(())
    }

    /// Return to `Idle` from any phase, cancelling every task of the current
    /// session and emptying the result slot. Safe to call repeatedly.
    pub async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        let was = inner.state.phase;
        inner.generation = inner.generation.wrapping_add(1);
        inner.tasks.abort_all();
        inner.state.reset();
        inner.report = None;
        if let Err(e) = self.store.clear().await {
            log::warn!("reset: failed to clear result slot: {e}");
        }
        self.status.post(STATUS_READY, false);
        log::info!("session reset from {was:?}, generation {}", inner.generation);
        self.emit(SessionEvent::PhaseChanged {
            phase: SessionPhase::Idle,
        });
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.event_tx.send(event);
    }

    fn stage_delay(&self) -> Duration {
        let jitter_ms = self.cfg.stage_jitter.as_millis() as u64;
        let extra = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..jitter_ms)
        };
        self.cfg.stage_min + Duration::from_millis(extra)
    }

    fn spawn_staging(&self, generation: u64) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let total = PROCESSING_STEPS.len();
            for (index, label) in PROCESSING_STEPS.iter().copied().enumerate() {
                let progress = ((index + 1) * STAGED_PROGRESS_CAP / total) as u8;
                this.emit(SessionEvent::Stage {
                    index,
                    total,
                    label,
                    progress,
                });
                tokio::time::sleep(this.stage_delay()).await;
            }
            this.enter_awaiting(generation).await;
        })
    }

    async fn enter_awaiting(&self, generation: u64) {
        let mut inner = self.inner.lock().await;
        if inner.generation != generation {
            log::debug!("session {generation}: stale staging completion ignored");
            return;
        }
        let phase = match inner.state.advance(SessionAction::AwaitResult) {
            Ok(phase) => phase,
            Err(e) => {
                log::debug!("session {generation}: {e}");
                return;
            }
        };
        // Called from the staging task itself; detach rather than abort.
        inner.tasks.staging = None;
        log::info!(
            "session {generation}: awaiting result (poll every {:?}, fallback after {:?})",
            self.cfg.poll_interval,
            self.cfg.fallback_ceiling
        );
        self.emit(SessionEvent::PhaseChanged { phase });
        self.emit(SessionEvent::Info(InfoEvent::WaitingForOperator));
        inner.tasks.poller = Some(self.spawn_poller(generation));
        inner.tasks.fallback = Some(self.spawn_fallback(generation));
    }

    fn spawn_poller(&self, generation: u64) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let record =
                poller::poll_until_ready(this.store.as_ref(), this.cfg.poll_interval).await;
            this.apply_result(generation, record, ResultSource::Operator)
                .await;
        })
    }

    fn spawn_fallback(&self, generation: u64) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let record = fallback::wait_for_ceiling(this.cfg.fallback_ceiling).await;
            this.apply_result(generation, record, ResultSource::Fallback)
                .await;
        })
    }

    /// Apply the first record of a session. Returns `false` when the session
    /// has moved on (reset, or the other producer already won).
    pub(crate) async fn apply_result(
        &self,
        generation: u64,
        record: ResultRecord,
        source: ResultSource,
    ) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.generation != generation || inner.state.phase != SessionPhase::AwaitingResult {
            log::debug!("session {generation}: late {source:?} result dropped");
            return false;
        }

        // The other producer is disabled before any state changes.
        match source {
            ResultSource::Operator => {
                if let Some(h) = inner.tasks.fallback.take() {
                    h.abort();
                }
                inner.tasks.poller = None;
            }
            ResultSource::Fallback => {
                if let Some(h) = inner.tasks.poller.take() {
                    h.abort();
                }
                inner.tasks.fallback = None;
            }
        }
        if let Err(e) = self.store.clear().await {
            log::warn!("session {generation}: failed to clear result slot: {e}");
        }

        // The report exists before the phase says Complete.
        let processing_time = inner.state.elapsed(Instant::now());
        let report = Report::new(record, processing_time);
        let phase = match inner.state.advance(SessionAction::ApplyResult) {
            Ok(phase) => phase,
            Err(e) => {
                log::error!("session {generation}: {e}");
                return false;
            }
        };
        match source {
            ResultSource::Operator => log::info!("session {generation}: operator result consumed"),
            ResultSource::Fallback => log::info!(
                "session {generation}: no operator result within {:?}, using fallback",
                self.cfg.fallback_ceiling
            ),
        }

        inner.state.pending_image = None;
        inner.report = Some(report.clone());
        self.status.post(STATUS_COMPLETED, false);

        let total = PROCESSING_STEPS.len();
        self.emit(SessionEvent::Stage {
            index: total,
            total,
            label: "Analysis complete!",
            progress: 100,
        });
        self.emit(SessionEvent::PhaseChanged { phase });
        self.emit(SessionEvent::Completed {
            report: Box::new(report),
        });
        true
    }
}
