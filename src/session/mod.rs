//! User-side analysis session.
//!
//! `controller` drives the phase machine. `poller` and `fallback` are the two
//! competing producers of the session's single result. `capture` validates
//! incoming images.

pub mod capture;
mod controller;
pub mod fallback;
pub mod poller;
mod state;

pub use capture::{CaptureError, CapturedImage};
pub use controller::SessionController;
pub use state::TransitionError;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
}
