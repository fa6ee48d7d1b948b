use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

pub const STATUS_READY: &str = "System ready - waiting for analysis";
pub const STATUS_STARTED: &str = "New analysis started - ready for admin input";
pub const STATUS_COMPLETED: &str = "Analysis completed - waiting for new analysis";
pub const STATUS_SENT: &str = "Results sent to user successfully";
pub const STATUS_SEND_FAILED: &str = "Transmission failed - please retry";

/// Operator-facing status line. Not part of the handoff contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublisherStatus {
    pub message: String,
    pub is_ready: bool,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

impl PublisherStatus {
    pub fn new(message: impl Into<String>, is_ready: bool) -> Self {
        Self {
            message: message.into(),
            is_ready,
            timestamp: now_millis(),
        }
    }
}

pub(crate) fn now_millis() -> u64 {
    let nanos = time::OffsetDateTime::now_utc().unix_timestamp_nanos();
    u64::try_from(nanos / 1_000_000).unwrap_or(0)
}

/// Latest-value broadcast of [`PublisherStatus`]. Cloning shares the board.
#[derive(Debug, Clone)]
pub struct StatusBoard {
    tx: Arc<watch::Sender<PublisherStatus>>,
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBoard {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(PublisherStatus::new(STATUS_READY, false));
        Self { tx: Arc::new(tx) }
    }

    pub fn post(&self, message: impl Into<String>, is_ready: bool) {
        self.set(PublisherStatus::new(message, is_ready));
    }

    pub fn set(&self, status: PublisherStatus) {
        self.tx.send_replace(status);
    }

    pub fn current(&self) -> PublisherStatus {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PublisherStatus> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_latest_status() {
        let board = StatusBoard::new();
        assert_eq!(board.current().message, STATUS_READY);

        let mut rx = board.subscribe();
        board.post(STATUS_STARTED, true);
        board.post(STATUS_COMPLETED, false);

        rx.changed().await.unwrap();
        let seen = rx.borrow_and_update().clone();
        assert_eq!(seen.message, STATUS_COMPLETED);
        assert!(!seen.is_ready);
        assert!(seen.timestamp > 0);
    }
}
