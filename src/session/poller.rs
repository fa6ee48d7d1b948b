//! Interval polling of the result slot.

use crate::model::ResultRecord;
use crate::store::ResultStore;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// What a single read of the slot produced.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Ready(ResultRecord),
    Empty,
    Malformed,
    Unreachable(String),
}

/// Read the slot once. Every failure mode is "not yet ready".
pub async fn poll_once<S: ResultStore + ?Sized>(store: &S) -> PollOutcome {
    match store.get().await {
        Ok(Some(value)) => match ResultRecord::from_value(&value) {
            Some(record) => PollOutcome::Ready(record),
            None => PollOutcome::Malformed,
        },
        Ok(None) => PollOutcome::Empty,
        Err(e) => PollOutcome::Unreachable(e.to_string()),
    }
}

/// Poll every `every` until a well-formed record appears.
///
/// The first read happens one full interval after the call. Never returns
/// otherwise; callers stop polling by dropping or aborting the future.
pub async fn poll_until_ready<S: ResultStore + ?Sized>(store: &S, every: Duration) -> ResultRecord {
    let every = every.max(Duration::from_millis(1));
    let mut ticker = interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut attempt = 0u64;
    loop {
        ticker.tick().await;
        attempt += 1;
        match poll_once(store).await {
            PollOutcome::Ready(record) => {
                log::debug!("poll #{attempt}: result ready");
                return record;
            }
            PollOutcome::Unreachable(err) => {
                log::debug!("poll #{attempt}: store unreachable ({err}), retrying");
            }
            other => log::debug!("poll #{attempt}: {other:?}, retrying"),
        }
    }
}
