//! Operator-side result publishing.

mod status;

pub use status::{
    PublisherStatus, StatusBoard, STATUS_COMPLETED, STATUS_READY, STATUS_SENT,
    STATUS_SEND_FAILED, STATUS_STARTED,
};

use crate::model::{ResultRecord, Tier};
use crate::store::{ResultStore, StoreError};
use serde_json::Value;
use std::ops::RangeInclusive;
use std::sync::Arc;

pub const DEFAULT_HAIR_COUNT: u64 = 85_000;
pub const DEFAULT_CONFIDENCE: u8 = 87;
pub const DEFAULT_CATEGORY: Tier = Tier::Medium;

/// Operator quick-picks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Scenario {
    Severe,
    Thinning,
    Moderate,
    Healthy,
    Thick,
    Exceptional,
}

impl Scenario {
    /// `(hair_count, confidence)` for the preset.
    pub fn values(self) -> (u64, u8) {
        match self {
            Scenario::Severe => (35_000, 92),
            Scenario::Thinning => (62_000, 88),
            Scenario::Moderate => (85_000, 87),
            Scenario::Healthy => (115_000, 90),
            Scenario::Thick => (140_000, 94),
            Scenario::Exceptional => (165_000, 96),
        }
    }
}

/// Raw operator input. Numeric fields are free text as typed.
#[derive(Debug, Clone, Default)]
pub struct PublishInput {
    pub scenario: Option<Scenario>,
    pub hair_count: Option<String>,
    pub confidence: Option<String>,
    pub category: Option<String>,
    pub image_quality: Option<String>,
    pub custom_message: Option<String>,
}

/// Hair counts an operator may enter by hand.
pub const MANUAL_HAIR_COUNT: RangeInclusive<u64> = 5_000..=200_000;

/// Leading integer of `raw`, read the way a browser's `parseInt` does:
/// optional whitespace and sign, then digits up to the first non-digit.
/// `None` when no digit leads or the value does not fit.
fn parse_leading_int(raw: &str) -> Option<i64> {
    let s = raw.trim_start();
    let (negative, rest) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let magnitude: i64 = rest[..end].parse().ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

fn manual_hair_count(raw: &str) -> Option<u64> {
    parse_leading_int(raw)
        .and_then(|n| u64::try_from(n).ok())
        .filter(|n| MANUAL_HAIR_COUNT.contains(n))
}

/// Non-negative confidence; values above 100 are clamped.
fn manual_confidence(raw: &str) -> Option<u8> {
    parse_leading_int(raw)
        .and_then(|n| u64::try_from(n).ok())
        .map(|c| c.min(100) as u8)
}

impl PublishInput {
    /// Build a record, substituting defaults for anything missing or invalid.
    pub fn to_record(&self) -> ResultRecord {
        let preset = self.scenario.map(Scenario::values);
        let hair_count = self
            .hair_count
            .as_deref()
            .and_then(manual_hair_count)
            .or(preset.map(|(count, _)| count))
            .unwrap_or(DEFAULT_HAIR_COUNT);
        let confidence = self
            .confidence
            .as_deref()
            .and_then(manual_confidence)
            .or(preset.map(|(_, conf)| conf))
            .unwrap_or(DEFAULT_CONFIDENCE);
        let category = self
            .category
            .as_deref()
            .and_then(Tier::parse)
            .unwrap_or(DEFAULT_CATEGORY);
        let image_quality = self
            .image_quality
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .unwrap_or(crate::model::DEFAULT_IMAGE_QUALITY)
            .to_string();
        ResultRecord {
            hair_count,
            confidence,
            category: Some(category),
            image_quality,
        }
    }
}

pub struct ResultPublisher<S> {
    store: Arc<S>,
    status: StatusBoard,
}

impl<S: ResultStore> ResultPublisher<S> {
    pub fn new(store: Arc<S>, status: StatusBoard) -> Self {
        Self { store, status }
    }

    pub fn status(&self) -> &StatusBoard {
        &self.status
    }

    /// Commit operator input to the store, replacing any prior value.
    ///
    /// Input never causes rejection: invalid fields take their defaults. A
    /// failed store write is returned as an error (and posted to the status
    /// board) so the operator knows to retry.
    pub async fn publish(&self, input: &PublishInput) -> Result<ResultRecord, StoreError> {
        let record = input.to_record();
        let mut payload = record.to_value();
        if let Value::Object(map) = &mut payload {
            if let Some(msg) = input.custom_message.as_deref().filter(|m| !m.is_empty()) {
                map.insert("customMessage".into(), Value::from(msg));
            }
            map.insert("timestamp".into(), Value::from(status::now_millis()));
        }

        log::info!(
            "publishing result: {} hairs, {}% confidence",
            record.hair_count,
            record.confidence
        );
        match self.store.put(&payload).await {
            Ok(()) => {
                self.status.post(STATUS_SENT, true);
                Ok(record)
            }
            Err(e) => {
                log::warn!("publish failed: {e}");
                self.status.post(STATUS_SEND_FAILED, false);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use async_trait::async_trait;

    struct ReadOnlyStore;

    #[async_trait]
    impl ResultStore for ReadOnlyStore {
        async fn get(&self) -> Result<Option<Value>, StoreError> {
            Ok(None)
        }
        async fn put(&self, _: &Value) -> Result<(), StoreError> {
            Err(StoreError::Status(500))
        }
        async fn clear(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn input() -> PublishInput {
        PublishInput::default()
    }

    #[test]
    fn empty_input_uses_defaults() {
        let r = input().to_record();
        assert_eq!(r.hair_count, 85_000);
        assert_eq!(r.confidence, 87);
        assert_eq!(r.category, Some(Tier::Medium));
        assert_eq!(r.image_quality, "Good");
    }

    #[test]
    fn invalid_numbers_fall_back() {
        let r = PublishInput {
            hair_count: Some("lots".into()),
            confidence: Some("abc".into()),
            category: Some("bogus".into()),
            image_quality: Some("  ".into()),
            ..input()
        }
        .to_record();
        assert_eq!(r.hair_count, 85_000);
        assert_eq!(r.confidence, 87);
        assert_eq!(r.category, Some(Tier::Medium));
        assert_eq!(r.image_quality, "Good");

        let r = PublishInput {
            hair_count: Some("0".into()),
            confidence: Some("250".into()),
            ..input()
        }
        .to_record();
        assert_eq!(r.hair_count, 85_000);
        assert_eq!(r.confidence, 100);
    }

    #[test]
    fn numbers_parse_leading_integer_only() {
        let count = |raw: &str| {
            PublishInput {
                hair_count: Some(raw.into()),
                ..input()
            }
            .to_record()
            .hair_count
        };
        assert_eq!(count("12500.7"), 12_500);
        assert_eq!(count("  90000 hairs"), 90_000);
        assert_eq!(count("+60000"), 60_000);
        assert_eq!(count("1,20,000"), 85_000);
        assert_eq!(count("-90000"), 85_000);
        assert_eq!(count("12.5"), 85_000);
        assert_eq!(count("3"), 85_000);
        assert_eq!(count("99999999999999999999999"), 85_000);

        assert_eq!(count("5000"), 5_000);
        assert_eq!(count("4999"), 85_000);
        assert_eq!(count("200000"), 200_000);
        assert_eq!(count("200001"), 85_000);

        let confidence = |raw: &str| {
            PublishInput {
                confidence: Some(raw.into()),
                ..input()
            }
            .to_record()
            .confidence
        };
        assert_eq!(confidence("87.5"), 87);
        assert_eq!(confidence("0"), 0);
        assert_eq!(confidence("-5"), 87);
        assert_eq!(confidence("100%"), 100);
    }

    #[test]
    fn scenario_fills_fields_explicit_values_win() {
        let r = PublishInput {
            scenario: Some(Scenario::Severe),
            ..input()
        }
        .to_record();
        assert_eq!((r.hair_count, r.confidence), (35_000, 92));

        let r = PublishInput {
            scenario: Some(Scenario::Severe),
            confidence: Some("70".into()),
            category: Some("LOW".into()),
            ..input()
        }
        .to_record();
        assert_eq!((r.hair_count, r.confidence), (35_000, 70));
        assert_eq!(r.category, Some(Tier::Low));
    }

    #[tokio::test]
    async fn publish_overwrites_slot_and_updates_status() {
        let store = Arc::new(MemoryStore::new());
        let publisher = ResultPublisher::new(store.clone(), StatusBoard::new());

        publisher
            .publish(&PublishInput {
                hair_count: Some("40000".into()),
                ..input()
            })
            .await
            .unwrap();
        let record = publisher
            .publish(&PublishInput {
                hair_count: Some("99000".into()),
                custom_message: Some("looks fine".into()),
                ..input()
            })
            .await
            .unwrap();

        let stored = store.get().await.unwrap().unwrap();
        assert_eq!(ResultRecord::from_value(&stored), Some(record));
        assert_eq!(stored["customMessage"], "looks fine");
        assert!(stored["timestamp"].as_u64().is_some());
        assert_eq!(publisher.status().current().message, STATUS_SENT);
    }

    #[tokio::test]
    async fn failed_write_is_reported_not_rejected() {
        let publisher = ResultPublisher::new(Arc::new(ReadOnlyStore), StatusBoard::new());
        let err = publisher
            .publish(&PublishInput {
                hair_count: Some("nonsense".into()),
                ..input()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Status(500)));
        let status = publisher.status().current();
        assert_eq!(status.message, STATUS_SEND_FAILED);
        assert!(!status.is_ready);
    }
}
