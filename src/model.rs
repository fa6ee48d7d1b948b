use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

pub const DEFAULT_IMAGE_QUALITY: &str = "Good";

/// Qualitative bucket used both as an operator-supplied category and as the
/// derived recommendation tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Low,
    Medium,
    Good,
}

impl Tier {
    /// Parse a category label. Unknown labels yield `None` so callers fall back
    /// to threshold derivation.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Tier::Low),
            "medium" => Some(Tier::Medium),
            "good" => Some(Tier::Good),
            _ => None,
        }
    }
}

/// The analysis outcome handed from the operator (or the fallback) to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    pub hair_count: u64,
    pub confidence: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Tier>,
    pub image_quality: String,
}

impl ResultRecord {
    /// Interpret an arbitrary store value as a record.
    ///
    /// Returns `None` unless `hairCount` is a positive integer and `confidence`
    /// is an integer in `0..=100`. Extra fields are ignored, an unknown
    /// `category` is treated as absent and a missing `imageQuality` reads as
    /// [`DEFAULT_IMAGE_QUALITY`].
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let hair_count = obj.get("hairCount")?.as_u64().filter(|n| *n > 0)?;
        let confidence = obj
            .get("confidence")?
            .as_u64()
            .filter(|c| *c <= 100)
            .and_then(|c| u8::try_from(c).ok())?;
        let category = obj
            .get("category")
            .and_then(Value::as_str)
            .and_then(Tier::parse);
        let image_quality = obj
            .get("imageQuality")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_IMAGE_QUALITY)
            .to_string();
        Some(Self {
            hair_count,
            confidence,
            category,
            image_quality,
        })
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Where the applied record came from. Logged, never shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultSource {
    Operator,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    Idle,
    Capturing,
    Processing,
    AwaitingResult,
    Complete,
    Failed,
}

impl Default for SessionPhase {
    fn default() -> Self {
        SessionPhase::Idle
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub fallback_ceiling: Duration,
    #[serde(with = "humantime_serde")]
    pub stage_min: Duration,
    #[serde(with = "humantime_serde")]
    pub stage_jitter: Duration,
    pub max_image_bytes: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            fallback_ceiling: Duration::from_secs(30),
            stage_min: Duration::from_millis(1200),
            stage_jitter: Duration::from_millis(800),
            max_image_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Events emitted by the session controller and consumed by presentation layers.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    PhaseChanged {
        phase: SessionPhase,
    },
    Stage {
        index: usize,
        total: usize,
        label: &'static str,
        progress: u8,
    },
    Info(InfoEvent),
    Completed {
        // Boxed to keep the event small; the report carries recommendation text.
        report: Box<crate::report::Report>,
    },
}

#[derive(Debug, Clone)]
pub enum InfoEvent {
    Message(String),
    Validation(String),
    CameraFailed(String),
    WaitingForOperator,
}

impl InfoEvent {
    /// Render a human-readable message for UI/CLI layers.
    pub fn to_message(&self) -> String {
        match self {
            InfoEvent::Message(msg) => msg.clone(),
            InfoEvent::Validation(msg) => msg.clone(),
            InfoEvent::CameraFailed(reason) => {
                format!("Camera unavailable: {reason}. Try again or upload a file.")
            }
            InfoEvent::WaitingForOperator => "Finalizing analysis results...".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn well_formed_record_is_parsed() {
        let v = json!({
            "hairCount": 92000,
            "confidence": 88,
            "category": "good",
            "imageQuality": "Excellent",
            "customMessage": "ignored",
        });
        let r = ResultRecord::from_value(&v).unwrap();
        assert_eq!(r.hair_count, 92000);
        assert_eq!(r.confidence, 88);
        assert_eq!(r.category, Some(Tier::Good));
        assert_eq!(r.image_quality, "Excellent");
    }

    #[test]
    fn missing_required_fields_read_as_absent() {
        assert!(ResultRecord::from_value(&json!({ "confidence": 80 })).is_none());
        assert!(ResultRecord::from_value(&json!({ "hairCount": 80000 })).is_none());
        assert!(ResultRecord::from_value(&json!({})).is_none());
        assert!(ResultRecord::from_value(&Value::Null).is_none());
        assert!(ResultRecord::from_value(&json!([1, 2, 3])).is_none());
    }

    #[test]
    fn out_of_range_values_read_as_absent() {
        assert!(ResultRecord::from_value(&json!({ "hairCount": 0, "confidence": 80 })).is_none());
        assert!(
            ResultRecord::from_value(&json!({ "hairCount": -5, "confidence": 80 })).is_none()
        );
        assert!(
            ResultRecord::from_value(&json!({ "hairCount": 1000, "confidence": 101 })).is_none()
        );
        assert!(
            ResultRecord::from_value(&json!({ "hairCount": "85000", "confidence": 80 })).is_none()
        );
    }

    #[test]
    fn unknown_category_and_missing_quality_fall_back() {
        let v = json!({ "hairCount": 40000, "confidence": 0, "category": "superb" });
        let r = ResultRecord::from_value(&v).unwrap();
        assert_eq!(r.category, None);
        assert_eq!(r.confidence, 0);
        assert_eq!(r.image_quality, DEFAULT_IMAGE_QUALITY);
    }

    #[test]
    fn record_value_uses_wire_field_names() {
        let r = ResultRecord {
            hair_count: 1,
            confidence: 2,
            category: None,
            image_quality: "Fair".into(),
        };
        let v = r.to_value();
        assert_eq!(v["hairCount"], 1);
        assert_eq!(v["imageQuality"], "Fair");
        assert!(v.get("category").is_none());
        assert_eq!(ResultRecord::from_value(&v), Some(r));
    }
}
