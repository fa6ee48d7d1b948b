//! Report assembly for a completed session.
//!
//! Derives the recommendation tier, attaches the recommendation content and
//! formats terminal lines and the downloadable JSON report.

use crate::model::{ResultRecord, Tier};
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

/// Hair counts below this are `Low`.
pub const LOW_THRESHOLD: u64 = 50_000;
/// Hair counts below this (and at least [`LOW_THRESHOLD`]) are `Medium`.
pub const MEDIUM_THRESHOLD: u64 = 100_000;

const DISCLAIMER: &str = "This analysis is for educational purposes only. Consult a healthcare professional for medical advice.";
const ALGORITHM: &str = "Advanced CV-2024 v2.1";

/// Pick the recommendation tier for a final record.
///
/// A present category wins; otherwise the count is bucketed against the
/// ascending thresholds. Total over every `u64`.
pub fn derive_tier(hair_count: u64, category: Option<Tier>) -> Tier {
    if let Some(tier) = category {
        return tier;
    }
    if hair_count < LOW_THRESHOLD {
        Tier::Low
    } else if hair_count < MEDIUM_THRESHOLD {
        Tier::Medium
    } else {
        Tier::Good
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub title: &'static str,
    pub message: &'static str,
    pub status: &'static str,
    pub tips: &'static [&'static str],
}

static LOW: Recommendation = Recommendation {
    title: "Low Hair Density Detected",
    message: "Consider consulting a dermatologist. Early intervention can be very effective.",
    status: "needs-attention",
    tips: &[
        "Schedule professional consultation",
        "Consider proven hair loss treatments",
        "Maintain healthy diet with proteins",
        "Avoid harsh chemical treatments",
        "Use gentle, sulfate-free products",
    ],
};

static MEDIUM: Recommendation = Recommendation {
    title: "Moderate Hair Density",
    message: "Your hair shows some thinning. A good hair care routine can help maintain and improve density.",
    status: "moderate",
    tips: &[
        "Start comprehensive hair care routine",
        "Use strengthening shampoos with biotin",
        "Apply weekly conditioning treatments",
        "Consider hair growth supplements",
        "Minimize heat styling damage",
    ],
};

static GOOD: Recommendation = Recommendation {
    title: "Good Hair Health",
    message: "Your hair density is in a healthy range. Focus on maintenance to keep it this way.",
    status: "excellent",
    tips: &[
        "Continue current hair care routine",
        "Use UV protection when outdoors",
        "Schedule regular trims every 6-8 weeks",
        "Maintain balanced, nutritious diet",
        "Monitor any changes over time",
    ],
};

impl Tier {
    pub fn recommendation(self) -> &'static Recommendation {
        match self {
            Tier::Low => &LOW,
            Tier::Medium => &MEDIUM,
            Tier::Good => &GOOD,
        }
    }
}

/// Hairs per cm², rounded half up. Total over every `u64`.
pub fn density_per_cm2(hair_count: u64) -> u64 {
    hair_count / 100 + u64::from(hair_count % 100 >= 50)
}

/// Finished report handed to presentation layers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub record: ResultRecord,
    #[serde(with = "humantime_serde")]
    pub processing_time: Duration,
    pub tier: Tier,
    pub recommendation: Recommendation,
    /// Hairs per cm², rounded.
    pub hair_density: u64,
    pub generated_at: String,
}

impl Report {
    pub fn new(record: ResultRecord, processing_time: Duration) -> Self {
        let tier = derive_tier(record.hair_count, record.category);
        let hair_density = density_per_cm2(record.hair_count);
        Self {
            tier,
            recommendation: tier.recommendation().clone(),
            hair_density,
            processing_time,
            generated_at: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_else(|_| "now".into()),
            record,
        }
    }

    /// Human-readable health status, e.g. `NEEDS ATTENTION`.
    pub fn health_status(&self) -> String {
        self.recommendation.status.replace('-', " ").to_uppercase()
    }
}

/// Format a report as terminal lines.
pub fn build_text_summary(report: &Report) -> Vec<String> {
    let mut lines = Vec::new();
    lines.push(format!("Hair count: {} hairs", report.record.hair_count));
    lines.push(format!("Confidence: {}%", report.record.confidence));
    lines.push(format!(
        "Processing time: {}ms",
        report.processing_time.as_millis()
    ));
    lines.push(format!("Image quality: {}", report.record.image_quality));
    lines.push(format!("Hair density: {} hairs/cm²", report.hair_density));
    lines.push(format!(
        "{} [{}]",
        report.recommendation.title,
        report.health_status()
    ));
    lines.push(report.recommendation.message.to_string());
    for tip in report.recommendation.tips {
        lines.push(format!("  - {tip}"));
    }
    lines
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportResults {
    hair_count: String,
    confidence: String,
    processing_time: String,
    image_quality: String,
    hair_density: String,
}

#[derive(Serialize)]
struct ExportRecommendations<'a> {
    title: &'a str,
    status: String,
    message: &'a str,
    tips: &'a [&'a str],
}

#[derive(Serialize)]
struct ExportDocument<'a> {
    title: &'a str,
    date: &'a str,
    results: ExportResults,
    recommendations: ExportRecommendations<'a>,
    disclaimer: &'a str,
    algorithm: &'a str,
}

/// Write the downloadable report document to `path`.
pub fn export_json(path: &Path, report: &Report) -> Result<()> {
    let doc = ExportDocument {
        title: "Hair Analysis Report",
        date: &report.generated_at,
        results: ExportResults {
            hair_count: format!("{} hairs", report.record.hair_count),
            confidence: format!("{}%", report.record.confidence),
            processing_time: format!("{}ms", report.processing_time.as_millis()),
            image_quality: report.record.image_quality.clone(),
            hair_density: format!("{} hairs/cm²", report.hair_density),
        },
        recommendations: ExportRecommendations {
            title: report.recommendation.title,
            status: report.health_status(),
            message: report.recommendation.message,
            tips: report.recommendation.tips,
        },
        disclaimer: DISCLAIMER,
        algorithm: ALGORITHM,
    };
    let data = serde_json::to_vec_pretty(&doc)?;
    std::fs::write(path, data).with_context(|| format!("write report {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(hair_count: u64, category: Option<Tier>) -> ResultRecord {
        ResultRecord {
            hair_count,
            confidence: 87,
            category,
            image_quality: "Good".into(),
        }
    }

    #[test]
    fn tier_boundaries() {
        assert_eq!(derive_tier(0, None), Tier::Low);
        assert_eq!(derive_tier(49_999, None), Tier::Low);
        assert_eq!(derive_tier(50_000, None), Tier::Medium);
        assert_eq!(derive_tier(99_999, None), Tier::Medium);
        assert_eq!(derive_tier(100_000, None), Tier::Good);
        assert_eq!(derive_tier(u64::MAX, None), Tier::Good);
    }

    #[test]
    fn tier_is_monotonic_across_range() {
        let mut last = Tier::Low;
        for count in (0..200_000u64).step_by(997) {
            let tier = derive_tier(count, None);
            let rank = |t: Tier| match t {
                Tier::Low => 0,
                Tier::Medium => 1,
                Tier::Good => 2,
            };
            assert!(rank(tier) >= rank(last), "tier went backwards at {count}");
            last = tier;
        }
    }

    #[test]
    fn category_overrides_thresholds() {
        assert_eq!(derive_tier(10, Some(Tier::Good)), Tier::Good);
        assert_eq!(derive_tier(500_000, Some(Tier::Low)), Tier::Low);
    }

    #[test]
    fn report_carries_matching_recommendation() {
        let report = Report::new(record(42_000, None), Duration::from_millis(1234));
        assert_eq!(report.tier, Tier::Low);
        assert_eq!(report.recommendation.title, "Low Hair Density Detected");
        assert_eq!(report.health_status(), "NEEDS ATTENTION");
        assert_eq!(report.hair_density, 420);

        let lines = build_text_summary(&report);
        assert_eq!(lines[0], "Hair count: 42000 hairs");
        assert!(lines.iter().any(|l| l == "Processing time: 1234ms"));
        assert!(lines.iter().any(|l| l.contains("Schedule professional consultation")));
    }

    #[test]
    fn report_handles_extreme_counts() {
        assert_eq!(density_per_cm2(0), 0);
        assert_eq!(density_per_cm2(49), 0);
        assert_eq!(density_per_cm2(50), 1);
        assert_eq!(density_per_cm2(149), 1);
        assert_eq!(density_per_cm2(150), 2);

        let report = Report::new(record(u64::MAX, None), Duration::ZERO);
        assert_eq!(report.tier, Tier::Good);
        assert_eq!(report.hair_density, u64::MAX / 100 + 1);
        assert!(build_text_summary(&report)[0].contains(&u64::MAX.to_string()));

        let report = Report::new(record(1, None), Duration::ZERO);
        assert_eq!(report.tier, Tier::Low);
        assert_eq!(report.hair_density, 0);
    }

    #[test]
    fn export_writes_download_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let report = Report::new(record(115_000, Some(Tier::Medium)), Duration::from_secs(20));
        export_json(&path, &report).unwrap();

        let doc: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(doc["title"], "Hair Analysis Report");
        assert_eq!(doc["results"]["hairCount"], "115000 hairs");
        assert_eq!(doc["results"]["processingTime"], "20000ms");
        assert_eq!(doc["recommendations"]["title"], "Moderate Hair Density");
        assert_eq!(doc["recommendations"]["tips"].as_array().unwrap().len(), 5);
    }
}
