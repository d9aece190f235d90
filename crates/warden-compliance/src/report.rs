//! Coverage status and compliance reports.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::mapping::ComplianceMapping;

/// Coverage at or above which a framework is reported compliant.
pub const COMPLIANT_THRESHOLD: f64 = 80.0;
/// Coverage at or above which a framework is reported partially compliant.
pub const PARTIAL_THRESHOLD: f64 = 50.0;
/// Unmapped controls named individually in recommendations.
const RECOMMENDATION_SAMPLE: usize = 5;

/// Overall compliance level derived from coverage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComplianceLevel {
    Compliant,
    PartiallyCompliant,
    NonCompliant,
    NotFound,
}

impl ComplianceLevel {
    pub fn from_coverage(coverage: f64) -> Self {
        if coverage >= COMPLIANT_THRESHOLD {
            Self::Compliant
        } else if coverage >= PARTIAL_THRESHOLD {
            Self::PartiallyCompliant
        } else {
            Self::NonCompliant
        }
    }
}

impl std::fmt::Display for ComplianceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Compliant => write!(f, "compliant"),
            Self::PartiallyCompliant => write!(f, "partially-compliant"),
            Self::NonCompliant => write!(f, "non-compliant"),
            Self::NotFound => write!(f, "not-found"),
        }
    }
}

/// Coverage of one framework by the current mappings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceStatus {
    /// Framework id as requested.
    pub framework: String,
    /// Distinct control ids referenced by any mapping.
    pub mapped_controls: usize,
    pub total_controls: usize,
    /// `mapped_controls / total_controls * 100`, 0 when there are no controls.
    pub coverage: f64,
    pub mappings: Vec<ComplianceMapping>,
}

/// Coverage percentage; 0 when `total` is 0.
pub fn coverage(mapped: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        (mapped as f64) * 100.0 / (total as f64)
    }
}

/// Compliance report for one framework.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceReport {
    pub framework: String,
    /// Display name, absent when the framework is unknown.
    pub framework_name: Option<String>,
    pub generated_at: DateTime<Utc>,
    pub status: ComplianceLevel,
    pub coverage: f64,
    /// Distinct mapped policy ids, sorted.
    pub mapped_policies: Vec<String>,
    /// Control ids with no mapping, in catalog order.
    pub unmapped_controls: Vec<String>,
    pub recommendations: Vec<String>,
}

impl ComplianceReport {
    pub(crate) fn not_found(framework_id: &str) -> Self {
        Self {
            framework: framework_id.to_string(),
            framework_name: None,
            generated_at: Utc::now(),
            status: ComplianceLevel::NotFound,
            coverage: 0.0,
            mapped_policies: Vec::new(),
            unmapped_controls: Vec::new(),
            recommendations: vec![format!(
                "Framework '{framework_id}' is not registered; add it before mapping policies"
            )],
        }
    }

    /// Serializes the report as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(Into::into)
    }

    /// Writes the report as JSON to `path`.
    pub fn to_json_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = self.to_json()?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn is_compliant(&self) -> bool {
        self.status == ComplianceLevel::Compliant
    }
}

/// Textual hints derived from coverage and the unmapped controls.
pub(crate) fn recommendations(
    framework_name: &str,
    coverage: f64,
    mapped_policies: usize,
    unmapped_controls: &[String],
) -> Vec<String> {
    let mut hints = Vec::new();

    if mapped_policies == 0 {
        hints.push(format!("No policies are mapped to {framework_name} yet"));
    }
    if coverage < COMPLIANT_THRESHOLD {
        hints.push(format!(
            "Coverage is {coverage:.1}%; map policies to at least {COMPLIANT_THRESHOLD:.0}% of controls"
        ));
    }
    if !unmapped_controls.is_empty() {
        let sample = unmapped_controls
            .iter()
            .take(RECOMMENDATION_SAMPLE)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        let rest = unmapped_controls.len().saturating_sub(RECOMMENDATION_SAMPLE);
        if rest > 0 {
            hints.push(format!("Map policies to unmapped controls: {sample} and {rest} more"));
        } else {
            hints.push(format!("Map policies to unmapped controls: {sample}"));
        }
    } else {
        hints.push("All controls are covered; keep mapping evidence current".to_string());
    }

    hints
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_thresholds() {
        assert_eq!(ComplianceLevel::from_coverage(100.0), ComplianceLevel::Compliant);
        assert_eq!(ComplianceLevel::from_coverage(80.0), ComplianceLevel::Compliant);
        assert_eq!(ComplianceLevel::from_coverage(79.9), ComplianceLevel::PartiallyCompliant);
        assert_eq!(ComplianceLevel::from_coverage(50.0), ComplianceLevel::PartiallyCompliant);
        assert_eq!(ComplianceLevel::from_coverage(40.0), ComplianceLevel::NonCompliant);
        assert_eq!(ComplianceLevel::from_coverage(0.0), ComplianceLevel::NonCompliant);
    }

    #[test]
    fn test_level_serde() {
        assert_eq!(
            serde_json::to_value(ComplianceLevel::PartiallyCompliant).unwrap(),
            serde_json::json!("partially-compliant")
        );
        assert_eq!(ComplianceLevel::NotFound.to_string(), "not-found");
    }

    #[test]
    fn test_coverage() {
        assert!((coverage(2, 5) - 40.0).abs() < f64::EPSILON);
        assert!((coverage(0, 0)).abs() < f64::EPSILON);
        assert!((coverage(4, 4) - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_recommendations_sample_unmapped() {
        let unmapped: Vec<String> = (1..=7).map(|i| format!("c{i}")).collect();
        let hints = recommendations("F", 12.5, 1, &unmapped);
        assert!(hints.iter().any(|h| h.contains("12.5%")));
        assert!(hints.iter().any(|h| h.ends_with("c1, c2, c3, c4, c5 and 2 more")));

        let done = recommendations("F", 100.0, 3, &[]);
        assert_eq!(done, vec!["All controls are covered; keep mapping evidence current"]);
    }

    #[test]
    fn test_report_json_file() {
        let report = ComplianceReport::not_found("nope");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        report.to_json_file(&path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("\"not-found\""));
        assert!(written.contains("\"unmappedControls\""));
    }
}
