//! Response types returned by the summarisation service.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a detected violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
        })
    }
}

/// A clause that breaks a known rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// The offending text from the document
    pub violating_rule: String,
    /// The rule it breaks
    pub actual_rule: String,
    /// Where the rule comes from (statute, guideline, ...)
    pub source: String,
    pub severity: Severity,
}

/// Violation counts as reported by the service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregations {
    pub total_violations: u64,
    pub high_severity: u64,
    pub medium_severity: u64,
    pub low_severity: u64,
}

/// Full response of the `/analyze` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryResponse {
    pub summary: String,
    pub aggregations: Aggregations,
    #[serde(default)]
    pub violations: Vec<Violation>,
}

impl SummaryResponse {
    pub fn has_violations(&self) -> bool {
        !self.violations.is_empty()
    }
}

/// Response of the `/summarise` endpoint. Only the summary is required
/// for success.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummariseResponse {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub classification: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_analyze_response() {
        let body = r#"{
            "summary": "Shares data with advertisers.",
            "aggregations": {
                "total_violations": 2,
                "high_severity": 1,
                "medium_severity": 0,
                "low_severity": 1
            },
            "violations": [
                {"violating_rule": "We sell data", "actual_rule": "No sale without consent",
                 "source": "GDPR", "severity": "HIGH"},
                {"violating_rule": "Cookies forever", "actual_rule": "Limited retention",
                 "source": "ePrivacy", "severity": "LOW"}
            ]
        }"#;

        let response: SummaryResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.aggregations.total_violations, 2);
        assert_eq!(response.violations[0].severity, Severity::High);
        assert_eq!(response.violations[1].severity, Severity::Low);
        assert!(response.has_violations());
    }

    #[test]
    fn rejects_unknown_severity() {
        let body = r#"{"violating_rule": "a", "actual_rule": "b", "source": "c", "severity": "CRITICAL"}"#;
        assert!(serde_json::from_str::<Violation>(body).is_err());
    }

    #[test]
    fn summarise_response_tolerates_missing_fields() {
        let response: SummariseResponse = serde_json::from_str("{}").unwrap();
        assert!(response.summary.is_none());
        assert!(response.classification.is_none());
    }
}
