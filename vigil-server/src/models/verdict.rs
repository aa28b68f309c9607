//! Classifier verdict

use serde::{Deserialize, Serialize};
use vigil_common::Severity;

/// Structured classifier result for one input
///
/// Serialized with the classifier's wire keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    #[serde(rename = "threat_detected")]
    pub detected: bool,
    #[serde(rename = "threat_level")]
    pub severity: Severity,
    /// Always within [0.0, 1.0]
    #[serde(rename = "confidence_score")]
    pub confidence: f64,
    #[serde(rename = "threat_type")]
    pub kind: String,
    pub description: String,
    pub indicators: Vec<String>,
}

impl Verdict {
    /// Deterministic "no threat" verdict
    pub fn no_threat(description: impl Into<String>) -> Self {
        Self {
            detected: false,
            severity: Severity::Low,
            confidence: 0.0,
            kind: "NONE".to_string(),
            description: description.into(),
            indicators: Vec::new(),
        }
    }
}
