//! Threat classifier contract
//!
//! The job runner depends only on [`ThreatClassifier`]; the production
//! implementation is [`super::GroqClassifier`]. Verdict parsing lives here so
//! every implementation validates model output the same way.

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use vigil_common::Severity;

use crate::models::Verdict;

/// Description of the fixed image verdict
pub const IMAGE_PLACEHOLDER_DESCRIPTION: &str = "Image analysis not implemented yet";

/// Description of the verdict for audio with nothing to classify
pub const EMPTY_TRANSCRIPTION_DESCRIPTION: &str = "No transcription available to analyze";

/// Classifier errors
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Classifier not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Malformed verdict: {0}")]
    MalformedVerdict(String),
}

/// Classifies content as a security threat
///
/// One external call per invocation, no retry.
#[async_trait]
pub trait ThreatClassifier: Send + Sync {
    /// Classify text; `model_hint` overrides the configured model
    async fn classify_text(
        &self,
        content: &str,
        model_hint: Option<&str>,
    ) -> Result<Verdict, ClassifierError>;

    /// Classify an audio transcription
    ///
    /// An empty transcription yields a "no threat" verdict without any call.
    async fn classify_audio(
        &self,
        transcription: &str,
        model_hint: Option<&str>,
    ) -> Result<Verdict, ClassifierError> {
        if transcription.trim().is_empty() {
            return Ok(Verdict::no_threat(EMPTY_TRANSCRIPTION_DESCRIPTION));
        }
        self.classify_text(transcription, model_hint).await
    }

    /// Image classification is not implemented; always "no threat"
    async fn classify_image(&self, _image: &[u8]) -> Result<Verdict, ClassifierError> {
        tracing::warn!("Image analysis not implemented yet, returning placeholder verdict");
        Ok(Verdict::no_threat(IMAGE_PLACEHOLDER_DESCRIPTION))
    }
}

/// Parse a model reply into a [`Verdict`]
///
/// Tolerates surrounding markdown code fences. `threat_detected` is always
/// required; the remaining keys are required when a threat is reported and
/// defaulted otherwise. Unknown severities and confidences outside [0, 1] are
/// rejected.
pub fn parse_verdict(reply: &str) -> Result<Verdict, ClassifierError> {
    let json_str = strip_code_fences(reply);

    let value: Value = serde_json::from_str(json_str).map_err(|e| {
        ClassifierError::MalformedVerdict(format!(
            "reply is not JSON: {}. Reply was: {}",
            e,
            truncate(reply.trim(), 200)
        ))
    })?;

    let Value::Object(obj) = value else {
        return Err(ClassifierError::MalformedVerdict(
            "reply is not a JSON object".to_string(),
        ));
    };

    let detected = match obj.get("threat_detected") {
        Some(Value::Bool(b)) => *b,
        Some(other) => {
            return Err(ClassifierError::MalformedVerdict(format!(
                "threat_detected must be a boolean, got {}",
                other
            )))
        }
        None => {
            return Err(ClassifierError::MalformedVerdict(
                "missing key threat_detected".to_string(),
            ))
        }
    };

    if !detected {
        let description = optional_string(&obj, "description")?
            .unwrap_or_else(|| "No threats detected".to_string());
        let mut verdict = Verdict::no_threat(description);
        if let Some(severity) = optional_string(&obj, "threat_level")? {
            verdict.severity = parse_severity(&severity)?;
        }
        if obj.contains_key("confidence_score") {
            verdict.confidence = required_confidence(&obj)?;
        }
        if let Some(kind) = optional_string(&obj, "threat_type")? {
            verdict.kind = kind;
        }
        if obj.contains_key("indicators") {
            verdict.indicators = required_indicators(&obj)?;
        }
        return Ok(verdict);
    }

    let severity = optional_string(&obj, "threat_level")?
        .ok_or_else(|| ClassifierError::MalformedVerdict("missing key threat_level".to_string()))?;

    Ok(Verdict {
        detected,
        severity: parse_severity(&severity)?,
        confidence: required_confidence(&obj)?,
        kind: optional_string(&obj, "threat_type")?.ok_or_else(|| {
            ClassifierError::MalformedVerdict("missing key threat_type".to_string())
        })?,
        description: optional_string(&obj, "description")?.ok_or_else(|| {
            ClassifierError::MalformedVerdict("missing key description".to_string())
        })?,
        indicators: required_indicators(&obj)?,
    })
}

fn optional_string(obj: &Map<String, Value>, key: &str) -> Result<Option<String>, ClassifierError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(ClassifierError::MalformedVerdict(format!(
            "{} must be a string, got {}",
            key, other
        ))),
    }
}

fn parse_severity(raw: &str) -> Result<Severity, ClassifierError> {
    raw.parse::<Severity>()
        .map_err(|_| ClassifierError::MalformedVerdict(format!("unknown threat_level '{}'", raw)))
}

fn required_confidence(obj: &Map<String, Value>) -> Result<f64, ClassifierError> {
    let confidence = obj
        .get("confidence_score")
        .and_then(Value::as_f64)
        .ok_or_else(|| {
            ClassifierError::MalformedVerdict("confidence_score must be a number".to_string())
        })?;

    if !(0.0..=1.0).contains(&confidence) {
        return Err(ClassifierError::MalformedVerdict(format!(
            "confidence_score {} outside [0, 1]",
            confidence
        )));
    }
    Ok(confidence)
}

fn required_indicators(obj: &Map<String, Value>) -> Result<Vec<String>, ClassifierError> {
    match obj.get("indicators") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                other => Err(ClassifierError::MalformedVerdict(format!(
                    "indicator must be a string, got {}",
                    other
                ))),
            })
            .collect(),
        Some(Value::Null) | None => Ok(Vec::new()),
        Some(other) => Err(ClassifierError::MalformedVerdict(format!(
            "indicators must be a list, got {}",
            other
        ))),
    }
}

/// Strip markdown code fences (```json ... ```) from a reply
fn strip_code_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(rest) = text.strip_prefix("```") {
        // Skip the language tag line
        let Some(nl) = rest.find('\n') else {
            return text;
        };
        let body = &rest[nl + 1..];
        return match body.rfind("```") {
            Some(close) => body[..close].trim(),
            None => body.trim(),
        };
    }
    text
}

/// Truncate a string for error messages
pub(crate) fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
