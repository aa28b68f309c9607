//! Persisted threat detections
//!
//! A common envelope plus a modality-specific detail variant. Only review
//! metadata and the false-positive flag change after creation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use vigil_common::{Modality, Severity};

use super::Verdict;

/// Characters of surrounding text kept on each side of a text match
pub const CONTEXT_WINDOW: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub id: i64,
    #[serde(rename = "user")]
    pub owner_id: i64,
    pub session_id: i64,
    #[serde(rename = "threat_level")]
    pub severity: Severity,
    pub description: String,
    pub threat_type: String,
    pub indicators: Vec<String>,
    #[serde(rename = "source_type")]
    pub modality: Modality,
    #[serde(rename = "confidence_score")]
    pub confidence: f64,
    pub is_false_positive: bool,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub details: DetectionDetail,
}

/// Modality-specific detection data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "modality", rename_all = "lowercase")]
pub enum DetectionDetail {
    Visual {
        capture_id: i64,
        bounding_box: Option<Value>,
        detected_objects: Vec<Value>,
    },
    Audio {
        capture_id: i64,
        /// Seconds from the start of the clip
        start_offset: f64,
        /// `None` when the clip duration is unknown
        end_offset: Option<f64>,
        transcription: Option<String>,
        features: Map<String, Value>,
    },
    Text {
        source_id: i64,
        /// Character offsets into the source content
        start_index: usize,
        end_index: usize,
        context: String,
        entities: Vec<String>,
        sentiment_score: Option<f64>,
    },
}

impl DetectionDetail {
    pub fn modality(&self) -> Modality {
        match self {
            DetectionDetail::Visual { .. } => Modality::Visual,
            DetectionDetail::Audio { .. } => Modality::Audio,
            DetectionDetail::Text { .. } => Modality::Text,
        }
    }

    /// Id of the capture/source the detection came from
    pub fn capture_id(&self) -> i64 {
        match self {
            DetectionDetail::Visual { capture_id, .. } => *capture_id,
            DetectionDetail::Audio { capture_id, .. } => *capture_id,
            DetectionDetail::Text { source_id, .. } => *source_id,
        }
    }
}

/// Detection about to be inserted
#[derive(Debug, Clone)]
pub struct NewDetection {
    pub owner_id: i64,
    pub session_id: i64,
    pub severity: Severity,
    pub description: String,
    pub threat_type: String,
    pub indicators: Vec<String>,
    pub confidence: f64,
    pub details: DetectionDetail,
}

impl NewDetection {
    pub fn from_verdict(
        owner_id: i64,
        session_id: i64,
        verdict: &Verdict,
        details: DetectionDetail,
    ) -> Self {
        Self {
            owner_id,
            session_id,
            severity: verdict.severity,
            description: verdict.description.clone(),
            threat_type: verdict.kind.clone(),
            indicators: verdict.indicators.clone(),
            confidence: verdict.confidence,
            details,
        }
    }
}

/// Build the text detail for a flagged source
///
/// The span is the first indicator found in the content (ASCII
/// case-insensitive); with no match it covers the whole content. Entities are
/// the indicators that occur in the content.
pub fn text_detail(source_id: i64, content: &str, indicators: &[String]) -> DetectionDetail {
    let haystack = content.to_ascii_lowercase();
    let found = |indicator: &String| -> Option<usize> {
        let needle = indicator.trim().to_ascii_lowercase();
        if needle.is_empty() {
            None
        } else {
            haystack.find(&needle)
        }
    };

    let total_chars = content.chars().count();
    let (start_index, end_index) = indicators
        .iter()
        .find_map(|indicator| {
            found(indicator).map(|byte_start| {
                let start = content[..byte_start].chars().count();
                (start, start + indicator.trim().chars().count())
            })
        })
        .unwrap_or((0, total_chars));

    let context_start = start_index.saturating_sub(CONTEXT_WINDOW);
    let context_end = (end_index + CONTEXT_WINDOW).min(total_chars);
    let context: String = content
        .chars()
        .skip(context_start)
        .take(context_end - context_start)
        .collect();

    let entities = indicators
        .iter()
        .filter(|indicator| found(indicator).is_some())
        .cloned()
        .collect();

    DetectionDetail::Text {
        source_id,
        start_index,
        end_index,
        context,
        entities,
        sentiment_score: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indicators(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_text_detail_locates_first_matching_indicator() {
        let content = "Hello! Please CLICK http://malicious-link.com now";
        let detail = text_detail(
            3,
            content,
            &indicators(&["wire transfer", "click http://malicious-link.com"]),
        );

        let DetectionDetail::Text {
            source_id,
            start_index,
            end_index,
            context,
            entities,
            sentiment_score,
        } = detail
        else {
            panic!("expected text detail");
        };

        assert_eq!(source_id, 3);
        assert_eq!(start_index, 14);
        assert_eq!(end_index, 14 + "click http://malicious-link.com".len());
        assert_eq!(context, content);
        assert_eq!(entities, indicators(&["click http://malicious-link.com"]));
        assert_eq!(sentiment_score, None);
    }

    #[test]
    fn test_text_detail_without_match_covers_whole_content() {
        let detail = text_detail(1, "Übertrag bitte", &indicators(&["urgency"]));
        match detail {
            DetectionDetail::Text {
                start_index,
                end_index,
                entities,
                ..
            } => {
                assert_eq!(start_index, 0);
                assert_eq!(end_index, 14);
                assert!(entities.is_empty());
            }
            other => panic!("unexpected detail {:?}", other),
        }
    }

    #[test]
    fn test_text_detail_offsets_count_characters() {
        let content = "ééé password";
        match text_detail(1, content, &indicators(&["password"])) {
            DetectionDetail::Text {
                start_index,
                end_index,
                ..
            } => {
                assert_eq!(start_index, 4);
                assert_eq!(end_index, 12);
            }
            other => panic!("unexpected detail {:?}", other),
        }
    }

    #[test]
    fn test_context_window_is_bounded() {
        let content = format!("{}secret{}", "a".repeat(300), "b".repeat(300));
        match text_detail(1, &content, &indicators(&["secret"])) {
            DetectionDetail::Text { context, .. } => {
                assert_eq!(context.chars().count(), CONTEXT_WINDOW * 2 + "secret".len());
                assert!(context.contains("secret"));
            }
            other => panic!("unexpected detail {:?}", other),
        }
    }

    #[test]
    fn test_detail_serializes_with_modality_tag() {
        let detail = DetectionDetail::Visual {
            capture_id: 9,
            bounding_box: None,
            detected_objects: Vec::new(),
        };
        let value = serde_json::to_value(&detail).unwrap();
        assert_eq!(value["modality"], "visual");
        assert_eq!(value["capture_id"], 9);
        assert_eq!(detail.modality(), Modality::Visual);
        assert_eq!(detail.capture_id(), 9);
    }
}
