//! Shared model enums
//!
//! Stored in the database as their `as_str()` text form and serialized with
//! the same spelling on the wire.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Threat severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl FromStr for Severity {
    type Err = Error;

    /// Case-insensitive, surrounding whitespace ignored
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Ok(Severity::Low),
            "MEDIUM" => Ok(Severity::Medium),
            "HIGH" => Ok(Severity::High),
            "CRITICAL" => Ok(Severity::Critical),
            other => Err(Error::InvalidInput(format!("Unknown severity: {}", other))),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input channel of a capture or detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Visual,
    Audio,
    Text,
}

impl Modality {
    pub const ALL: [Modality; 3] = [Modality::Visual, Modality::Audio, Modality::Text];

    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Visual => "visual",
            Modality::Audio => "audio",
            Modality::Text => "text",
        }
    }
}

impl FromStr for Modality {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "visual" => Ok(Modality::Visual),
            "audio" => Ok(Modality::Audio),
            "text" => Ok(Modality::Text),
            other => Err(Error::InvalidInput(format!("Unknown modality: {}", other))),
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of analysis session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Visual,
    Audio,
    Text,
    Multimodal,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Visual => "visual",
            SessionKind::Audio => "audio",
            SessionKind::Text => "text",
            SessionKind::Multimodal => "multimodal",
        }
    }
}

impl From<Modality> for SessionKind {
    fn from(modality: Modality) -> Self {
        match modality {
            Modality::Visual => SessionKind::Visual,
            Modality::Audio => SessionKind::Audio,
            Modality::Text => SessionKind::Text,
        }
    }
}

impl FromStr for SessionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "visual" => Ok(SessionKind::Visual),
            "audio" => Ok(SessionKind::Audio),
            "text" => Ok(SessionKind::Text),
            "multimodal" => Ok(SessionKind::Multimodal),
            other => Err(Error::InvalidInput(format!("Unknown session kind: {}", other))),
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of an analysis session
///
/// `active` sessions were opened explicitly and have no job in flight.
/// `processing` sessions have at least one unfinished job. `completed`,
/// `failed` and `interrupted` are terminal until another job attaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Processing,
    Completed,
    Failed,
    Interrupted,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Processing => "processing",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Interrupted => "interrupted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Interrupted
        )
    }
}

impl FromStr for SessionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SessionStatus::Active),
            "processing" => Ok(SessionStatus::Processing),
            "completed" => Ok(SessionStatus::Completed),
            "failed" => Ok(SessionStatus::Failed),
            "interrupted" => Ok(SessionStatus::Interrupted),
            other => Err(Error::InvalidInput(format!("Unknown session status: {}", other))),
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::High < Severity::Critical);
        assert_eq!(Severity::ALL.iter().max(), Some(&Severity::Critical));
    }

    #[test]
    fn test_severity_parse_is_case_insensitive() {
        assert_eq!("high".parse::<Severity>().unwrap(), Severity::High);
        assert_eq!(" Critical ".parse::<Severity>().unwrap(), Severity::Critical);
        assert!("SEVERE".parse::<Severity>().is_err());
    }

    #[test]
    fn test_wire_spelling_matches_storage() {
        assert_eq!(serde_json::to_string(&Severity::Medium).unwrap(), "\"MEDIUM\"");
        assert_eq!(serde_json::to_string(&Modality::Audio).unwrap(), "\"audio\"");
        assert_eq!(
            serde_json::to_string(&SessionKind::Multimodal).unwrap(),
            "\"multimodal\""
        );
        assert_eq!(
            serde_json::to_string(&SessionStatus::Interrupted).unwrap(),
            "\"interrupted\""
        );
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!SessionStatus::Active.is_terminal());
        assert!(!SessionStatus::Processing.is_terminal());
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Failed.is_terminal());
        assert!(SessionStatus::Interrupted.is_terminal());
    }
}
