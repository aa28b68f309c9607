//! Notification payloads and WebSocket wire messages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{SessionKind, SessionStatus};

/// Event published to an owner's topic
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// A detection was persisted; carries its public JSON form
    Detection(Value),

    /// A session changed status
    SessionStatus(SessionStatusUpdate),
}

impl Notification {
    /// Wire name of the event
    pub fn event_type(&self) -> &'static str {
        match self {
            Notification::Detection(_) => "threat_notification",
            Notification::SessionStatus(_) => "analysis_update",
        }
    }
}

/// Payload of an `analysis_update` message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatusUpdate {
    pub session_id: i64,
    #[serde(rename = "session_type")]
    pub kind: SessionKind,
    pub status: SessionStatus,
    pub end_time: Option<DateTime<Utc>>,
    pub jobs_total: i64,
    pub jobs_finished: i64,
    pub jobs_failed: i64,
    pub timestamp: DateTime<Utc>,
}

/// Server to client WebSocket message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ThreatNotification { data: Value },
    AnalysisUpdate { data: SessionStatusUpdate },
    Pong { timestamp: Value },
}

impl From<Notification> for ServerMessage {
    fn from(notification: Notification) -> Self {
        match notification {
            Notification::Detection(data) => ServerMessage::ThreatNotification { data },
            Notification::SessionStatus(data) => ServerMessage::AnalysisUpdate { data },
        }
    }
}

/// Client to server WebSocket message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping {
        #[serde(default = "empty_nonce")]
        timestamp: Value,
    },
}

fn empty_nonce() -> Value {
    Value::String(String::new())
}

impl ClientMessage {
    /// Parse a text frame; `None` for unknown or malformed messages
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }

    /// Reply owed to the client, if any
    pub fn reply(self) -> Option<ServerMessage> {
        match self {
            ClientMessage::Ping { timestamp } => Some(ServerMessage::Pong { timestamp }),
        }
    }
}
