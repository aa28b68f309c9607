//! Database access for vigil-server
//!
//! Timestamps are bound as RFC 3339 strings and JSON bags as serialized text.

pub mod captures;
pub mod detections;
pub mod sessions;
pub mod settings;
pub mod users;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use vigil_common::{Error, Result};

pub(crate) fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Invalid {} timestamp '{}': {}", column, value, e)))
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>> {
    value.map(|v| parse_timestamp(column, &v)).transpose()
}

pub(crate) fn parse_json<T: DeserializeOwned>(column: &str, value: &str) -> Result<T> {
    serde_json::from_str(value)
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

pub(crate) fn to_json<T: Serialize>(column: &str, value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| Error::Internal(format!("Failed to serialize {}: {}", column, e)))
}

pub(crate) fn parse_enum<T>(column: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr<Err = Error>,
{
    value
        .parse::<T>()
        .map_err(|e| Error::Internal(format!("Invalid {} column: {}", column, e)))
}
