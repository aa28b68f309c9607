//! Settings database operations
//!
//! Key-value accessors over the `settings` table.

use sqlx::{Pool, Sqlite};
use vigil_common::{Error, Result};

/// Settings key of the classifier API key
pub const CLASSIFIER_API_KEY: &str = "classifier_api_key";

/// Get classifier API key from database
///
/// **Returns:** Some(key) if exists, None if not set
pub async fn get_classifier_api_key(db: &Pool<Sqlite>) -> Result<Option<String>> {
    get_setting::<String>(db, CLASSIFIER_API_KEY).await
}

/// Set classifier API key in database
pub async fn set_classifier_api_key(db: &Pool<Sqlite>, key: String) -> Result<()> {
    set_setting(db, CLASSIFIER_API_KEY, key).await
}

/// Generic setting getter
///
/// NULL values read as unset.
pub async fn get_setting<T>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let row: Option<(Option<String>,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await
        .map_err(Error::Database)?;

    match row {
        Some((Some(value),)) => {
            let parsed = value
                .parse::<T>()
                .map_err(|e| Error::Config(format!("Parse setting {} failed: {}", key, e)))?;
            Ok(Some(parsed))
        }
        _ => Ok(None),
    }
}

/// Generic setting setter (upsert)
pub async fn set_setting<T>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()>
where
    T: std::fmt::Display,
{
    sqlx::query(
        r#"
        INSERT INTO settings (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await
    .map_err(Error::Database)?;

    Ok(())
}
