//! Runtime configuration resolution for vigil-server
//!
//! The bootstrap TOML lives in `vigil_common::config`; this module resolves
//! values that have more than one source at startup.

use sqlx::SqlitePool;
use tracing::{info, warn};
use vigil_common::config::TomlConfig;
use vigil_common::Result;

use crate::db;

/// Environment variable holding the classifier API key
pub const CLASSIFIER_API_KEY_ENV: &str = "VIGIL_CLASSIFIER_API_KEY";

/// Where the classifier API key came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Database,
    Environment,
    TomlFile,
}

/// Resolve the classifier API key
///
/// Priority: database setting > `VIGIL_CLASSIFIER_API_KEY` > TOML
/// `[classifier] api_key`. Warns when more than one source is set. `None`
/// leaves the classifier unconfigured; every classification then fails.
pub async fn resolve_classifier_api_key(
    db: &SqlitePool,
    config: &TomlConfig,
) -> Result<Option<(String, KeySource)>> {
    let from_db = db::settings::get_classifier_api_key(db)
        .await?
        .filter(|k| !k.trim().is_empty());
    let from_env = std::env::var(CLASSIFIER_API_KEY_ENV)
        .ok()
        .filter(|k| !k.trim().is_empty());
    let from_toml = config
        .classifier
        .api_key
        .clone()
        .filter(|k| !k.trim().is_empty());

    let sources = [
        from_db.as_ref().map(|_| "database"),
        from_env.as_ref().map(|_| "environment"),
        from_toml.as_ref().map(|_| "TOML"),
    ];
    let present: Vec<&str> = sources.iter().flatten().copied().collect();
    if present.len() > 1 {
        warn!(
            "Classifier API key found in multiple sources ({}); using {}",
            present.join(", "),
            present[0]
        );
    }

    let resolved = from_db
        .map(|k| (k, KeySource::Database))
        .or_else(|| from_env.map(|k| (k, KeySource::Environment)))
        .or_else(|| from_toml.map(|k| (k, KeySource::TomlFile)));

    match &resolved {
        Some((_, source)) => info!(source = ?source, "Classifier API key configured"),
        None => warn!(
            "No classifier API key configured; set {} or [classifier] api_key",
            CLASSIFIER_API_KEY_ENV
        ),
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn toml_with_key(key: Option<&str>) -> TomlConfig {
        let mut config = TomlConfig::default();
        config.classifier.api_key = key.map(str::to_string);
        config
    }

    #[tokio::test]
    #[serial]
    async fn test_database_key_wins() {
        let pool = vigil_common::db::init_memory_database().await.unwrap();
        db::settings::set_classifier_api_key(&pool, "db-key".to_string())
            .await
            .unwrap();
        std::env::set_var(CLASSIFIER_API_KEY_ENV, "env-key");

        let resolved = resolve_classifier_api_key(&pool, &toml_with_key(Some("toml-key")))
            .await
            .unwrap();

        std::env::remove_var(CLASSIFIER_API_KEY_ENV);
        assert_eq!(resolved, Some(("db-key".to_string(), KeySource::Database)));
    }

    #[tokio::test]
    #[serial]
    async fn test_environment_beats_toml() {
        let pool = vigil_common::db::init_memory_database().await.unwrap();
        std::env::set_var(CLASSIFIER_API_KEY_ENV, "env-key");

        let resolved = resolve_classifier_api_key(&pool, &toml_with_key(Some("toml-key")))
            .await
            .unwrap();

        std::env::remove_var(CLASSIFIER_API_KEY_ENV);
        assert_eq!(resolved, Some(("env-key".to_string(), KeySource::Environment)));
    }

    #[tokio::test]
    #[serial]
    async fn test_toml_fallback_and_none() {
        let pool = vigil_common::db::init_memory_database().await.unwrap();
        std::env::remove_var(CLASSIFIER_API_KEY_ENV);

        let resolved = resolve_classifier_api_key(&pool, &toml_with_key(Some("toml-key")))
            .await
            .unwrap();
        assert_eq!(resolved, Some(("toml-key".to_string(), KeySource::TomlFile)));

        let resolved = resolve_classifier_api_key(&pool, &toml_with_key(Some("  ")))
            .await
            .unwrap();
        assert_eq!(resolved, None);
    }
}
