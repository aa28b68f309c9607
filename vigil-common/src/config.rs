//! Configuration loading and root folder resolution
//!
//! Two layers:
//! 1. **TOML Bootstrap**: server address, logging, classifier endpoint, job
//!    pool sizing, token lifetimes. Read once at startup.
//! 2. **Database settings**: token signing secret and an optional classifier
//!    API key (see `vigil-server` `db::settings`).
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments
//! 2. Environment variables (`VIGIL_ROOT_FOLDER`, `VIGIL_CONFIG`)
//! 3. TOML configuration file
//! 4. Compiled defaults

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "VIGIL_ROOT_FOLDER";

/// Environment variable naming the bootstrap TOML file
pub const CONFIG_FILE_ENV: &str = "VIGIL_CONFIG";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "vigil.db";

/// Media directory name inside the root folder
pub const MEDIA_DIR_NAME: &str = "media";

/// Bootstrap configuration loaded from TOML file
///
/// Every section is optional; a missing file yields all defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding `vigil.db` and `media/`
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(default)]
    pub jobs: JobsConfig,

    #[serde(default)]
    pub auth: AuthConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr only if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// External classifier endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    /// Base URL of an OpenAI-compatible chat-completions API
    #[serde(default = "default_classifier_base_url")]
    pub base_url: String,

    #[serde(default = "default_classifier_model")]
    pub model: String,

    #[serde(default = "default_classifier_timeout_secs")]
    pub timeout_secs: u64,

    /// Lowest-priority API key source (database and environment win)
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            base_url: default_classifier_base_url(),
            model: default_classifier_model(),
            timeout_secs: default_classifier_timeout_secs(),
            api_key: None,
        }
    }
}

/// Background job pool configuration
#[derive(Debug, Clone, Deserialize)]
pub struct JobsConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Number of finished task records kept for polling
    #[serde(default = "default_task_retention")]
    pub task_retention: usize,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            task_retention: default_task_retention(),
        }
    }
}

/// Bearer token lifetimes
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_access_token_minutes")]
    pub access_token_minutes: i64,

    #[serde(default = "default_refresh_token_hours")]
    pub refresh_token_hours: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_token_minutes: default_access_token_minutes(),
            refresh_token_hours: default_refresh_token_hours(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5780
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_classifier_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

fn default_classifier_model() -> String {
    "llama3-70b-8192".to_string()
}

fn default_classifier_timeout_secs() -> u64 {
    30
}

fn default_workers() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    256
}

fn default_task_retention() -> usize {
    10_000
}

fn default_access_token_minutes() -> i64 {
    60
}

fn default_refresh_token_hours() -> i64 {
    24
}

impl TomlConfig {
    /// Load bootstrap configuration
    ///
    /// An explicitly named file (CLI or `VIGIL_CONFIG`) must exist and parse.
    /// The platform default location is optional: when absent, compiled
    /// defaults are used and a warning is logged.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let explicit = explicit_path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_FILE_ENV).ok().map(PathBuf::from));

        if let Some(path) = explicit {
            return Self::from_file(&path);
        }

        match default_config_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            Some(path) => {
                warn!(
                    "Config file not found at {}, using compiled defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            None => {
                warn!("Could not determine config directory, using compiled defaults");
                Ok(Self::default())
            }
        }
    }

    /// Parse a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))
    }
}

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable `VIGIL_ROOT_FOLDER`
/// 3. TOML config `root_folder`
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &config.root_folder {
        return path.clone();
    }

    get_default_root_folder()
}

/// Creates the root folder layout and names the paths inside it
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Create the root folder and its media directory if missing
    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.media_path())?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn database_path(&self) -> PathBuf {
        self.root.join(DATABASE_FILE_NAME)
    }

    pub fn media_path(&self) -> PathBuf {
        self.root.join(MEDIA_DIR_NAME)
    }
}

/// Platform default location of the bootstrap TOML file
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("vigil").join("vigil.toml"))
}

/// Get OS-dependent default root folder path
fn get_default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("vigil"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/vigil"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("vigil"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/vigil"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("vigil"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\vigil"))
    } else {
        PathBuf::from("./vigil_data")
    }
}
