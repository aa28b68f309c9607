//! vigil - multimodal threat detection service
//!
//! Subcommands:
//! - `serve`: run the HTTP API, WebSocket notifications and job workers
//! - `create-user`: add an account (there is no registration endpoint)
//! - `set-classifier-key`: store the classifier API key in the database
//! - `check-classifier`: classify one text and print the verdict

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use sqlx::SqlitePool;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use vigil_common::api::{hash_password, load_signing_secret};
use vigil_common::config::{resolve_root_folder, RootFolderInitializer, TomlConfig};

use vigil_server::config::resolve_classifier_api_key;
use vigil_server::db::users::{create_user, NewUser};
use vigil_server::services::{GroqClassifier, GroqConfig, MediaStore, ThreatClassifier};
use vigil_server::{build_router, AppState, TokenSettings};

/// Command-line arguments for vigil
#[derive(Parser, Debug)]
#[command(name = "vigil")]
#[command(about = "Multimodal threat detection service")]
#[command(version)]
struct Cli {
    /// Root folder holding vigil.db and media/
    #[arg(long, global = true)]
    root_folder: Option<PathBuf>,

    /// Bootstrap TOML file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the service
    Serve {
        /// Listen address (overrides [server] host)
        #[arg(long, env = "VIGIL_HOST")]
        host: Option<String>,

        /// Listen port (overrides [server] port)
        #[arg(short, long, env = "VIGIL_PORT")]
        port: Option<u16>,
    },

    /// Create a user account
    CreateUser {
        username: String,

        #[arg(long, env = "VIGIL_USER_PASSWORD")]
        password: String,

        #[arg(long, default_value = "")]
        email: String,

        #[arg(long, default_value = "")]
        first_name: String,

        #[arg(long, default_value = "")]
        last_name: String,
    },

    /// Store the classifier API key in the database settings
    SetClassifierKey { key: String },

    /// Classify a text once with the configured classifier
    CheckClassifier {
        #[arg(long)]
        text: String,

        /// Model to use instead of [classifier] model
        #[arg(long)]
        model: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = TomlConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let _log_guard = vigil_server::logging::init_logging(&config.logging);

    info!(
        "Starting vigil v{} (git {}, built {}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE"),
    );

    let initializer =
        RootFolderInitializer::new(resolve_root_folder(cli.root_folder.as_deref(), &config));
    initializer
        .ensure_directories()
        .context("Failed to initialize root folder")?;
    info!("Root folder: {}", initializer.root().display());

    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let db = vigil_common::db::init_database(&db_path)
        .await
        .context("Failed to open database")?;

    match cli.command {
        Command::Serve { host, port } => serve(db, &config, &initializer, host, port).await,
        Command::CreateUser {
            username,
            password,
            email,
            first_name,
            last_name,
        } => {
            if password.is_empty() {
                bail!("Password must not be empty");
            }
            let id = create_user(
                &db,
                &NewUser {
                    username: username.clone(),
                    email,
                    first_name,
                    last_name,
                    password_hash: hash_password(&password).context("Failed to hash password")?,
                },
            )
            .await
            .context("Failed to create user")?;
            info!(user_id = id, username = %username, "User created");
            println!("Created user {} (id {})", username, id);
            Ok(())
        }
        Command::SetClassifierKey { key } => {
            if key.trim().is_empty() {
                bail!("API key must not be empty");
            }
            vigil_server::db::settings::set_classifier_api_key(&db, key)
                .await
                .context("Failed to store classifier API key")?;
            println!("Classifier API key stored");
            Ok(())
        }
        Command::CheckClassifier { text, model } => {
            let classifier = build_classifier(&db, &config).await?;
            let verdict = classifier
                .classify_text(&text, model.as_deref())
                .await
                .context("Classification failed")?;
            println!("{}", serde_json::to_string_pretty(&verdict)?);
            Ok(())
        }
    }
}

async fn serve(
    db: SqlitePool,
    config: &TomlConfig,
    initializer: &RootFolderInitializer,
    host: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    // Jobs of the previous process died with it
    vigil_server::db::sessions::mark_interrupted_sessions(&db)
        .await
        .context("Failed to sweep unfinished sessions")?;

    let secret = load_signing_secret(&db)
        .await
        .context("Failed to load token signing secret")?;
    let classifier = build_classifier(&db, config).await?;

    let shutdown = CancellationToken::new();
    let (state, workers) = AppState::start(
        db,
        classifier,
        MediaStore::new(initializer.media_path()),
        &config.jobs,
        TokenSettings::new(secret, &config.auth),
        shutdown.clone(),
    );

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", host, port))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    shutdown.cancel();
    for worker in workers {
        if let Err(e) = worker.await {
            tracing::warn!(error = %e, "Job worker ended abnormally");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

async fn build_classifier(db: &SqlitePool, config: &TomlConfig) -> Result<Arc<dyn ThreatClassifier>> {
    let api_key = resolve_classifier_api_key(db, config)
        .await
        .context("Failed to resolve classifier API key")?
        .map(|(key, _)| key);

    let classifier = GroqClassifier::new(GroqConfig::from_config(&config.classifier, api_key))
        .context("Failed to initialize classifier client")?;
    Ok(Arc::new(classifier))
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
