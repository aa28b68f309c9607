//! # Vigil Common Library
//!
//! Shared code for the Vigil threat detection service:
//! - Error type
//! - Configuration loading (bootstrap TOML, root folder resolution)
//! - Database bootstrap and schema
//! - Bearer token and password primitives
//! - Shared model enums (severity, modality, session kind/status)
//! - Notification types and the per-owner notification hub

pub mod api;
pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod events;
pub mod models;

pub use error::{Error, Result};
pub use events::{Notification, NotificationHub};
pub use models::{Modality, SessionKind, SessionStatus, Severity};
