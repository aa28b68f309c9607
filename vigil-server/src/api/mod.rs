//! HTTP API handlers for vigil
//!
//! Every module exposes a `*_routes()` builder; [`crate::build_router`]
//! decides which of them sit behind [`auth::require_auth`].

pub mod analyze;
pub mod auth;
pub mod dashboard;
pub mod detections;
pub mod health;
pub mod results;
pub mod sessions;
pub mod tasks;
pub mod ws;

pub use analyze::analyze_routes;
pub use auth::{require_auth, token_routes, user_routes, AuthUser};
pub use dashboard::dashboard_routes;
pub use detections::detection_routes;
pub use health::health_routes;
pub use results::results_routes;
pub use sessions::session_routes;
pub use tasks::task_routes;
pub use ws::ws_routes;
