//! Shared authentication primitives
//!
//! JWT issuance/verification, Argon2 password hashing and settings-table
//! persistence for the signing secret.
//! No HTTP framework dependencies; `vigil-server` wraps these in axum
//! middleware.

pub mod auth;
pub mod password;

pub use auth::{issue_token, load_signing_secret, verify_token, ApiAuthError, TokenClaims, TokenKind};
pub use password::{hash_password, verify_password};
