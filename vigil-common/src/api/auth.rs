//! Signed bearer tokens
//!
//! Access and refresh tokens are HS256 JWTs carrying `sub` (user id), `kind`,
//! `exp` and `jti`. The signing secret is generated on first start and stored
//! in the settings table under `token_signing_secret`.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "sqlx")]
use sqlx::SqlitePool;

/// Settings key holding the signing secret
pub const SIGNING_SECRET_KEY: &str = "token_signing_secret";

// ========================================
// Error Types
// ========================================

/// Authentication error types
#[derive(Debug, Clone, PartialEq)]
pub enum ApiAuthError {
    /// Token does not decode as a JWT with the expected claims
    MalformedToken(String),

    /// Signature does not match the payload
    InvalidSignature,

    /// Token expiry is in the past
    Expired,

    /// Refresh token presented where an access token is required, or vice versa
    WrongKind { expected: TokenKind, found: TokenKind },

    /// Claims could not be encoded or signed
    Signing(String),

    /// Database error loading or storing the signing secret
    DatabaseError(String),
}

impl std::fmt::Display for ApiAuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiAuthError::MalformedToken(reason) => write!(f, "Malformed token: {}", reason),
            ApiAuthError::InvalidSignature => write!(f, "Invalid token signature"),
            ApiAuthError::Expired => write!(f, "Token has expired"),
            ApiAuthError::WrongKind { expected, found } => write!(
                f,
                "Wrong token kind: expected {}, found {}",
                expected.as_str(),
                found.as_str()
            ),
            ApiAuthError::Signing(err) => write!(f, "Token signing failed: {}", err),
            ApiAuthError::DatabaseError(err) => write!(f, "Database error: {}", err),
        }
    }
}

impl std::error::Error for ApiAuthError {}

// ========================================
// Claims
// ========================================

/// Token purpose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

/// Signed token claims
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// User id
    pub sub: i64,
    pub kind: TokenKind,
    /// Expiry, Unix seconds
    pub exp: i64,
    /// Unique token id
    pub jti: String,
}

impl TokenClaims {
    pub fn new(user_id: i64, kind: TokenKind, lifetime: Duration) -> Self {
        Self {
            sub: user_id,
            kind,
            exp: (Utc::now() + lifetime).timestamp(),
            jti: Uuid::new_v4().to_string(),
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }
}

// ========================================
// Signing Secret Management
// ========================================

/// Load the signing secret, generating and storing one on first use
#[cfg(feature = "sqlx")]
pub async fn load_signing_secret(db: &SqlitePool) -> Result<String, ApiAuthError> {
    let result: Option<(Option<String>,)> =
        sqlx::query_as("SELECT value FROM settings WHERE key = ?")
            .bind(SIGNING_SECRET_KEY)
            .fetch_optional(db)
            .await
            .map_err(|e| ApiAuthError::DatabaseError(e.to_string()))?;

    match result {
        Some((Some(value),)) if !value.is_empty() => Ok(value),
        _ => initialize_signing_secret(db).await,
    }
}

/// Generate a random 256-bit secret and store it
#[cfg(feature = "sqlx")]
async fn initialize_signing_secret(db: &SqlitePool) -> Result<String, ApiAuthError> {
    use rand::RngCore;

    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let secret: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();

    sqlx::query("INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)")
        .bind(SIGNING_SECRET_KEY)
        .bind(&secret)
        .execute(db)
        .await
        .map_err(|e| ApiAuthError::DatabaseError(e.to_string()))?;

    tracing::info!("Generated new token signing secret");

    Ok(secret)
}

// ========================================
// Signing and Verification
// ========================================

/// Encode and sign claims as an HS256 JWT
pub fn issue_token(claims: &TokenClaims, secret: &str) -> Result<String, ApiAuthError> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiAuthError::Signing(e.to_string()))
}

/// Check signature, expiry and kind; return the claims
pub fn verify_token(
    token: &str,
    secret: &str,
    expected: TokenKind,
) -> Result<TokenClaims, ApiAuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;

    let claims = decode::<TokenClaims>(
        token.trim(),
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        ErrorKind::InvalidSignature => ApiAuthError::InvalidSignature,
        ErrorKind::ExpiredSignature => ApiAuthError::Expired,
        _ => ApiAuthError::MalformedToken(e.to_string()),
    })?
    .claims;

    if claims.kind != expected {
        return Err(ApiAuthError::WrongKind {
            expected,
            found: claims.kind,
        });
    }

    Ok(claims)
}

// ========================================
// Tests
// ========================================

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    const SECRET: &str = "test-secret";

    fn token(user_id: i64, kind: TokenKind, lifetime: Duration) -> (TokenClaims, String) {
        let claims = TokenClaims::new(user_id, kind, lifetime);
        let token = issue_token(&claims, SECRET).unwrap();
        (claims, token)
    }

    #[test]
    fn test_issued_token_verifies() {
        let (claims, token) = token(42, TokenKind::Access, Duration::minutes(60));

        let verified = verify_token(&token, SECRET, TokenKind::Access).unwrap();
        assert_eq!(verified, claims);
        assert!(verified.expires_at().unwrap() > Utc::now());
    }

    #[test]
    fn test_token_is_hs256_jwt() {
        let (_, token) = token(1, TokenKind::Refresh, Duration::hours(24));
        assert_eq!(token.split('.').count(), 3);

        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.alg, Algorithm::HS256);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let (_, token) = token(1, TokenKind::Access, Duration::minutes(5));
        assert_eq!(
            verify_token(&token, "other-secret", TokenKind::Access),
            Err(ApiAuthError::InvalidSignature)
        );
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let (claims, token) = token(1, TokenKind::Access, Duration::minutes(5));
        let parts: Vec<&str> = token.split('.').collect();

        let forged = TokenClaims { sub: 2, ..claims };
        let forged_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged).unwrap());
        let forged_token = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);

        assert_eq!(
            verify_token(&forged_token, SECRET, TokenKind::Access),
            Err(ApiAuthError::InvalidSignature)
        );
    }

    #[test]
    fn test_expired_token_rejected() {
        let (_, token) = token(1, TokenKind::Access, Duration::seconds(-10));
        assert_eq!(
            verify_token(&token, SECRET, TokenKind::Access),
            Err(ApiAuthError::Expired)
        );
    }

    #[test]
    fn test_refresh_token_not_accepted_as_access() {
        let (_, token) = token(1, TokenKind::Refresh, Duration::hours(1));
        assert_eq!(
            verify_token(&token, SECRET, TokenKind::Access),
            Err(ApiAuthError::WrongKind {
                expected: TokenKind::Access,
                found: TokenKind::Refresh,
            })
        );
    }

    #[test]
    fn test_garbage_token_is_malformed() {
        assert!(matches!(
            verify_token("not-a-token", SECRET, TokenKind::Access),
            Err(ApiAuthError::MalformedToken(_))
        ));
        assert!(matches!(
            verify_token("!!!.abc.def", SECRET, TokenKind::Access),
            Err(ApiAuthError::MalformedToken(_))
        ));
    }

    #[tokio::test]
    async fn test_signing_secret_persists() {
        let pool = crate::db::init_memory_database().await.unwrap();

        let first = load_signing_secret(&pool).await.unwrap();
        let second = load_signing_secret(&pool).await.unwrap();

        assert_eq!(first.len(), 64);
        assert_eq!(first, second);
    }
}
