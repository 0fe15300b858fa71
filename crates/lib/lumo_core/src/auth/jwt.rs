//! Token issuance and verification.
//!
//! Access tokens are signed JWTs (HS256) with a short TTL. Refresh tokens are
//! deliberately opaque random secrets: a signed refresh token could not be
//! revoked without a blocklist, which would reintroduce the state the token
//! store already holds.

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::Rng;
use rand::distr::Alphanumeric;
use tracing::info;

use super::AuthError;
use super::codes;
use crate::models::auth::{AccessClaims, TokenPair};

/// Access token lifetime: 15 minutes.
pub const DEFAULT_ACCESS_TTL_MINUTES: i64 = 15;

/// Refresh token lifetime: 7 days.
pub const DEFAULT_REFRESH_TTL_DAYS: i64 = 7;

const ACCESS_TOKEN_TYPE: &str = "access";

/// Mints token pairs and verifies access tokens.
///
/// Holds the process-wide signing secret and the TTL policy; built once at
/// startup and immutable afterwards. Rotating the secret invalidates all
/// outstanding access tokens; refresh tokens are unaffected.
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &[u8], access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn with_defaults(secret: &[u8]) -> Self {
        Self::new(
            secret,
            Duration::minutes(DEFAULT_ACCESS_TTL_MINUTES),
            Duration::days(DEFAULT_REFRESH_TTL_DAYS),
        )
    }

    /// Mint a token pair for a user: signed access token plus opaque
    /// refresh secret. The refresh secret is not persisted here — callers
    /// store it via the token store.
    pub fn issue(&self, user_id: &str) -> Result<TokenPair, AuthError> {
        let claims = AccessClaims {
            sub: user_id.to_string(),
            exp: (Utc::now() + self.access_ttl).timestamp(),
            token_type: ACCESS_TOKEN_TYPE.to_string(),
        };
        let access_token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("jwt encode: {e}")))?;

        Ok(TokenPair {
            access_token,
            refresh_token: codes::generate(codes::REFRESH_SECRET_BYTES),
        })
    }

    /// Verify an access token, returning its claims on success.
    ///
    /// Fails closed: any signature, expiry, parse or token-type mismatch
    /// yields `None` — a claim is never read from an unverified token.
    pub fn verify_access(&self, token: &str) -> Option<AccessClaims> {
        let mut validation = Validation::default();
        validation.validate_exp = true;
        let claims = decode::<AccessClaims>(token, &self.decoding_key, &validation)
            .ok()?
            .claims;
        if claims.token_type != ACCESS_TOKEN_TYPE {
            return None;
        }
        Some(claims)
    }

    pub fn access_ttl_secs(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    pub fn refresh_ttl_secs(&self) -> i64 {
        self.refresh_ttl.num_seconds()
    }

    /// Expiry timestamp for a refresh token persisted right now.
    pub fn refresh_expiry(&self) -> DateTime<Utc> {
        Utc::now() + self.refresh_ttl
    }
}

/// Resolve the signing secret: env var `JWT_SECRET` → `AUTH_SECRET` →
/// persisted file (generated on first run).
pub fn resolve_jwt_secret() -> String {
    if let Ok(secret) = std::env::var("JWT_SECRET")
        && !secret.is_empty()
    {
        return secret;
    }
    if let Ok(secret) = std::env::var("AUTH_SECRET")
        && !secret.is_empty()
    {
        return secret;
    }
    let secret_path = jwt_secret_path();
    if let Ok(existing) = std::fs::read_to_string(&secret_path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let secret: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();
    if let Some(parent) = secret_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let _ = std::fs::write(&secret_path, &secret);
    info!(path = %secret_path.display(), "generated new JWT secret");
    secret
}

/// Path to the persisted JWT secret file.
fn jwt_secret_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lumo")
        .join("jwt-secret")
}
