//! Authentication domain models.
//!
//! Storage entities plus the ephemeral token types. The API layer has its own
//! request/response DTOs; nothing here ever exposes a password hash or a raw
//! confirmation code to a caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User row. `password_hash` and `confirmation_code` stay inside the service.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub nickname: String,
    pub email: String,
    pub password_hash: String,
    /// Pending confirmation code; `None` once confirmed (or never issued).
    pub confirmation_code: Option<String>,
    /// When the current code was issued; `None` means never requested.
    pub code_requested_at: Option<DateTime<Utc>>,
    pub is_confirmed: bool,
    pub created_at: DateTime<Utc>,
}

/// Refresh-token row. Rows are never deleted: revocation and replacement
/// chaining keep the full audit trail for reuse detection.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RefreshTokenRecord {
    pub id: String,
    pub user_id: String,
    pub provider_name: String,
    /// SHA-256 of the opaque secret. The secret itself is never stored.
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    /// Hash of the successor token, set together with `revoked_at` on rotation.
    pub replaced_by_token_hash: Option<String>,
    pub revoked_by_ip: Option<String>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl RefreshTokenRecord {
    /// A token is active while it is neither revoked nor expired.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }
}

/// Freshly minted access/refresh pair. Never persisted as a whole: the access
/// token is verified by signature only, the refresh secret is stored hashed.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Claims carried by a signed access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject — user ID.
    pub sub: String,
    /// Expiry (unix timestamp).
    pub exp: i64,
    /// Token kind marker; only `"access"` passes verification.
    #[serde(rename = "type")]
    pub token_type: String,
}

/// Outward-facing user projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: String,
    pub nickname: String,
    pub email: String,
    pub is_confirmed: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            nickname: user.nickname.clone(),
            email: user.email.clone(),
            is_confirmed: user.is_confirmed,
            created_at: user.created_at,
        }
    }
}
