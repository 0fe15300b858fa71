//! Refresh-token persistence.
//!
//! Rows are append-only: revocation and replacement update the row in place,
//! nothing is ever deleted. Secrets are stored as SHA-256 hashes; the hash is
//! the lookup key, so a leaked table does not leak usable bearer secrets.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::PgExecutor;

use super::super::AuthError;
use crate::models::auth::RefreshTokenRecord;

/// Issuing context recorded on every token row.
pub const PROVIDER_NAME: &str = "lumo";

/// SHA-256 a refresh secret for storage and lookup.
pub fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Persist a freshly issued refresh token.
pub async fn save<'e>(
    executor: impl PgExecutor<'e>,
    id: &str,
    user_id: &str,
    secret: &str,
    expires_at: DateTime<Utc>,
) -> Result<(), AuthError> {
    sqlx::query(
        "INSERT INTO tokens (id, user_id, provider_name, token_hash, expires_at, created_at) \
         VALUES ($1::uuid, $2::uuid, $3, $4, $5, now())",
    )
    .bind(id)
    .bind(user_id)
    .bind(PROVIDER_NAME)
    .bind(hash_secret(secret))
    .bind(expires_at)
    .execute(executor)
    .await?;
    Ok(())
}

/// Look up a token row by its opaque secret, whatever its state.
pub async fn get_by_secret<'e>(
    executor: impl PgExecutor<'e>,
    secret: &str,
) -> Result<Option<RefreshTokenRecord>, AuthError> {
    let record = sqlx::query_as::<_, RefreshTokenRecord>(
        "SELECT id::text, user_id::text, provider_name, token_hash, expires_at, created_at, \
                replaced_by_token_hash, revoked_by_ip, revoked_at \
         FROM tokens \
         WHERE token_hash = $1",
    )
    .bind(hash_secret(secret))
    .fetch_optional(executor)
    .await?;
    Ok(record)
}

/// Revoke a token by id. Returns the number of rows affected — zero means it
/// was already revoked, which callers treat as an idempotent no-op.
pub async fn revoke<'e>(
    executor: impl PgExecutor<'e>,
    token_id: &str,
    revoked_by_ip: Option<&str>,
) -> Result<u64, AuthError> {
    let result = sqlx::query(
        "UPDATE tokens \
         SET revoked_at = now(), revoked_by_ip = $2 \
         WHERE id = $1::uuid AND revoked_at IS NULL",
    )
    .bind(token_id)
    .bind(revoked_by_ip)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

/// Atomically revoke a token and link it to its successor.
///
/// One guarded statement: `revoked_at` and `replaced_by_token_hash` are set
/// together or not at all, and the `revoked_at IS NULL` guard makes
/// concurrent rotations of the same token race safely — exactly one wins.
/// Returns the number of rows affected; zero means the token was already
/// consumed and the caller must treat the rotation as failed.
pub async fn revoke_and_replace<'e>(
    executor: impl PgExecutor<'e>,
    old_secret: &str,
    new_secret: &str,
    revoked_by_ip: Option<&str>,
) -> Result<u64, AuthError> {
    let result = sqlx::query(
        "UPDATE tokens \
         SET revoked_at = now(), replaced_by_token_hash = $2, revoked_by_ip = $3 \
         WHERE token_hash = $1 AND revoked_at IS NULL",
    )
    .bind(hash_secret(old_secret))
    .bind(hash_secret(new_secret))
    .bind(revoked_by_ip)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}
