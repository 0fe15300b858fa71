//! User persistence.

use chrono::{DateTime, Utc};
use sqlx::PgExecutor;

use super::super::AuthError;
use crate::models::auth::User;

pub async fn create<'e>(executor: impl PgExecutor<'e>, user: &User) -> Result<(), AuthError> {
    sqlx::query(
        "INSERT INTO users \
         (id, nickname, email, password_hash, confirmation_code, code_requested_at, is_confirmed, created_at) \
         VALUES ($1::uuid, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(&user.id)
    .bind(&user.nickname)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(&user.confirmation_code)
    .bind(user.code_requested_at)
    .bind(user.is_confirmed)
    .bind(user.created_at)
    .execute(executor)
    .await?;
    Ok(())
}

/// Fetch a user by email, case-insensitively.
pub async fn get_by_email<'e>(
    executor: impl PgExecutor<'e>,
    email: &str,
) -> Result<Option<User>, AuthError> {
    let user = sqlx::query_as::<_, User>(
        "SELECT id::text, nickname, email, password_hash, confirmation_code, \
                code_requested_at, is_confirmed, created_at \
         FROM users \
         WHERE LOWER(email) = LOWER($1)",
    )
    .bind(email)
    .fetch_optional(executor)
    .await?;
    Ok(user)
}

pub async fn get_by_id<'e>(
    executor: impl PgExecutor<'e>,
    user_id: &str,
) -> Result<Option<User>, AuthError> {
    let user = sqlx::query_as::<_, User>(
        "SELECT id::text, nickname, email, password_hash, confirmation_code, \
                code_requested_at, is_confirmed, created_at \
         FROM users \
         WHERE id = $1::uuid",
    )
    .bind(user_id)
    .fetch_optional(executor)
    .await?;
    Ok(user)
}

/// Rewrite the confirmation state in one statement: the pending code, its
/// request time, and the confirmed flag always move together.
pub async fn update_confirmation<'e>(
    executor: impl PgExecutor<'e>,
    user_id: &str,
    code: Option<&str>,
    code_requested_at: Option<DateTime<Utc>>,
    is_confirmed: bool,
) -> Result<(), AuthError> {
    sqlx::query(
        "UPDATE users \
         SET confirmation_code = $1, code_requested_at = $2, is_confirmed = $3 \
         WHERE id = $4::uuid",
    )
    .bind(code)
    .bind(code_requested_at)
    .bind(is_confirmed)
    .bind(user_id)
    .execute(executor)
    .await?;
    Ok(())
}
