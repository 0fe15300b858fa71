//! Authentication and session lifecycle logic.
//!
//! Registration with email-confirmation codes, password verification, token
//! issuance, refresh-token rotation with reuse detection, revocation and
//! logout. [`service::SessionService`] orchestrates; everything else is a
//! building block it composes.

pub mod codes;
pub mod jwt;
pub mod password;
pub mod service;
pub mod store;
pub mod uow;
pub mod validation;

use thiserror::Error;

use crate::auth::validation::ValidationErrors;

/// Authentication errors.
///
/// Domain-rule variants are user-facing; `Db` and `Internal` carry detail
/// that must be logged and withheld from the caller at the API boundary.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(ValidationErrors),

    #[error("invalid login or password")]
    InvalidCredentials,

    #[error("user already registered")]
    AlreadyRegistered,

    #[error("a confirmation code was requested recently, try again later")]
    CodeRequestTimeout,

    #[error("invalid link or user not found")]
    UserNotFound,

    #[error("invalid confirmation code")]
    InvalidCode,

    #[error("confirmation link expired, request a new code")]
    LinkExpired,

    #[error("refresh token not found")]
    TokenNotFound,

    #[error("refresh token already used or revoked")]
    TokenRevoked,

    #[error("refresh token expired")]
    TokenExpired,

    #[error("refresh token does not belong to the caller")]
    Forbidden,

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}
