//! Session service — the registration/confirmation/login/refresh/logout
//! state machine. Owns every business invariant; the HTTP layer above is a
//! thin codec and the stores below are dumb persistence.

use std::sync::Arc;

use chrono::{Duration, Utc};
use sqlx::{PgExecutor, PgPool};
use tracing::{error, warn};

use super::AuthError;
use super::codes;
use super::jwt::TokenIssuer;
use super::password;
use super::store::{tokens, users};
use super::uow;
use super::validation::{self, ValidationErrors};
use crate::events::{EventPublisher, USER_REGISTERED_TOPIC, UserRegisteredEvent};
use crate::models::auth::{PublicUser, TokenPair, User};
use crate::uuid::uuidv7;

/// Minimum wait between confirmation-code requests for one user.
const CODE_REQUEST_COOLDOWN_MINUTES: i64 = 2;

/// How long an issued confirmation code stays usable.
const CONFIRM_WINDOW_MINUTES: i64 = 10;

/// Orchestrates the credential lifecycle. Cloneable and safe to call
/// concurrently: it holds no mutable state — cross-request coordination is
/// the database's conditional updates, nothing in-process.
#[derive(Clone)]
pub struct SessionService {
    pool: PgPool,
    issuer: Arc<TokenIssuer>,
    publisher: Arc<dyn EventPublisher>,
}

impl SessionService {
    pub fn new(pool: PgPool, issuer: Arc<TokenIssuer>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            pool,
            issuer,
            publisher,
        }
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    /// Register a new account, or re-issue a confirmation code for an
    /// unconfirmed one (rate-limited by the cooldown window).
    pub async fn register(
        &self,
        nickname: &str,
        email: &str,
        password: &str,
        return_url: &str,
    ) -> Result<PublicUser, AuthError> {
        validation::validate_register(nickname, email, password, return_url)?;

        match users::get_by_email(&self.pool, email).await? {
            Some(existing) => self.reissue_code(existing, return_url).await,
            None => self.create_user(nickname, email, password, return_url).await,
        }
    }

    async fn create_user(
        &self,
        nickname: &str,
        email: &str,
        password: &str,
        return_url: &str,
    ) -> Result<PublicUser, AuthError> {
        let now = Utc::now();
        let user = User {
            id: uuidv7().to_string(),
            nickname: nickname.to_string(),
            email: email.to_string(),
            password_hash: password::hash_password(password)?,
            confirmation_code: Some(codes::generate(codes::CONFIRMATION_CODE_BYTES)),
            code_requested_at: Some(now),
            is_confirmed: false,
            created_at: now,
        };

        if let Err(err) = users::create(&self.pool, &user).await {
            // lost a registration race: the unique index on LOWER(email)
            // guarantees one row per email
            if is_unique_violation(&err) {
                return Err(AuthError::AlreadyRegistered);
            }
            return Err(err);
        }

        self.spawn_registration_event(&user, return_url);
        Ok(PublicUser::from(&user))
    }

    async fn reissue_code(
        &self,
        mut user: User,
        return_url: &str,
    ) -> Result<PublicUser, AuthError> {
        if user.is_confirmed {
            return Err(AuthError::AlreadyRegistered);
        }

        if let Some(requested_at) = user.code_requested_at
            && requested_at + Duration::minutes(CODE_REQUEST_COOLDOWN_MINUTES) > Utc::now()
        {
            return Err(AuthError::CodeRequestTimeout);
        }

        let code = codes::generate(codes::CONFIRMATION_CODE_BYTES);
        let now = Utc::now();
        users::update_confirmation(&self.pool, &user.id, Some(&code), Some(now), false).await?;
        user.confirmation_code = Some(code);
        user.code_requested_at = Some(now);

        self.spawn_registration_event(&user, return_url);
        Ok(PublicUser::from(&user))
    }

    /// Confirm an account with the emailed code, then open its first session.
    /// The confirmation write and the token persistence commit together.
    pub async fn confirm(&self, user_id: &str, code: &str) -> Result<TokenPair, AuthError> {
        // a malformed id from a mangled link is "not found", not a query error
        if uuid::Uuid::parse_str(user_id).is_err() {
            return Err(AuthError::UserNotFound);
        }

        let user = users::get_by_id(&self.pool, user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if user.is_confirmed {
            return Err(AuthError::AlreadyRegistered);
        }

        if user.confirmation_code.as_deref() != Some(code) {
            return Err(AuthError::InvalidCode);
        }

        // a code without a request timestamp is stale data from before the
        // current scheme; force a re-request
        let requested_at = user.code_requested_at.ok_or(AuthError::LinkExpired)?;
        if requested_at + Duration::minutes(CONFIRM_WINDOW_MINUTES) < Utc::now() {
            return Err(AuthError::LinkExpired);
        }

        uow::in_transaction(&self.pool, |mut tx| async move {
            users::update_confirmation(&mut *tx, &user.id, None, None, true).await?;
            let pair = self.issue_tokens(&mut *tx, &user.id).await?;
            Ok((tx, pair))
        })
        .await
    }

    /// Authenticate with email and password.
    ///
    /// Missing user, wrong password and an unparseable stored hash all
    /// collapse into the same `InvalidCredentials` — distinguishing them
    /// would leak which emails exist.
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair, AuthError> {
        validation::validate_login(email, password)?;

        let user = match users::get_by_email(&self.pool, email).await? {
            Some(user) => user,
            None => return Err(AuthError::InvalidCredentials),
        };

        let matches = match password::verify_password(password, &user.password_hash) {
            Ok(matches) => matches,
            Err(err) => {
                error!(user_id = %user.id, error = %err, "stored password hash failed to verify");
                false
            }
        };
        if !matches {
            return Err(AuthError::InvalidCredentials);
        }

        self.issue_tokens(&self.pool, &user.id).await
    }

    /// Rotate a refresh token: revoke-and-replace the old row and persist
    /// the new one in a single transaction.
    ///
    /// Presenting an already-revoked token is the reuse signal — either a
    /// replay or a lost race against a concurrent refresh; both fail with
    /// `TokenRevoked`. The guarded `revoke_and_replace` update is the single
    /// source of truth for "has this token been consumed", not the read
    /// above it.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        client_ip: Option<&str>,
    ) -> Result<TokenPair, AuthError> {
        if refresh_token.is_empty() {
            return Err(AuthError::Validation(ValidationErrors::single(
                "refreshToken",
                "is required",
            )));
        }

        let result = uow::in_transaction(&self.pool, |mut tx| async move {
            let record = tokens::get_by_secret(&mut *tx, refresh_token)
                .await?
                .ok_or(AuthError::TokenNotFound)?;

            if record.revoked_at.is_some() {
                return Err(AuthError::TokenRevoked);
            }
            if record.expires_at <= Utc::now() {
                return Err(AuthError::TokenExpired);
            }

            let pair = self.issuer.issue(&record.user_id)?;

            let rotated =
                tokens::revoke_and_replace(&mut *tx, refresh_token, &pair.refresh_token, client_ip)
                    .await?;
            if rotated == 0 {
                // a concurrent refresh consumed the token between our read
                // and the guarded update
                return Err(AuthError::TokenRevoked);
            }

            tokens::save(
                &mut *tx,
                &uuidv7().to_string(),
                &record.user_id,
                &pair.refresh_token,
                self.issuer.refresh_expiry(),
            )
            .await?;

            Ok((tx, pair))
        })
        .await;

        if matches!(result, Err(AuthError::TokenRevoked)) {
            warn!(ip = ?client_ip, "revoked refresh token presented, possible reuse");
        }

        result
    }

    /// Revoke a refresh token. Idempotent: logging out an unknown or
    /// already-dead token succeeds. The access token, when present, is only
    /// an extra ownership check — an expired or garbled one is logged and
    /// ignored, a valid one naming a different user is `Forbidden`.
    pub async fn logout(
        &self,
        refresh_token: &str,
        access_token: Option<&str>,
        client_ip: Option<&str>,
    ) -> Result<(), AuthError> {
        if refresh_token.is_empty() {
            return Err(AuthError::Validation(ValidationErrors::single(
                "refreshToken",
                "is required",
            )));
        }

        let caller_id = access_token.and_then(|token| {
            let claims = self.issuer.verify_access(token);
            if claims.is_none() {
                warn!("invalid access token on logout");
            }
            claims.map(|c| c.sub)
        });

        let record = match tokens::get_by_secret(&self.pool, refresh_token).await? {
            Some(record) => record,
            None => return Ok(()),
        };
        if record.revoked_at.is_some() {
            return Ok(());
        }

        if let Some(caller_id) = caller_id
            && record.user_id != caller_id
        {
            return Err(AuthError::Forbidden);
        }

        tokens::revoke(&self.pool, &record.id, client_ip).await?;
        Ok(())
    }

    /// Shared issuance primitive: mint a pair and persist the refresh row.
    /// Runs on whatever execution context the caller is in — the pool for
    /// login, the open transaction for confirm.
    async fn issue_tokens<'e>(
        &self,
        executor: impl PgExecutor<'e>,
        user_id: &str,
    ) -> Result<TokenPair, AuthError> {
        let pair = self.issuer.issue(user_id)?;
        tokens::save(
            executor,
            &uuidv7().to_string(),
            user_id,
            &pair.refresh_token,
            self.issuer.refresh_expiry(),
        )
        .await?;
        Ok(pair)
    }

    /// Publish the registration event out-of-band: the user row is already
    /// committed, and a broker hiccup must not fail the caller-visible
    /// result — the mailer dedups on the idempotency key across redeliveries.
    fn spawn_registration_event(&self, user: &User, return_url: &str) {
        let Some(code) = user.confirmation_code.as_deref() else {
            return;
        };
        let event = UserRegisteredEvent::new(&user.id, &user.email, return_url, code);
        let payload = match serde_json::to_value(&event) {
            Ok(payload) => payload,
            Err(err) => {
                error!(error = %err, "failed to serialize registration event");
                return;
            }
        };

        let publisher = Arc::clone(&self.publisher);
        tokio::spawn(async move {
            if let Err(err) = publisher.publish(USER_REGISTERED_TOPIC, payload).await {
                warn!(error = %err, "failed to publish registration event");
            }
        });
    }
}

fn is_unique_violation(err: &AuthError) -> bool {
    match err {
        AuthError::Db(sqlx::Error::Database(db)) => db.is_unique_violation(),
        _ => false,
    }
}
