//! Authentication request handlers.
//!
//! Thin codecs: decode the request, call the session service, render the
//! result. The refresh token is read from the body when present, from the
//! `rt` cookie otherwise.

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum_extra::extract::CookieJar;

use crate::AppState;
use crate::cookies::{self, REFRESH_COOKIE};
use crate::error::AppResult;
use crate::models::{
    ConfirmRequest, LoginRequest, LogoutRequest, LogoutResponse, RefreshRequest, RegisterRequest,
    RegisterResponse, TokenResponse,
};

use lumo_core::auth::AuthError;
use lumo_core::auth::validation::ValidationErrors;

/// `POST /api/auth/register` — create an account or re-send a code.
pub async fn register_handler(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> AppResult<Json<RegisterResponse>> {
    let user = state
        .sessions
        .register(&body.nickname, &body.email, &body.password, &body.return_url)
        .await?;
    Ok(Json(RegisterResponse {
        message: "a confirmation code has been sent to your email".to_string(),
        user,
    }))
}

/// `POST /api/auth/confirm` — confirm the account and open its first session.
pub async fn confirm_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<ConfirmRequest>,
) -> AppResult<(CookieJar, Json<TokenResponse>)> {
    let pair = state.sessions.confirm(&body.user_id, &body.code).await?;
    let resp = TokenResponse::new(pair, state.config.access_ttl_secs());
    let jar = jar.add(cookies::refresh_cookie(
        &resp.refresh_token,
        state.config.refresh_ttl_secs(),
    ));
    Ok((jar, Json(resp)))
}

/// `POST /api/auth/login` — authenticate with email + password.
pub async fn login_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> AppResult<(CookieJar, Json<TokenResponse>)> {
    let pair = state.sessions.login(&body.email, &body.password).await?;
    let resp = TokenResponse::new(pair, state.config.access_ttl_secs());
    let jar = jar.add(cookies::refresh_cookie(
        &resp.refresh_token,
        state.config.refresh_ttl_secs(),
    ));
    Ok((jar, Json(resp)))
}

/// `POST /api/auth/refresh` — rotate the refresh token.
pub async fn refresh_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
    body: Option<Json<RefreshRequest>>,
) -> AppResult<(CookieJar, Json<TokenResponse>)> {
    let token = refresh_token_from(body.and_then(|Json(b)| b.refresh_token), &jar)?;
    let pair = state
        .sessions
        .refresh(&token, client_ip(&headers).as_deref())
        .await?;
    let resp = TokenResponse::new(pair, state.config.access_ttl_secs());
    let jar = jar.add(cookies::refresh_cookie(
        &resp.refresh_token,
        state.config.refresh_ttl_secs(),
    ));
    Ok((jar, Json(resp)))
}

/// `POST /api/auth/logout` — revoke the refresh token, clear the cookie.
pub async fn logout_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
    body: Option<Json<LogoutRequest>>,
) -> AppResult<(CookieJar, Json<LogoutResponse>)> {
    let token = refresh_token_from(body.and_then(|Json(b)| b.refresh_token), &jar)?;
    let access_token = bearer_token(&headers);
    state
        .sessions
        .logout(&token, access_token.as_deref(), client_ip(&headers).as_deref())
        .await?;
    let jar = jar.add(cookies::clear_refresh_cookie());
    Ok((jar, Json(LogoutResponse { success: true })))
}

/// Body first, `rt` cookie as the fallback source.
fn refresh_token_from(body_token: Option<String>, jar: &CookieJar) -> Result<String, AuthError> {
    body_token
        .filter(|t| !t.is_empty())
        .or_else(|| jar.get(REFRESH_COOKIE).map(|c| c.value().to_string()))
        .ok_or_else(|| {
            AuthError::Validation(ValidationErrors::single("refreshToken", "is required"))
        })
}

/// Best-effort `Authorization: Bearer` extraction.
fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

/// Best-effort client IP from `x-forwarded-for`.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")?
        .to_str()
        .ok()?
        .split(',')
        .next()
        .map(|ip| ip.trim().to_string())
}
