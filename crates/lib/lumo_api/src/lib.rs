//! # lumo_api
//!
//! HTTP API for the Lumo authentication service.

pub mod config;
pub mod cookies;
pub mod error;
pub mod handlers;
pub mod models;

use axum::Router;
use axum::routing::post;
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};

use lumo_core::auth::service::SessionService;

use crate::config::ApiConfig;
use crate::handlers::auth;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// The session service — owns the pool, issuer and event publisher.
    pub sessions: SessionService,
    /// API configuration.
    pub config: ApiConfig,
}

/// Run embedded database migrations.
///
/// Delegates to `lumo_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    lumo_core::migrate::migrate(pool).await
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/auth/register", post(auth::register_handler))
        .route("/api/auth/confirm", post(auth::confirm_handler))
        .route("/api/auth/login", post(auth::login_handler))
        .route("/api/auth/refresh", post(auth::refresh_handler))
        .route("/api/auth/logout", post(auth::logout_handler))
        .layer(cors)
        .with_state(state)
}
