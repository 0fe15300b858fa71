//! Session service tests against an ephemeral PostgreSQL instance.
//!
//! Each test bootstraps its own server via `DbManager` and skips with a log
//! line when no PostgreSQL toolchain is on PATH.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;

use lumo_core::auth::AuthError;
use lumo_core::auth::jwt::TokenIssuer;
use lumo_core::auth::service::SessionService;
use lumo_core::auth::store::tokens::hash_secret;
use lumo_core::db::{DbError, DbManager};
use lumo_core::events::{EventPublisher, PublishError, USER_REGISTERED_TOPIC};
use lumo_core::models::auth::TokenPair;
use lumo_core::uuid::uuidv7;

/// Captures published events for assertions.
#[derive(Default)]
struct RecordingPublisher {
    events: Mutex<Vec<(String, serde_json::Value)>>,
}

impl RecordingPublisher {
    fn snapshot(&self) -> Vec<(String, serde_json::Value)> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<(), PublishError> {
        self.events
            .lock()
            .unwrap()
            .push((topic.to_string(), payload));
        Ok(())
    }
}

struct TestEnv {
    _db: DbManager,
    pool: PgPool,
    service: SessionService,
    publisher: Arc<RecordingPublisher>,
}

async fn test_env() -> Option<TestEnv> {
    let mut db = match DbManager::ephemeral().await {
        Ok(db) => db,
        Err(DbError::PgConfigNotFound) => {
            eprintln!("skipping: PostgreSQL binaries not found on PATH");
            return None;
        }
        Err(err) => panic!("ephemeral postgres: {err}"),
    };
    db.setup().await.expect("db setup");
    db.start().await.expect("db start");

    let pool = PgPool::connect(&db.connection_url())
        .await
        .expect("connect to ephemeral PG");
    lumo_core::migrate::migrate(&pool).await.expect("migrate");

    let publisher = Arc::new(RecordingPublisher::default());
    let service = SessionService::new(
        pool.clone(),
        Arc::new(TokenIssuer::with_defaults(b"test-secret")),
        publisher.clone(),
    );

    Some(TestEnv {
        _db: db,
        pool,
        service,
        publisher,
    })
}

async fn wait_for_events(
    publisher: &RecordingPublisher,
    n: usize,
) -> Vec<(String, serde_json::Value)> {
    for _ in 0..250 {
        let events = publisher.snapshot();
        if events.len() >= n {
            return events;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {n} published events");
}

async fn pending_code(pool: &PgPool, user_id: &str) -> String {
    sqlx::query_scalar::<_, Option<String>>(
        "SELECT confirmation_code FROM users WHERE id = $1::uuid",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await
    .expect("query confirmation code")
    .expect("confirmation code present")
}

async fn backdate_code_request(pool: &PgPool, user_id: &str, minutes: f64) {
    sqlx::query(
        "UPDATE users SET code_requested_at = code_requested_at - $1 * interval '1 minute' \
         WHERE id = $2::uuid",
    )
    .bind(minutes)
    .bind(user_id)
    .execute(pool)
    .await
    .expect("backdate code request");
}

async fn register_and_confirm(env: &TestEnv, nickname: &str, email: &str) -> (String, TokenPair) {
    let user = env
        .service
        .register(nickname, email, "password123", "https://x/confirm")
        .await
        .expect("register");
    let code = pending_code(&env.pool, &user.id).await;
    let pair = env.service.confirm(&user.id, &code).await.expect("confirm");
    (user.id, pair)
}

#[tokio::test]
async fn register_creates_pending_user_and_publishes_event() {
    let Some(env) = test_env().await else { return };

    let user = env
        .service
        .register("alice", "a@x.com", "password123", "https://x/confirm")
        .await
        .expect("register");
    assert_eq!(user.nickname, "alice");
    assert_eq!(user.email, "a@x.com");
    assert!(!user.is_confirmed);

    let code = pending_code(&env.pool, &user.id).await;
    let events = wait_for_events(&env.publisher, 1).await;
    let (topic, payload) = &events[0];
    assert_eq!(topic, USER_REGISTERED_TOPIC);
    assert_eq!(payload["userId"], user.id.as_str());
    assert_eq!(payload["email"], "a@x.com");
    assert_eq!(
        payload["returnUrl"],
        format!("https://x/confirm?code={code}")
    );
    assert_eq!(payload["idempotencyKey"], format!("{};{}", user.id, code));
}

#[tokio::test]
async fn register_enforces_cooldown_then_reissues_a_fresh_code() {
    let Some(env) = test_env().await else { return };

    let user = env
        .service
        .register("alice", "a@x.com", "password123", "https://x/confirm")
        .await
        .expect("register");
    let first_code = pending_code(&env.pool, &user.id).await;

    // inside the cooldown window
    let err = env
        .service
        .register("alice", "a@x.com", "password123", "https://x/confirm")
        .await
        .expect_err("must be rate limited");
    assert!(matches!(err, AuthError::CodeRequestTimeout));

    // past the cooldown: a new code is issued and a new event published
    backdate_code_request(&env.pool, &user.id, 3.0).await;
    let again = env
        .service
        .register("alice", "A@X.COM", "password123", "https://x/confirm")
        .await
        .expect("reissue");
    assert_eq!(again.id, user.id);

    let second_code = pending_code(&env.pool, &user.id).await;
    assert_ne!(first_code, second_code);
    wait_for_events(&env.publisher, 2).await;
}

#[tokio::test]
async fn register_on_confirmed_email_is_rejected() {
    let Some(env) = test_env().await else { return };

    register_and_confirm(&env, "alice", "a@x.com").await;

    let err = env
        .service
        .register("alice", "a@x.com", "password123", "https://x/confirm")
        .await
        .expect_err("must reject");
    assert!(matches!(err, AuthError::AlreadyRegistered));
}

#[tokio::test]
async fn confirm_checks_code_then_opens_a_session_exactly_once() {
    let Some(env) = test_env().await else { return };

    let unknown = uuidv7().to_string();
    let err = env.service.confirm(&unknown, "whatever").await.expect_err("unknown user");
    assert!(matches!(err, AuthError::UserNotFound));

    let user = env
        .service
        .register("alice", "a@x.com", "password123", "https://x/confirm")
        .await
        .expect("register");

    let err = env
        .service
        .confirm(&user.id, "wrong-code")
        .await
        .expect_err("wrong code");
    assert!(matches!(err, AuthError::InvalidCode));

    let code = pending_code(&env.pool, &user.id).await;
    let pair = env.service.confirm(&user.id, &code).await.expect("confirm");

    // the access token names the confirmed user
    let claims = env
        .service
        .issuer()
        .verify_access(&pair.access_token)
        .expect("verify access token");
    assert_eq!(claims.sub, user.id);

    // confirmation cleared the code and flipped the flag
    let (confirmed, cleared): (bool, Option<String>) = sqlx::query_as(
        "SELECT is_confirmed, confirmation_code FROM users WHERE id = $1::uuid",
    )
    .bind(&user.id)
    .fetch_one(&env.pool)
    .await
    .expect("query user");
    assert!(confirmed);
    assert!(cleared.is_none());

    // the refresh token row landed in the same transaction
    let active: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM tokens WHERE user_id = $1::uuid AND revoked_at IS NULL",
    )
    .bind(&user.id)
    .fetch_one(&env.pool)
    .await
    .expect("count tokens");
    assert_eq!(active, 1);

    // second confirmation with the same (now cleared) code is refused
    let err = env
        .service
        .confirm(&user.id, &code)
        .await
        .expect_err("second confirm");
    assert!(matches!(err, AuthError::AlreadyRegistered));
}

#[tokio::test]
async fn confirm_past_the_window_is_link_expired() {
    let Some(env) = test_env().await else { return };

    let user = env
        .service
        .register("alice", "a@x.com", "password123", "https://x/confirm")
        .await
        .expect("register");
    let code = pending_code(&env.pool, &user.id).await;

    backdate_code_request(&env.pool, &user.id, 11.0).await;

    let err = env
        .service
        .confirm(&user.id, &code)
        .await
        .expect_err("expired link");
    assert!(matches!(err, AuthError::LinkExpired));
}

#[tokio::test]
async fn login_collapses_all_failures_into_invalid_credentials() {
    let Some(env) = test_env().await else { return };

    let err = env
        .service
        .login("nobody@x.com", "password123")
        .await
        .expect_err("unknown email");
    assert!(matches!(err, AuthError::InvalidCredentials));

    let (user_id, _) = register_and_confirm(&env, "alice", "a@x.com").await;

    let err = env
        .service
        .login("a@x.com", "password124")
        .await
        .expect_err("wrong password");
    assert!(matches!(err, AuthError::InvalidCredentials));

    let pair = env.service.login("a@x.com", "password123").await.expect("login");
    let claims = env
        .service
        .issuer()
        .verify_access(&pair.access_token)
        .expect("verify");
    assert_eq!(claims.sub, user_id);
}

#[tokio::test]
async fn refresh_rotates_once_and_flags_reuse() {
    let Some(env) = test_env().await else { return };

    register_and_confirm(&env, "alice", "a@x.com").await;
    let pair1 = env.service.login("a@x.com", "password123").await.expect("login");

    let pair2 = env
        .service
        .refresh(&pair1.refresh_token, Some("10.0.0.1"))
        .await
        .expect("first refresh");
    assert_ne!(pair1.refresh_token, pair2.refresh_token);

    // the old row is revoked and chained to its successor
    let (revoked_at, replaced_by, revoked_by_ip): (
        Option<chrono::DateTime<Utc>>,
        Option<String>,
        Option<String>,
    ) = sqlx::query_as(
        "SELECT revoked_at, replaced_by_token_hash, revoked_by_ip FROM tokens WHERE token_hash = $1",
    )
    .bind(hash_secret(&pair1.refresh_token))
    .fetch_one(&env.pool)
    .await
    .expect("query old token");
    assert!(revoked_at.is_some());
    assert_eq!(replaced_by.as_deref(), Some(hash_secret(&pair2.refresh_token).as_str()));
    assert_eq!(revoked_by_ip.as_deref(), Some("10.0.0.1"));

    // replaying the consumed token is the reuse signal
    let err = env
        .service
        .refresh(&pair1.refresh_token, None)
        .await
        .expect_err("reuse");
    assert!(matches!(err, AuthError::TokenRevoked));

    // the successor still works
    env.service
        .refresh(&pair2.refresh_token, None)
        .await
        .expect("second refresh");
}

#[tokio::test]
async fn concurrent_refresh_has_exactly_one_winner() {
    let Some(env) = test_env().await else { return };

    register_and_confirm(&env, "alice", "a@x.com").await;
    let pair = env.service.login("a@x.com", "password123").await.expect("login");

    let (a, b) = tokio::join!(
        env.service.refresh(&pair.refresh_token, None),
        env.service.refresh(&pair.refresh_token, None),
    );

    let winners = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "exactly one concurrent refresh may succeed");
    for result in [a, b] {
        if let Err(err) = result {
            assert!(matches!(err, AuthError::TokenRevoked));
        }
    }
}

#[tokio::test]
async fn refresh_of_an_expired_token_fails() {
    let Some(env) = test_env().await else { return };

    register_and_confirm(&env, "alice", "a@x.com").await;
    let pair = env.service.login("a@x.com", "password123").await.expect("login");

    sqlx::query("UPDATE tokens SET expires_at = now() - interval '1 hour' WHERE token_hash = $1")
        .bind(hash_secret(&pair.refresh_token))
        .execute(&env.pool)
        .await
        .expect("expire token");

    let err = env
        .service
        .refresh(&pair.refresh_token, None)
        .await
        .expect_err("expired");
    assert!(matches!(err, AuthError::TokenExpired));

    let err = env
        .service
        .refresh("no-such-secret", None)
        .await
        .expect_err("unknown");
    assert!(matches!(err, AuthError::TokenNotFound));
}

#[tokio::test]
async fn logout_is_idempotent() {
    let Some(env) = test_env().await else { return };

    // unknown token: success, not an error
    env.service
        .logout("no-such-secret", None, None)
        .await
        .expect("logout of unknown token");

    register_and_confirm(&env, "alice", "a@x.com").await;
    let pair = env.service.login("a@x.com", "password123").await.expect("login");

    env.service
        .logout(&pair.refresh_token, Some(&pair.access_token), Some("10.0.0.1"))
        .await
        .expect("logout");

    let record = lumo_core::auth::store::tokens::get_by_secret(&env.pool, &pair.refresh_token)
        .await
        .expect("get token")
        .expect("token row");
    assert!(record.revoked_at.is_some());
    assert!(!record.is_active(Utc::now()));
    assert_eq!(record.revoked_by_ip.as_deref(), Some("10.0.0.1"));

    // already revoked: still success
    env.service
        .logout(&pair.refresh_token, None, None)
        .await
        .expect("repeat logout");

    // and the revoked token can no longer refresh
    let err = env
        .service
        .refresh(&pair.refresh_token, None)
        .await
        .expect_err("refresh after logout");
    assert!(matches!(err, AuthError::TokenRevoked));
}

#[tokio::test]
async fn logout_rejects_a_foreign_access_token_but_tolerates_garbage() {
    let Some(env) = test_env().await else { return };

    register_and_confirm(&env, "alice", "a@x.com").await;
    let (_, bob_pair) = register_and_confirm(&env, "bob", "b@x.com").await;
    let alice_pair = env.service.login("a@x.com", "password123").await.expect("login");

    // bob's access token does not own alice's refresh token
    let err = env
        .service
        .logout(&alice_pair.refresh_token, Some(&bob_pair.access_token), None)
        .await
        .expect_err("foreign owner");
    assert!(matches!(err, AuthError::Forbidden));

    // a garbled access token is only logged; logout still works
    env.service
        .logout(&alice_pair.refresh_token, Some("garbage.token.here"), None)
        .await
        .expect("logout with garbled access token");
}

/// The end-to-end walk: register → confirm → login → refresh → reuse
/// detection.
#[tokio::test]
async fn full_session_lifecycle() {
    let Some(env) = test_env().await else { return };

    let user = env
        .service
        .register("alice", "a@x.com", "password123", "https://x/confirm")
        .await
        .expect("register");

    let events = wait_for_events(&env.publisher, 1).await;
    let code = pending_code(&env.pool, &user.id).await;
    assert_eq!(events[0].1["idempotencyKey"], format!("{};{}", user.id, code));

    let err = env
        .service
        .confirm(&user.id, "wrong-code")
        .await
        .expect_err("wrong code");
    assert!(matches!(err, AuthError::InvalidCode));

    env.service.confirm(&user.id, &code).await.expect("confirm");

    let pair1 = env.service.login("a@x.com", "password123").await.expect("login");
    let pair2 = env
        .service
        .refresh(&pair1.refresh_token, None)
        .await
        .expect("refresh");
    assert_ne!(pair1.refresh_token, pair2.refresh_token);

    let err = env
        .service
        .refresh(&pair1.refresh_token, None)
        .await
        .expect_err("reuse");
    assert!(matches!(err, AuthError::TokenRevoked));
}
