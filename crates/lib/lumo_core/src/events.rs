//! Outbound domain events.
//!
//! The broker client lives outside this service; [`EventPublisher`] is the
//! boundary. Delivery is at-least-once — consumers deduplicate on the event's
//! `idempotencyKey`, so retried deliveries of the same code are harmless.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

/// Topic carrying [`UserRegisteredEvent`]s to the mailer pipeline.
pub const USER_REGISTERED_TOPIC: &str = "users.registered";

/// Published after a confirmation code is issued (first registration or
/// resend). `return_url` already carries the code as a query parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRegisteredEvent {
    pub user_id: String,
    pub email: String,
    pub return_url: String,
    /// `<userId>;<code>` — lets the consumer deduplicate retried deliveries
    /// of the same code without a producer-side dedup store.
    pub idempotency_key: String,
}

impl UserRegisteredEvent {
    pub fn new(user_id: &str, email: &str, return_url: &str, code: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            email: email.to_string(),
            return_url: build_confirmation_link(return_url, code),
            idempotency_key: format!("{user_id};{code}"),
        }
    }
}

/// Append the confirmation code to the caller-supplied return URL.
///
/// An unparseable URL falls back to the raw string — the mailer link will be
/// broken either way, and failing the registration over it helps no one.
pub fn build_confirmation_link(return_url: &str, code: &str) -> String {
    match Url::parse(return_url) {
        Ok(mut url) => {
            url.query_pairs_mut().append_pair("code", code);
            url.into()
        }
        Err(err) => {
            warn!(return_url, error = %err, "unparseable return url, sending as-is");
            return_url.to_string()
        }
    }
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("event delivery failed: {0}")]
    Delivery(String),
}

/// At-least-once event delivery boundary.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<(), PublishError>;
}

/// Publisher for standalone runs: events go to the log instead of a broker.
pub struct LogPublisher;

#[async_trait]
impl EventPublisher for LogPublisher {
    async fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<(), PublishError> {
        info!(topic, %payload, "event published");
        Ok(())
    }
}
