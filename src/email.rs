//! Outbound email abstractions.
//!
//! New-device notifications are handed to an `EmailSender`. The production
//! sender enqueues a `pending` row in `email_outbox`; delivery (SMTP, API, etc.)
//! and retries belong to the mail service polling that table.
//!
//! The default sender for local dev is `LogEmailSender`, which logs and returns `Ok(())`.
use async_trait::async_trait;
use serde_json::json;
use sqlx::PgPool;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{Instrument, info, info_span};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailMessage {
    pub to_email: String,
    pub realm_id: String,
    pub user_id: String,
    pub template: String,
    pub subject_key: String,
    pub attributes: BTreeMap<String, String>,
}

impl EmailMessage {
    /// JSON stored in `email_outbox.payload_json`.
    #[must_use]
    pub fn payload(&self) -> serde_json::Value {
        json!({
            "realm_id": self.realm_id,
            "user_id": self.user_id,
            "subject_key": self.subject_key,
            "attributes": self.attributes,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("failed to enqueue email: {0}")]
    Outbox(#[from] sqlx::Error),
    #[error("failed to serialize email payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("email transport error: {0}")]
    Transport(String),
}

/// Email delivery abstraction.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Deliver or enqueue a message.
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError>;
}

/// Local dev sender that logs the payload instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        info!(
            to_email = %message.to_email,
            template = %message.template,
            payload = %message.payload(),
            "email send stub"
        );
        Ok(())
    }
}

/// Writes messages to the `email_outbox` table.
#[derive(Clone, Debug)]
pub struct OutboxEmailSender {
    pool: PgPool,
}

impl OutboxEmailSender {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EmailSender for OutboxEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        let payload_text = serde_json::to_string(&message.payload())?;

        let query = r"
            INSERT INTO email_outbox (to_email, template, payload_json)
            VALUES ($1, $2, $3::jsonb)
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(&message.to_email)
            .bind(&message.template)
            .bind(payload_text)
            .execute(&self.pool)
            .instrument(span)
            .await?;

        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EmailSenderKind {
    Log,
    #[default]
    Outbox,
}

impl EmailSenderKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Outbox => "outbox",
        }
    }
}

impl fmt::Display for EmailSenderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmailSenderKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "log" => Ok(Self::Log),
            "outbox" => Ok(Self::Outbox),
            other => Err(format!("unknown email sender: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_carries_routing_and_attributes() {
        let message = EmailMessage {
            to_email: "alice@example.com".to_string(),
            realm_id: "acme".to_string(),
            user_id: "u-1".to_string(),
            template: "new-device-login-email".to_string(),
            subject_key: "newDeviceLoginSubject".to_string(),
            attributes: BTreeMap::from([("username".to_string(), "alice".to_string())]),
        };

        let payload = message.payload();
        assert_eq!(payload["realm_id"], "acme");
        assert_eq!(payload["user_id"], "u-1");
        assert_eq!(payload["subject_key"], "newDeviceLoginSubject");
        assert_eq!(payload["attributes"]["username"], "alice");
    }

    #[test]
    fn sender_kind_parses() {
        assert_eq!("log".parse::<EmailSenderKind>(), Ok(EmailSenderKind::Log));
        assert_eq!(" Outbox ".parse::<EmailSenderKind>(), Ok(EmailSenderKind::Outbox));
        assert!("smtp".parse::<EmailSenderKind>().is_err());
        assert_eq!(EmailSenderKind::default().to_string(), "outbox");
    }

    #[tokio::test]
    async fn log_sender_always_succeeds() {
        let message = EmailMessage {
            to_email: "a@example.com".to_string(),
            realm_id: "r".to_string(),
            user_id: "u".to_string(),
            template: "t".to_string(),
            subject_key: "s".to_string(),
            attributes: BTreeMap::new(),
        };
        assert!(LogEmailSender.send(&message).await.is_ok());
    }

    #[tokio::test]
    async fn outbox_sender_enqueues_pending_row() -> anyhow::Result<()> {
        use crate::store::testing::{self, DB_LOCK};
        use sqlx::Row;

        let _guard = DB_LOCK.lock().await;
        let Some(pool) = testing::pool().await? else {
            return Ok(());
        };
        testing::truncate(&pool).await?;

        let message = EmailMessage {
            to_email: "alice@example.com".to_string(),
            realm_id: "acme".to_string(),
            user_id: "u-1".to_string(),
            template: "new-device-login-email".to_string(),
            subject_key: "newDeviceLoginSubject".to_string(),
            attributes: BTreeMap::from([("ipAddress".to_string(), "203.0.113.9".to_string())]),
        };
        OutboxEmailSender::new(pool.clone()).send(&message).await?;

        let rows = sqlx::query(
            "SELECT to_email, template, payload_json::text AS payload, status::text AS status, attempts FROM email_outbox",
        )
        .fetch_all(&pool)
        .await?;
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.try_get::<String, _>("to_email")?, "alice@example.com");
        assert_eq!(row.try_get::<String, _>("template")?, "new-device-login-email");
        assert_eq!(row.try_get::<String, _>("status")?, "pending");
        assert_eq!(row.try_get::<i32, _>("attempts")?, 0);
        let payload: serde_json::Value =
            serde_json::from_str(&row.try_get::<String, _>("payload")?)?;
        assert_eq!(payload, message.payload());
        Ok(())
    }
}
