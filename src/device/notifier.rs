//! New-device email notification.
//!
//! Only users with a verified, non-blank address are notified. Delivery errors
//! are logged and reported through [`NotifyOutcome`]; they never reach the login.

use chrono::DateTime;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::email::{EmailMessage, EmailSender};
use crate::store::UserRecord;

pub const DEFAULT_TEMPLATE: &str = "new-device-login-email";
pub const DEFAULT_SUBJECT_KEY: &str = "newDeviceLoginSubject";
pub const IP_NOT_AVAILABLE: &str = "Not Available";

const TIMESTAMP_FORMAT: &str = "%a %b %d %H:%M:%S UTC %Y";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailTemplate {
    pub name: String,
    pub subject_key: String,
}

impl Default for EmailTemplate {
    fn default() -> Self {
        Self {
            name: DEFAULT_TEMPLATE.to_string(),
            subject_key: DEFAULT_SUBJECT_KEY.to_string(),
        }
    }
}

/// Per-realm template override, written as `realm=template:subject`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealmTemplate {
    pub realm_id: String,
    pub template: EmailTemplate,
}

impl FromStr for RealmTemplate {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (realm_id, rest) = value
            .split_once('=')
            .ok_or_else(|| format!("expected realm=template:subject, got {value:?}"))?;
        let (name, subject_key) = rest
            .split_once(':')
            .ok_or_else(|| format!("expected realm=template:subject, got {value:?}"))?;

        let (realm_id, name, subject_key) = (realm_id.trim(), name.trim(), subject_key.trim());
        if realm_id.is_empty() || name.is_empty() || subject_key.is_empty() {
            return Err(format!("empty component in realm template {value:?}"));
        }

        Ok(Self {
            realm_id: realm_id.to_string(),
            template: EmailTemplate {
                name: name.to_string(),
                subject_key: subject_key.to_string(),
            },
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateSelector {
    default: EmailTemplate,
    realms: HashMap<String, EmailTemplate>,
}

impl TemplateSelector {
    #[must_use]
    pub fn new(default: EmailTemplate) -> Self {
        Self {
            default,
            realms: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_realm(mut self, realm: RealmTemplate) -> Self {
        self.realms.insert(realm.realm_id, realm.template);
        self
    }

    #[must_use]
    pub fn select(&self, realm_id: &str) -> &EmailTemplate {
        self.realms.get(realm_id).unwrap_or(&self.default)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub username: String,
    pub ip_address: String,
    pub device_info: String,
    pub timestamp: String,
}

impl NotificationPayload {
    #[must_use]
    pub fn new(username: &str, ip_address: Option<&str>, device_info: &str, time: i64) -> Self {
        let ip_address = ip_address
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .unwrap_or(IP_NOT_AVAILABLE);
        Self {
            username: username.to_string(),
            ip_address: ip_address.to_string(),
            device_info: device_info.to_string(),
            timestamp: format_timestamp(time),
        }
    }

    #[must_use]
    pub fn into_attributes(self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("username".to_string(), self.username),
            ("ipAddress".to_string(), self.ip_address),
            ("deviceInfo".to_string(), self.device_info),
            ("timestamp".to_string(), self.timestamp),
        ])
    }
}

/// Render unix seconds for humans. Out-of-range values fall back to the raw number.
#[must_use]
pub fn format_timestamp(seconds: i64) -> String {
    DateTime::from_timestamp(seconds, 0).map_or_else(
        || seconds.to_string(),
        |time| time.format(TIMESTAMP_FORMAT).to_string(),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    Sent,
    Skipped,
    Failed,
}

pub struct Notifier {
    sender: Arc<dyn EmailSender>,
    templates: TemplateSelector,
}

impl Notifier {
    #[must_use]
    pub fn new(sender: Arc<dyn EmailSender>) -> Self {
        Self {
            sender,
            templates: TemplateSelector::default(),
        }
    }

    #[must_use]
    pub fn with_templates(mut self, templates: TemplateSelector) -> Self {
        self.templates = templates;
        self
    }

    pub async fn notify(
        &self,
        user: &UserRecord,
        ip_address: Option<&str>,
        device_info: &str,
        time: i64,
    ) -> NotifyOutcome {
        let to_email = match user.email.as_deref().map(str::trim) {
            Some(email) if !email.is_empty() && user.email_verified => email,
            _ => {
                warn!(
                    username = %user.username,
                    "cannot send new device notification: email missing, blank or not verified"
                );
                return NotifyOutcome::Skipped;
            }
        };

        let template = self.templates.select(&user.realm_id);
        let message = EmailMessage {
            to_email: to_email.to_string(),
            realm_id: user.realm_id.clone(),
            user_id: user.id.clone(),
            template: template.name.clone(),
            subject_key: template.subject_key.clone(),
            attributes: NotificationPayload::new(&user.username, ip_address, device_info, time)
                .into_attributes(),
        };

        match self.sender.send(&message).await {
            Ok(()) => {
                info!(username = %user.username, "sent new device login notification");
                NotifyOutcome::Sent
            }
            Err(err) => {
                error!(
                    username = %user.username,
                    "failed to send new device notification: {err}"
                );
                NotifyOutcome::Failed
            }
        }
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("templates", &self.templates)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::email::EmailError;
    use async_trait::async_trait;
    use std::sync::{Mutex, PoisonError};

    /// Sender that keeps every message, or fails each one when `fail` is set.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingSender {
        pub fail: bool,
        pub sent: Mutex<Vec<EmailMessage>>,
    }

    impl RecordingSender {
        pub fn messages(&self) -> Vec<EmailMessage> {
            self.sent
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }
    }

    #[async_trait]
    impl EmailSender for RecordingSender {
        async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
            if self.fail {
                return Err(EmailError::Transport("connection refused".to_string()));
            }
            self.sent
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(message.clone());
            Ok(())
        }
    }

    pub(crate) fn verified_user() -> UserRecord {
        UserRecord {
            realm_id: "acme".to_string(),
            id: "u-1".to_string(),
            username: "alice".to_string(),
            email: Some("alice@example.com".to_string()),
            email_verified: true,
        }
    }

    #[test]
    fn timestamp_format() {
        assert_eq!(format_timestamp(0), "Thu Jan 01 00:00:00 UTC 1970");
        assert_eq!(format_timestamp(1_700_000_000), "Tue Nov 14 22:13:20 UTC 2023");
        assert_eq!(format_timestamp(i64::MAX), i64::MAX.to_string());
    }

    #[test]
    fn payload_attribute_names() {
        let attributes =
            NotificationPayload::new("alice", None, "Browser/OS: curl", 0).into_attributes();
        assert_eq!(
            attributes.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["deviceInfo", "ipAddress", "timestamp", "username"]
        );
        assert_eq!(
            attributes.get("ipAddress").map(String::as_str),
            Some(IP_NOT_AVAILABLE)
        );
    }

    #[test]
    fn realm_template_parsing() {
        let parsed: Result<RealmTemplate, _> = "corp=corp-device-email:corpSubject".parse();
        assert_eq!(
            parsed,
            Ok(RealmTemplate {
                realm_id: "corp".to_string(),
                template: EmailTemplate {
                    name: "corp-device-email".to_string(),
                    subject_key: "corpSubject".to_string(),
                },
            })
        );
        assert!("corp".parse::<RealmTemplate>().is_err());
        assert!("corp=template".parse::<RealmTemplate>().is_err());
        assert!("=t:s".parse::<RealmTemplate>().is_err());
    }

    #[test]
    fn selector_falls_back_to_default() {
        let selector = TemplateSelector::default().with_realm(RealmTemplate {
            realm_id: "corp".to_string(),
            template: EmailTemplate {
                name: "corp-device-email".to_string(),
                subject_key: "corpSubject".to_string(),
            },
        });
        assert_eq!(selector.select("corp").name, "corp-device-email");
        assert_eq!(selector.select("acme").name, DEFAULT_TEMPLATE);
        assert_eq!(selector.select("acme").subject_key, DEFAULT_SUBJECT_KEY);
    }

    #[tokio::test]
    async fn verified_user_is_notified() {
        let sender = Arc::new(RecordingSender::default());
        let notifier = Notifier::new(sender.clone());

        let outcome = notifier
            .notify(
                &verified_user(),
                Some("203.0.113.7"),
                "Browser Fingerprint: [fp-abc123...]",
                1_700_000_000,
            )
            .await;

        assert_eq!(outcome, NotifyOutcome::Sent);
        let messages = sender.messages();
        assert_eq!(messages.len(), 1);
        let message = &messages[0];
        assert_eq!(message.to_email, "alice@example.com");
        assert_eq!(message.template, DEFAULT_TEMPLATE);
        assert_eq!(message.subject_key, DEFAULT_SUBJECT_KEY);
        assert_eq!(
            message.attributes.get("ipAddress").map(String::as_str),
            Some("203.0.113.7")
        );
        assert_eq!(
            message.attributes.get("timestamp").map(String::as_str),
            Some("Tue Nov 14 22:13:20 UTC 2023")
        );
    }

    #[tokio::test]
    async fn unverified_or_blank_email_is_skipped() {
        let sender = Arc::new(RecordingSender::default());
        let notifier = Notifier::new(sender.clone());

        let mut unverified = verified_user();
        unverified.email_verified = false;
        let mut blank = verified_user();
        blank.email = Some("  ".to_string());
        let mut missing = verified_user();
        missing.email = None;

        for user in [unverified, blank, missing] {
            assert_eq!(
                notifier.notify(&user, None, "d", 0).await,
                NotifyOutcome::Skipped
            );
        }
        assert!(sender.messages().is_empty());
    }

    #[tokio::test]
    async fn send_failure_is_swallowed() {
        let sender = Arc::new(RecordingSender {
            fail: true,
            ..RecordingSender::default()
        });
        let notifier = Notifier::new(sender);

        let outcome = notifier.notify(&verified_user(), None, "d", 0).await;
        assert_eq!(outcome, NotifyOutcome::Failed);
    }
}
