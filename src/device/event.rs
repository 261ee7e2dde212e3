//! Login events and the session-note propagation contract.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;

use super::flow::AuthSession;

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Login,
    LoginError,
    Logout,
    Register,
    #[serde(other)]
    Other,
}

/// A login event as delivered by the host's event feed.
///
/// `time` is in unix seconds. `details` may carry the propagated session notes.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LoginEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub realm_id: Option<String>,
    pub user_id: Option<String>,
    pub ip_address: Option<String>,
    pub time: i64,
    #[serde(default)]
    pub details: HashMap<String, String>,
}

impl LoginEvent {
    /// Build the `LOGIN` event for a completed authentication session.
    #[must_use]
    pub fn from_session(
        session: &AuthSession,
        realm_id: impl Into<String>,
        user_id: impl Into<String>,
        ip_address: Option<String>,
        time: i64,
    ) -> Self {
        let mut details = HashMap::new();
        propagate_session_notes(session, &mut details);
        Self {
            event_type: EventType::Login,
            realm_id: Some(realm_id.into()),
            user_id: Some(user_id.into()),
            ip_address,
            time,
            details,
        }
    }
}

/// Copy every note of the authentication session into event details, keeping
/// the note keys. Existing details win over notes.
pub fn propagate_session_notes(session: &AuthSession, details: &mut HashMap<String, String>) {
    for (key, value) in session.notes() {
        details
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::capture::{DEVICE_ID_NOTE, FINGERPRINT_NOTE};

    #[test]
    fn notes_surface_under_the_same_keys() {
        let mut session = AuthSession::new("flow");
        session.set_note(FINGERPRINT_NOTE, "fp-abc123");
        session.set_note(DEVICE_ID_NOTE, "device-1");

        let event = LoginEvent::from_session(
            &session,
            "realm",
            "user",
            Some("10.0.0.1".to_string()),
            1_700_000_000,
        );

        assert_eq!(event.event_type, EventType::Login);
        assert_eq!(
            event.details.get(FINGERPRINT_NOTE).map(String::as_str),
            Some("fp-abc123")
        );
        assert_eq!(
            event.details.get(DEVICE_ID_NOTE).map(String::as_str),
            Some("device-1")
        );
    }

    #[test]
    fn existing_details_are_not_overwritten() {
        let mut session = AuthSession::new("flow");
        session.set_note("k", "note");
        let mut details = HashMap::from([("k".to_string(), "detail".to_string())]);

        propagate_session_notes(&session, &mut details);

        assert_eq!(details.get("k").map(String::as_str), Some("detail"));
    }

    #[test]
    fn event_json_shape() {
        let json = r#"{
            "type": "LOGIN",
            "realm_id": "acme",
            "user_id": "u-1",
            "ip_address": null,
            "time": 1700000000,
            "details": {"browser.fingerprint": "fp"}
        }"#;
        let event: Result<LoginEvent, _> = serde_json::from_str(json);
        let event = event.ok();
        assert_eq!(event.as_ref().map(|e| e.event_type), Some(EventType::Login));
        assert_eq!(
            event
                .as_ref()
                .and_then(|e| e.details.get("browser.fingerprint"))
                .map(String::as_str),
            Some("fp")
        );
    }

    #[test]
    fn unknown_event_types_are_tolerated() {
        let json = r#"{"type": "CODE_TO_TOKEN", "realm_id": "r", "user_id": "u", "ip_address": null, "time": 0}"#;
        let event: Result<LoginEvent, _> = serde_json::from_str(json);
        assert_eq!(event.ok().map(|e| e.event_type), Some(EventType::Other));
    }
}
