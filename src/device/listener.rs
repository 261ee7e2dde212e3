//! Login event listener: resolve, evaluate, notify.
//!
//! Runs once per login event. Nothing here can fail or undo the login; every
//! problem ends as a log line and a [`ListenerOutcome`].

use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use super::event::{EventType, LoginEvent};
use super::history::{DeviceDecision, KnownDeviceEvaluator};
use super::notifier::{Notifier, NotifyOutcome};
use super::signature::resolve;
use crate::store::{UserDirectory, UserKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    NotLogin,
    MissingIds,
    UnknownUser,
    DirectoryError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerOutcome {
    Ignored(IgnoreReason),
    /// Neither a fingerprint nor a User-Agent was available.
    Unidentified,
    KnownDevice,
    NewDevice(NotifyOutcome),
    /// The history could not be read or written.
    Failed,
}

pub struct NewDeviceListener {
    directory: Arc<dyn UserDirectory>,
    evaluator: KnownDeviceEvaluator,
    notifier: Notifier,
}

impl NewDeviceListener {
    #[must_use]
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        evaluator: KnownDeviceEvaluator,
        notifier: Notifier,
    ) -> Self {
        Self {
            directory,
            evaluator,
            notifier,
        }
    }

    /// Handle one event. `user_agent` is taken from the request that carried it.
    #[instrument(
        skip_all,
        fields(realm_id = event.realm_id.as_deref(), user_id = event.user_id.as_deref())
    )]
    pub async fn on_event(&self, event: &LoginEvent, user_agent: Option<&str>) -> ListenerOutcome {
        if event.event_type != EventType::Login {
            return ListenerOutcome::Ignored(IgnoreReason::NotLogin);
        }

        let (Some(realm_id), Some(user_id)) = (
            non_blank(event.realm_id.as_deref()),
            non_blank(event.user_id.as_deref()),
        ) else {
            warn!("login event missing realm id or user id");
            return ListenerOutcome::Ignored(IgnoreReason::MissingIds);
        };
        let key = UserKey::new(realm_id, user_id);

        let user = match self.directory.find_user(&key).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                warn!("user not found for login event");
                return ListenerOutcome::Ignored(IgnoreReason::UnknownUser);
            }
            Err(err) => {
                error!("failed to look up user for login event: {err}");
                return ListenerOutcome::Ignored(IgnoreReason::DirectoryError);
            }
        };

        let resolved = match resolve(&event.details, user_agent) {
            Ok(resolved) => resolved,
            Err(err) => {
                warn!(username = %user.username, "{err}");
                return ListenerOutcome::Unidentified;
            }
        };
        debug!(
            username = %user.username,
            source = resolved.source.as_str(),
            "resolved device signature"
        );

        match self.evaluator.check_and_record(&key, &resolved.signature).await {
            Ok(DeviceDecision::Known) => {
                info!(
                    username = %user.username,
                    signature = %resolved.signature,
                    "known device signature"
                );
                ListenerOutcome::KnownDevice
            }
            Ok(DeviceDecision::New) => {
                info!(
                    username = %user.username,
                    signature = %resolved.signature,
                    source = resolved.source.as_str(),
                    "new device signature detected"
                );
                let outcome = self
                    .notifier
                    .notify(
                        &user,
                        event.ip_address.as_deref(),
                        &resolved.device_info,
                        event.time,
                    )
                    .await;
                ListenerOutcome::NewDevice(outcome)
            }
            Err(err) => {
                error!(username = %user.username, "failed to update known devices: {err}");
                ListenerOutcome::Failed
            }
        }
    }
}

impl std::fmt::Debug for NewDeviceListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewDeviceListener")
            .field("evaluator", &self.evaluator)
            .field("notifier", &self.notifier)
            .finish_non_exhaustive()
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}
