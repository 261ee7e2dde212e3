//! Device signal capture steps.
//!
//! Both steps run before the session is authenticated and never fail the flow.
//! `FingerprintCapture` keeps the fingerprint posted by the login form;
//! `DeviceIdCapture` makes sure the browser holds a long-lived `DEVICE_ID`
//! cookie. A freshly issued cookie is delivered through a redirect back into
//! the flow, so it is committed by the browser before the flow continues.

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::flow::{AuthFlowContext, Authenticator, Challenge, FlowOutcome};

/// Name of the hidden login form input carrying the fingerprint.
pub const FINGERPRINT_PARAM: &str = "device_fingerprint";

/// Session note (and event detail) holding the fingerprint.
pub const FINGERPRINT_NOTE: &str = "browser.fingerprint";

pub const DEVICE_ID_COOKIE: &str = "DEVICE_ID";

/// Session note (and event detail) holding the device id.
pub const DEVICE_ID_NOTE: &str = "device.id";

/// One year.
pub const DEFAULT_COOKIE_MAX_AGE_SECONDS: u64 = 365 * 24 * 60 * 60;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("malformed form data: {0}")]
    MalformedForm(String),
    #[error("authentication session is not available")]
    MissingSession,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FingerprintCapture;

impl FingerprintCapture {
    pub const PROVIDER_ID: &'static str = "capture-browser-fingerprint";
}

impl Authenticator for FingerprintCapture {
    fn id(&self) -> &'static str {
        Self::PROVIDER_ID
    }

    fn authenticate(&self, context: &mut dyn AuthFlowContext) -> FlowOutcome {
        if let Err(err) = capture_fingerprint(context) {
            error!("Error retrieving or storing browser fingerprint: {err}");
        }
        FlowOutcome::Success
    }
}

fn capture_fingerprint(context: &mut dyn AuthFlowContext) -> Result<(), CaptureError> {
    let Some(form) = context.form()? else {
        debug!("No form data on this request, fingerprint not captured");
        return Ok(());
    };

    let fingerprint = form
        .get(FINGERPRINT_PARAM)
        .filter(|value| !value.trim().is_empty())
        .cloned();

    let Some(fingerprint) = fingerprint else {
        warn!("Browser fingerprint parameter '{FINGERPRINT_PARAM}' not found or empty in form submission");
        return Ok(());
    };

    let session = context.auth_session().ok_or(CaptureError::MissingSession)?;
    info!(
        fingerprint_prefix = %prefix(&fingerprint, 8),
        auth_session = session.id(),
        "Stored browser fingerprint in note [{FINGERPRINT_NOTE}]"
    );
    session.set_note(FINGERPRINT_NOTE, fingerprint);

    Ok(())
}

/// Issues and reads the persistent device identity cookie.
#[derive(Debug, Clone)]
pub struct DeviceIdCapture {
    cookie_name: String,
    max_age_seconds: u64,
}

impl DeviceIdCapture {
    pub const PROVIDER_ID: &'static str = "device-id-cookie";

    #[must_use]
    pub fn new() -> Self {
        Self {
            cookie_name: DEVICE_ID_COOKIE.to_string(),
            max_age_seconds: DEFAULT_COOKIE_MAX_AGE_SECONDS,
        }
    }

    #[must_use]
    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    #[must_use]
    pub fn with_max_age_seconds(mut self, seconds: u64) -> Self {
        // Max-Age=0 would delete the cookie and re-challenge forever.
        self.max_age_seconds = seconds.max(1);
        self
    }

    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// `Set-Cookie` value for a device id. No `Domain`, so the browser scopes it
    /// to the requesting host.
    #[must_use]
    pub fn set_cookie_value(&self, device_id: &str) -> String {
        format!(
            "{}={device_id}; Path=/; Max-Age={}; Secure; HttpOnly",
            self.cookie_name, self.max_age_seconds
        )
    }
}

impl Default for DeviceIdCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl Authenticator for DeviceIdCapture {
    fn id(&self) -> &'static str {
        Self::PROVIDER_ID
    }

    fn authenticate(&self, context: &mut dyn AuthFlowContext) -> FlowOutcome {
        let existing = context
            .cookie(&self.cookie_name)
            .filter(|value| !value.trim().is_empty());

        if let Some(device_id) = existing {
            info!(device_id = %device_id, "Found existing device id cookie");
            store_device_id_note(context, &device_id);
            return FlowOutcome::Success;
        }

        let device_id = generate_device_id();
        info!(device_id = %device_id, "Setting new device id cookie");
        store_device_id_note(context, &device_id);

        FlowOutcome::Challenge(Challenge {
            location: context.refresh_execution_url(),
            set_cookies: vec![self.set_cookie_value(&device_id)],
        })
    }
}

fn store_device_id_note(context: &mut dyn AuthFlowContext, device_id: &str) {
    match context.auth_session() {
        Some(session) => session.set_note(DEVICE_ID_NOTE, device_id),
        None => warn!("Failed to store device id in auth notes: {}", CaptureError::MissingSession),
    }
}

fn generate_device_id() -> String {
    Uuid::new_v4().to_string()
}

fn prefix(value: &str, len: usize) -> String {
    value.chars().take(len).collect()
}
