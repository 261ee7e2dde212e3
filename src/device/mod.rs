//! New-device login detection.
//!
//! - [`capture`]: flow steps recording the browser fingerprint and device cookie.
//! - [`event`]: login events and session-note propagation.
//! - [`signature`]: fingerprint or User-Agent based device signature.
//! - [`history`]: bounded per-user history and the new-vs-known decision.
//! - [`notifier`]: email notification for new devices.
//! - [`listener`]: ties the last three together for each login event.

pub mod capture;
pub mod event;
pub mod flow;
pub mod history;
pub mod listener;
pub mod notifier;
pub mod signature;

use std::sync::Arc;

pub use capture::{CaptureError, DeviceIdCapture, FingerprintCapture};
pub use event::{EventType, LoginEvent, propagate_session_notes};
pub use flow::{AuthFlowContext, AuthSession, Authenticator, Challenge, FlowOutcome, FlowPipeline};
pub use history::{DeviceDecision, KnownDeviceEvaluator};
pub use listener::{IgnoreReason, ListenerOutcome, NewDeviceListener};
pub use notifier::{EmailTemplate, NotifyOutcome, Notifier, RealmTemplate, TemplateSelector};
pub use signature::{DeviceSignature, ResolveError, ResolvedSignature, SignatureSource};

pub const DEFAULT_FLOW_TTL_SECONDS: u64 = 30 * 60;
pub const DEFAULT_MAX_FLOWS: usize = 10_000;

/// Tunables for capture, history and flow sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    max_signatures: usize,
    cas_attempts: u32,
    cookie_name: String,
    cookie_max_age_seconds: u64,
    flow_ttl_seconds: u64,
    max_flows: usize,
}

impl DeviceConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_signatures: history::DEFAULT_MAX_SIGNATURES,
            cas_attempts: history::DEFAULT_CAS_ATTEMPTS,
            cookie_name: capture::DEVICE_ID_COOKIE.to_string(),
            cookie_max_age_seconds: capture::DEFAULT_COOKIE_MAX_AGE_SECONDS,
            flow_ttl_seconds: DEFAULT_FLOW_TTL_SECONDS,
            max_flows: DEFAULT_MAX_FLOWS,
        }
    }

    #[must_use]
    pub fn with_max_signatures(mut self, max_signatures: usize) -> Self {
        self.max_signatures = max_signatures;
        self
    }

    #[must_use]
    pub fn with_cas_attempts(mut self, cas_attempts: u32) -> Self {
        self.cas_attempts = cas_attempts;
        self
    }

    #[must_use]
    pub fn with_cookie_name(mut self, cookie_name: impl Into<String>) -> Self {
        self.cookie_name = cookie_name.into();
        self
    }

    #[must_use]
    pub fn with_cookie_max_age_seconds(mut self, seconds: u64) -> Self {
        self.cookie_max_age_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_flow_ttl_seconds(mut self, seconds: u64) -> Self {
        self.flow_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_max_flows(mut self, max_flows: usize) -> Self {
        self.max_flows = max_flows;
        self
    }

    /// Clamp zero values to the smallest usable setting.
    #[must_use]
    pub fn normalize(self) -> Self {
        let cookie_name = if self.cookie_name.trim().is_empty() {
            capture::DEVICE_ID_COOKIE.to_string()
        } else {
            self.cookie_name
        };
        Self {
            max_signatures: self.max_signatures.max(1),
            cas_attempts: self.cas_attempts.max(1),
            cookie_name,
            cookie_max_age_seconds: self.cookie_max_age_seconds.max(1),
            flow_ttl_seconds: self.flow_ttl_seconds.max(1),
            max_flows: self.max_flows.max(1),
        }
    }

    #[must_use]
    pub fn max_signatures(&self) -> usize {
        self.max_signatures
    }

    #[must_use]
    pub fn cas_attempts(&self) -> u32 {
        self.cas_attempts
    }

    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    #[must_use]
    pub fn cookie_max_age_seconds(&self) -> u64 {
        self.cookie_max_age_seconds
    }

    #[must_use]
    pub fn flow_ttl_seconds(&self) -> u64 {
        self.flow_ttl_seconds
    }

    /// Upper bound on concurrently open authentication sessions.
    #[must_use]
    pub fn max_flows(&self) -> usize {
        self.max_flows
    }

    /// Capture steps in flow order: fingerprint first, then the device cookie.
    #[must_use]
    pub fn capture_pipeline(&self) -> FlowPipeline {
        FlowPipeline::new()
            .with_step(Arc::new(FingerprintCapture))
            .with_step(Arc::new(
                DeviceIdCapture::new()
                    .with_cookie_name(self.cookie_name.clone())
                    .with_max_age_seconds(self.cookie_max_age_seconds),
            ))
    }

    #[must_use]
    pub fn evaluator(&self, store: Arc<dyn crate::store::AttributeStore>) -> KnownDeviceEvaluator {
        KnownDeviceEvaluator::new(store)
            .with_max_signatures(self.max_signatures)
            .with_max_attempts(self.cas_attempts)
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self::new()
    }
}
