//! Authentication flow seam.
//!
//! The host identity server owns the login flow. Capture steps only see it
//! through [`AuthFlowContext`]: decoded form parameters, request cookies, the
//! in-progress [`AuthSession`] and the URL that resumes the current step.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::capture::CaptureError;

/// In-progress authentication attempt and its ephemeral notes.
///
/// Notes live exactly as long as the session; they are copied into the login
/// event when the flow completes and dropped with the session otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthSession {
    id: String,
    notes: HashMap<String, String>,
}

impl AuthSession {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            notes: HashMap::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn set_note(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.notes.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn note(&self, key: &str) -> Option<&str> {
        self.notes.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn notes(&self) -> &HashMap<String, String> {
        &self.notes
    }
}

/// What the host flow exposes to a capture step.
pub trait AuthFlowContext {
    /// Decoded form parameters of the current exchange.
    ///
    /// `Ok(None)` means the request carried no form at all.
    ///
    /// # Errors
    /// Returns an error if a form body was sent but could not be decoded.
    fn form(&self) -> Result<Option<&HashMap<String, String>>, CaptureError>;

    /// Value of a request cookie, if the client sent it.
    fn cookie(&self, name: &str) -> Option<String>;

    /// The authentication session bound to this flow.
    fn auth_session(&mut self) -> Option<&mut AuthSession>;

    /// URL that re-enters the current step after a challenge.
    fn refresh_execution_url(&self) -> String;
}

/// Response that pauses the flow until the client follows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub location: String,
    pub set_cookies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowOutcome {
    /// Step finished, the flow moves on.
    Success,
    /// Step answered the client itself; the flow resumes on the next request.
    Challenge(Challenge),
}

/// A single step of the authentication pipeline.
pub trait Authenticator: Send + Sync {
    /// Stable provider id, used for logging and flow configuration.
    fn id(&self) -> &'static str;

    fn authenticate(&self, context: &mut dyn AuthFlowContext) -> FlowOutcome;
}

/// Ordered list of steps. Execution stops at the first challenge.
#[derive(Clone, Default)]
pub struct FlowPipeline {
    steps: Vec<Arc<dyn Authenticator>>,
}

impl FlowPipeline {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_step(mut self, step: Arc<dyn Authenticator>) -> Self {
        self.steps.push(step);
        self
    }

    #[must_use]
    pub fn step_ids(&self) -> Vec<&'static str> {
        self.steps.iter().map(|step| step.id()).collect()
    }

    pub fn run(&self, context: &mut dyn AuthFlowContext) -> FlowOutcome {
        for step in &self.steps {
            match step.authenticate(context) {
                FlowOutcome::Success => debug!(step = step.id(), "flow step completed"),
                challenge @ FlowOutcome::Challenge(_) => {
                    debug!(step = step.id(), "flow step issued a challenge");
                    return challenge;
                }
            }
        }
        FlowOutcome::Success
    }
}

impl std::fmt::Debug for FlowPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowPipeline")
            .field("steps", &self.step_ids())
            .finish()
    }
}
