//! Known-device history and the new-vs-known decision.
//!
//! The history is an ordered list of signatures stored as one multi-valued
//! user attribute, oldest first. Writes go through compare-and-swap so that two
//! logins of the same user racing each other cannot drop an entry.

use std::sync::Arc;
use tracing::{debug, warn};

use super::signature::DeviceSignature;
use crate::store::{AttributeStore, StoreError, UserKey};

pub const KNOWN_DEVICE_SIGNATURES_ATTRIBUTE: &str = "knownDeviceSignatures";
pub const DEFAULT_MAX_SIGNATURES: usize = 20;
pub const DEFAULT_CAS_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    Known,
    New {
        updated: Vec<String>,
        evicted: Vec<String>,
    },
}

/// Decide whether `signature` is already in `history`.
///
/// For a new signature the updated history is returned: the signature is
/// appended and entries are dropped from the front until at most `cap` remain.
/// A `cap` of zero is treated as one.
#[must_use]
pub fn evaluate(history: &[String], signature: &DeviceSignature, cap: usize) -> Evaluation {
    if history.iter().any(|known| known == signature.as_str()) {
        return Evaluation::Known;
    }

    let cap = cap.max(1);
    let mut updated = history.to_vec();
    updated.push(signature.as_str().to_string());

    let overflow = updated.len().saturating_sub(cap);
    let evicted: Vec<String> = updated.drain(..overflow).collect();

    Evaluation::New { updated, evicted }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceDecision {
    Known,
    New,
}

/// Loads, evaluates and persists the per-user history.
pub struct KnownDeviceEvaluator {
    store: Arc<dyn AttributeStore>,
    max_signatures: usize,
    max_attempts: u32,
}

impl KnownDeviceEvaluator {
    #[must_use]
    pub fn new(store: Arc<dyn AttributeStore>) -> Self {
        Self {
            store,
            max_signatures: DEFAULT_MAX_SIGNATURES,
            max_attempts: DEFAULT_CAS_ATTEMPTS,
        }
    }

    #[must_use]
    pub fn with_max_signatures(mut self, max_signatures: usize) -> Self {
        self.max_signatures = max_signatures.max(1);
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    #[must_use]
    pub fn max_signatures(&self) -> usize {
        self.max_signatures
    }

    /// Check `signature` against the user's history and record it if new.
    ///
    /// A lost write race reloads the history and decides again, so a signature
    /// recorded concurrently by another login turns into `Known`.
    ///
    /// # Errors
    /// Returns `StoreError::Contention` when every attempt lost a race, or the
    /// underlying store error.
    pub async fn check_and_record(
        &self,
        user: &UserKey,
        signature: &DeviceSignature,
    ) -> Result<DeviceDecision, StoreError> {
        for attempt in 1..=self.max_attempts {
            let stored = self
                .store
                .load(user, KNOWN_DEVICE_SIGNATURES_ATTRIBUTE)
                .await?;

            let (updated, evicted) =
                match evaluate(&stored.values, signature, self.max_signatures) {
                    Evaluation::Known => return Ok(DeviceDecision::Known),
                    Evaluation::New { updated, evicted } => (updated, evicted),
                };

            let written = self
                .store
                .compare_and_swap(
                    user,
                    KNOWN_DEVICE_SIGNATURES_ATTRIBUTE,
                    stored.version,
                    &updated,
                )
                .await?;

            if written {
                if !evicted.is_empty() {
                    debug!(
                        realm_id = %user.realm_id,
                        user_id = %user.user_id,
                        evicted = evicted.len(),
                        "evicted oldest known device signatures"
                    );
                }
                return Ok(DeviceDecision::New);
            }

            debug!(
                realm_id = %user.realm_id,
                user_id = %user.user_id,
                attempt,
                "known device history changed concurrently, retrying"
            );
        }

        warn!(
            realm_id = %user.realm_id,
            user_id = %user.user_id,
            attempts = self.max_attempts,
            "gave up updating known device history"
        );
        Err(StoreError::Contention {
            attempts: self.max_attempts,
        })
    }
}

impl std::fmt::Debug for KnownDeviceEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnownDeviceEvaluator")
            .field("max_signatures", &self.max_signatures)
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}
