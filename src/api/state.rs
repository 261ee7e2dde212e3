//! Shared state for the HTTP handlers.
//!
//! Authentication sessions live in memory only and are bounded. A session that
//! is not touched for the configured TTL is gone on its next access; the whole
//! table is swept at most once per TTL, or when it is full.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::warn;
use ulid::Ulid;

use crate::device::{AuthSession, DeviceConfig, FlowPipeline, NewDeviceListener, Notifier};
use crate::store::{AttributeStore, UserDirectory};

#[derive(Debug)]
struct FlowEntry {
    session: AuthSession,
    last_seen: Instant,
}

#[derive(Debug)]
struct FlowTable {
    entries: HashMap<String, FlowEntry>,
    last_sweep: Instant,
}

/// In-progress authentication sessions keyed by flow id.
#[derive(Debug)]
pub struct FlowSessions {
    ttl: Duration,
    capacity: usize,
    table: Mutex<FlowTable>,
}

impl FlowSessions {
    #[must_use]
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            table: Mutex::new(FlowTable {
                entries: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    /// Start a new session and return its flow id.
    ///
    /// Returns `None` when the table is full of live sessions.
    pub fn create(&self) -> Option<String> {
        let mut table = self.lock();
        if table.entries.len() >= self.capacity || table.last_sweep.elapsed() >= self.ttl {
            self.sweep(&mut table);
        }
        if table.entries.len() >= self.capacity {
            warn!(capacity = self.capacity, "authentication session table is full");
            return None;
        }

        let id = Ulid::new().to_string();
        table.entries.insert(
            id.clone(),
            FlowEntry {
                session: AuthSession::new(id.clone()),
                last_seen: Instant::now(),
            },
        );
        Some(id)
    }

    /// Run `f` against a live session, refreshing its expiry.
    ///
    /// Returns `None` when the flow is unknown or expired.
    pub fn with_session<R>(&self, id: &str, f: impl FnOnce(&mut AuthSession) -> R) -> Option<R> {
        let mut table = self.lock();
        if self.drop_if_expired(&mut table, id) {
            return None;
        }
        let entry = table.entries.get_mut(id)?;
        entry.last_seen = Instant::now();
        Some(f(&mut entry.session))
    }

    /// End a session, handing back its notes.
    pub fn remove(&self, id: &str) -> Option<AuthSession> {
        let mut table = self.lock();
        if self.drop_if_expired(&mut table, id) {
            return None;
        }
        table.entries.remove(id).map(|entry| entry.session)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, FlowTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn drop_if_expired(&self, table: &mut FlowTable, id: &str) -> bool {
        let expired = table
            .entries
            .get(id)
            .is_some_and(|entry| entry.last_seen.elapsed() >= self.ttl);
        if expired {
            table.entries.remove(id);
        }
        expired
    }

    fn sweep(&self, table: &mut FlowTable) {
        let ttl = self.ttl;
        table.entries.retain(|_, entry| entry.last_seen.elapsed() < ttl);
        table.last_sweep = Instant::now();
    }
}

pub struct AppState {
    pub pipeline: FlowPipeline,
    pub flows: FlowSessions,
    pub listener: NewDeviceListener,
    store: Arc<dyn AttributeStore>,
}

impl AppState {
    #[must_use]
    pub fn new(
        config: &DeviceConfig,
        store: Arc<dyn AttributeStore>,
        directory: Arc<dyn UserDirectory>,
        notifier: Notifier,
    ) -> Self {
        let config = config.clone().normalize();
        Self {
            pipeline: config.capture_pipeline(),
            flows: FlowSessions::new(
                Duration::from_secs(config.flow_ttl_seconds()),
                config.max_flows(),
            ),
            listener: NewDeviceListener::new(directory, config.evaluator(store.clone()), notifier),
            store,
        }
    }

    #[must_use]
    pub fn store(&self) -> &dyn AttributeStore {
        self.store.as_ref()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("pipeline", &self.pipeline)
            .field("flows", &self.flows.len())
            .field("listener", &self.listener)
            .finish_non_exhaustive()
    }
}
