//! In-process store, used for local development and tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use super::{AttributeStore, StoreError, UserDirectory, UserKey, UserRecord, VersionedValues};

#[derive(Debug, Default)]
pub struct MemoryStore {
    attributes: Mutex<HashMap<(UserKey, String), VersionedValues>>,
    users: Mutex<HashMap<UserKey, UserRecord>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_user(&self, user: UserRecord) {
        self.users
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user.key(), user);
    }

    /// Current values of an attribute, empty when unset.
    #[must_use]
    pub fn values(&self, user: &UserKey, name: &str) -> Vec<String> {
        self.attributes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(user.clone(), name.to_string()))
            .map(|stored| stored.values.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AttributeStore for MemoryStore {
    async fn load(&self, user: &UserKey, name: &str) -> Result<VersionedValues, StoreError> {
        Ok(self
            .attributes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(user.clone(), name.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn compare_and_swap(
        &self,
        user: &UserKey,
        name: &str,
        expected_version: i64,
        values: &[String],
    ) -> Result<bool, StoreError> {
        let mut attributes = self
            .attributes
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let entry = attributes
            .entry((user.clone(), name.to_string()))
            .or_default();

        if entry.version != expected_version {
            return Ok(false);
        }

        entry.values = values.to_vec();
        entry.version += 1;
        Ok(true)
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn find_user(&self, user: &UserKey) -> Result<Option<UserRecord>, StoreError> {
        Ok(self
            .users
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user)
            .cloned())
    }
}
