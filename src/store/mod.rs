//! Persistence seams: the per-user attribute store and the user directory.
//!
//! Attribute writes are compare-and-swap against the version returned by the
//! last load. Version `0` means the attribute does not exist yet.

pub mod memory;
pub mod postgres;
#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserKey {
    pub realm_id: String,
    pub user_id: String,
}

impl UserKey {
    #[must_use]
    pub fn new(realm_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            realm_id: realm_id.into(),
            user_id: user_id.into(),
        }
    }
}

/// Multi-valued attribute plus the version token used for the next write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionedValues {
    pub values: Vec<String>,
    pub version: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub realm_id: String,
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub email_verified: bool,
}

impl UserRecord {
    #[must_use]
    pub fn key(&self) -> UserKey {
        UserKey::new(self.realm_id.clone(), self.id.clone())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("attribute update lost {attempts} consecutive write races")]
    Contention { attempts: u32 },
}

#[async_trait]
pub trait AttributeStore: Send + Sync {
    /// Load an attribute. Missing attributes load as empty with version `0`.
    async fn load(&self, user: &UserKey, name: &str) -> Result<VersionedValues, StoreError>;

    /// Replace the attribute if its version still equals `expected_version`.
    ///
    /// Returns `false` when another writer got there first.
    async fn compare_and_swap(
        &self,
        user: &UserKey,
        name: &str,
        expected_version: i64,
        values: &[String],
    ) -> Result<bool, StoreError>;

    /// Cheap liveness check used by `/health`.
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, user: &UserKey) -> Result<Option<UserRecord>, StoreError>;
}
