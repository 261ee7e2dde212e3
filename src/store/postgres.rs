//! `PostgreSQL` backed attribute store and user directory.
//!
//! Attributes live in `user_attributes` as a `text[]` with a `version` column.
//! A write only lands when the stored version still matches the version the
//! caller loaded, so two concurrent read-modify-write cycles cannot silently
//! overwrite each other.

use async_trait::async_trait;
use sqlx::{Connection, PgPool, Row};
use tracing::{Instrument, info_span};

use super::{AttributeStore, StoreError, UserDirectory, UserKey, UserRecord, VersionedValues};

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AttributeStore for PgStore {
    async fn load(&self, user: &UserKey, name: &str) -> Result<VersionedValues, StoreError> {
        let query = r"
            SELECT value_list, version
            FROM user_attributes
            WHERE realm_id = $1 AND user_id = $2 AND name = $3
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(&user.realm_id)
            .bind(&user.user_id)
            .bind(name)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;

        Ok(match row {
            Some(row) => VersionedValues {
                values: row.try_get("value_list")?,
                version: row.try_get("version")?,
            },
            None => VersionedValues::default(),
        })
    }

    async fn compare_and_swap(
        &self,
        user: &UserKey,
        name: &str,
        expected_version: i64,
        values: &[String],
    ) -> Result<bool, StoreError> {
        // Version 0 means "not stored yet": the first writer wins the insert.
        let (query, operation) = if expected_version == 0 {
            (
                r"
                INSERT INTO user_attributes (realm_id, user_id, name, value_list, version)
                VALUES ($1, $2, $3, $4, 1)
                ON CONFLICT (realm_id, user_id, name) DO NOTHING
                ",
                "INSERT",
            )
        } else {
            (
                r"
                UPDATE user_attributes
                SET value_list = $4,
                    version = version + 1,
                    updated_at = NOW()
                WHERE realm_id = $1 AND user_id = $2 AND name = $3 AND version = $5
                ",
                "UPDATE",
            )
        };
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = operation,
            db.statement = query
        );

        let mut statement = sqlx::query(query)
            .bind(&user.realm_id)
            .bind(&user.user_id)
            .bind(name)
            .bind(values.to_vec());
        if expected_version != 0 {
            statement = statement.bind(expected_version);
        }

        let result = statement.execute(&self.pool).instrument(span).await?;

        Ok(result.rows_affected() == 1)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let acquire_span = info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self.pool.acquire().instrument(acquire_span).await?;
        let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping().instrument(ping_span).await?;
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for PgStore {
    async fn find_user(&self, user: &UserKey) -> Result<Option<UserRecord>, StoreError> {
        let query = r"
            SELECT username, email, email_verified
            FROM users
            WHERE realm_id = $1 AND id = $2
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(&user.realm_id)
            .bind(&user.user_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;

        row.map(|row| -> Result<UserRecord, StoreError> {
            Ok(UserRecord {
                realm_id: user.realm_id.clone(),
                id: user.user_id.clone(),
                username: row.try_get("username")?,
                email: row.try_get("email")?,
                email_verified: row.try_get("email_verified")?,
            })
        })
        .transpose()
    }
}
