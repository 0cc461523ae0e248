//! sqlx-backed profile store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use dataops_connector::profile::ConnectionProfile;
use dataops_connector::types::HealthStatus;
use dataops_operations::model::ConnectionHealthLog;
use dataops_operations::store::{ProfileStore, StoreError, StoreResult};

use crate::rows::{signed_32, signed_64, HealthLogRow, ProfileRow};

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::database_with_source("query failed", e)
}

/// Connection profile storage over a postgres pool.
#[derive(Debug, Clone)]
pub struct PgProfileStore {
    pool: PgPool,
}

impl PgProfileStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a profile. Secrets must already be encrypted by the
    /// credential vault; this layer never sees plaintext.
    pub async fn insert_profile(&self, profile: &ConnectionProfile) -> StoreResult<()> {
        sqlx::query(
            r"
            INSERT INTO connection_profiles (
                id, name, description, family, host, port, database_name,
                username, encrypted_password, encrypted_uri,
                pool_size, max_connections, timeout_seconds, access_mode,
                ssl_ca_path, ssl_cert_path, ssl_key_path,
                is_active, health_status, last_health_check, response_time_ms,
                failed_attempts, capabilities, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                    $11, $12, $13, $14, $15, $16, $17, $18, $19, $20,
                    $21, $22, $23, $24, $25)
            ",
        )
        .bind(profile.id)
        .bind(&profile.name)
        .bind(&profile.description)
        .bind(profile.family.as_str())
        .bind(&profile.host)
        .bind(profile.port.map(i32::from))
        .bind(&profile.database)
        .bind(&profile.username)
        .bind(&profile.encrypted_password)
        .bind(&profile.encrypted_uri)
        .bind(signed_32(profile.pool_size, "pool size")?)
        .bind(signed_32(profile.max_connections, "max connections")?)
        .bind(signed_64(profile.timeout_seconds, "timeout")?)
        .bind(profile.access_mode.as_str())
        .bind(&profile.ssl_ca_path)
        .bind(&profile.ssl_cert_path)
        .bind(&profile.ssl_key_path)
        .bind(profile.is_active)
        .bind(profile.health_status.as_str())
        .bind(profile.last_health_check)
        .bind(
            profile
                .response_time_ms
                .map(|v| signed_64(v, "response time"))
                .transpose()?,
        )
        .bind(signed_32(profile.failed_attempts, "failed attempts")?)
        .bind(&profile.capabilities)
        .bind(profile.created_at)
        .bind(profile.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn profile(&self, profile_id: Uuid) -> StoreResult<Option<ConnectionProfile>> {
        let row: Option<ProfileRow> =
            sqlx::query_as("SELECT * FROM connection_profiles WHERE id = $1")
                .bind(profile_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;

        row.map(ConnectionProfile::try_from).transpose()
    }

    async fn active_profiles(&self) -> StoreResult<Vec<ConnectionProfile>> {
        let rows: Vec<ProfileRow> =
            sqlx::query_as("SELECT * FROM connection_profiles WHERE is_active ORDER BY name")
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;

        rows.into_iter().map(ConnectionProfile::try_from).collect()
    }

    async fn update_health(
        &self,
        profile_id: Uuid,
        status: HealthStatus,
        response_time_ms: Option<u64>,
        failed_attempts: u32,
        checked_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            r"
            UPDATE connection_profiles SET
                health_status = $2,
                response_time_ms = $3,
                failed_attempts = $4,
                last_health_check = $5,
                updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(profile_id)
        .bind(status.as_str())
        .bind(
            response_time_ms
                .map(|v| signed_64(v, "response time"))
                .transpose()?,
        )
        .bind(signed_32(failed_attempts, "failed attempts")?)
        .bind(checked_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "profile",
                id: profile_id,
            });
        }
        Ok(())
    }

    async fn save_capabilities(
        &self,
        profile_id: Uuid,
        capabilities: serde_json::Value,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE connection_profiles SET capabilities = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(profile_id)
        .bind(capabilities)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "profile",
                id: profile_id,
            });
        }
        Ok(())
    }

    async fn insert_health_log(&self, log: &ConnectionHealthLog) -> StoreResult<()> {
        sqlx::query(
            r"
            INSERT INTO connection_health_logs (
                id, connection_id, status, response_time_ms,
                error_message, checked_by, checked_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(log.id)
        .bind(log.connection_id)
        .bind(log.status.as_str())
        .bind(
            log.response_time_ms
                .map(|v| signed_64(v, "response time"))
                .transpose()?,
        )
        .bind(&log.error_message)
        .bind(&log.checked_by)
        .bind(log.checked_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn health_history(
        &self,
        connection_id: Uuid,
        hours: u32,
    ) -> StoreResult<Vec<ConnectionHealthLog>> {
        let cutoff = Utc::now() - chrono::Duration::hours(i64::from(hours));
        let rows: Vec<HealthLogRow> = sqlx::query_as(
            r"
            SELECT * FROM connection_health_logs
            WHERE connection_id = $1 AND checked_at >= $2
            ORDER BY checked_at DESC
            ",
        )
        .bind(connection_id)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(ConnectionHealthLog::try_from).collect()
    }
}
