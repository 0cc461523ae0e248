//! Persistence traits
//!
//! The orchestrator depends only on these traits; the `sqlx`-backed
//! implementation lives in its own crate, and tests use in-memory
//! doubles.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::model::{ConnectionHealthLog, JobExecution, ScheduledJob};
use dataops_connector::profile::ConnectionProfile;
use dataops_connector::types::HealthStatus;

/// Error from the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Entity does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    /// Underlying database failure.
    #[error("database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Stored payload failed to (de)serialize.
    #[error("serialization error: {message}")]
    Serialization { message: String },
}

impl StoreError {
    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        StoreError::Database {
            message: message.into(),
            source: None,
        }
    }

    /// Create a database error with source.
    pub fn database_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        StoreError::Database {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        StoreError::Serialization {
            message: message.into(),
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Storage for scheduled jobs and their executions.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert_job(&self, job: &ScheduledJob) -> StoreResult<()>;

    async fn job(&self, job_id: Uuid) -> StoreResult<Option<ScheduledJob>>;

    async fn update_job(&self, job: &ScheduledJob) -> StoreResult<()>;

    async fn delete_job(&self, job_id: Uuid) -> StoreResult<()>;

    /// Active jobs whose scheduled run or pending retry is due.
    async fn due_jobs(&self, now: DateTime<Utc>) -> StoreResult<Vec<ScheduledJob>>;

    async fn insert_execution(&self, execution: &JobExecution) -> StoreResult<()>;

    async fn execution(&self, execution_id: Uuid) -> StoreResult<Option<JobExecution>>;

    async fn update_execution(&self, execution: &JobExecution) -> StoreResult<()>;

    /// Most recent executions of a job, newest first.
    async fn executions_for_job(
        &self,
        job_id: Uuid,
        limit: u32,
    ) -> StoreResult<Vec<JobExecution>>;
}

/// Storage for connection profiles and their health trail.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn profile(&self, profile_id: Uuid) -> StoreResult<Option<ConnectionProfile>>;

    async fn active_profiles(&self) -> StoreResult<Vec<ConnectionProfile>>;

    /// Persist the outcome of a health probe onto the profile.
    async fn update_health(
        &self,
        profile_id: Uuid,
        status: HealthStatus,
        response_time_ms: Option<u64>,
        failed_attempts: u32,
        checked_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Persist the detected capability blob onto the profile.
    async fn save_capabilities(
        &self,
        profile_id: Uuid,
        capabilities: serde_json::Value,
    ) -> StoreResult<()>;

    async fn insert_health_log(&self, log: &ConnectionHealthLog) -> StoreResult<()>;

    /// Health log rows within the lookback window, newest first.
    async fn health_history(
        &self,
        connection_id: Uuid,
        hours: u32,
    ) -> StoreResult<Vec<ConnectionHealthLog>>;
}
