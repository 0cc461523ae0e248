//! Row types and their domain conversions
//!
//! Postgres stores enums as text and unsigned counters as signed
//! integers; converting back validates both, surfacing corrupt rows as
//! serialization errors rather than panics.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use dataops_connector::profile::ConnectionProfile;
use dataops_connector::types::{AccessMode, DatabaseFamily, HealthStatus};
use dataops_operations::model::{
    ConnectionHealthLog, JobExecution, JobStatus, JobType, RetryPolicy, ScheduledJob,
    TriggerSource,
};
use dataops_operations::store::StoreError;

fn parse_enum<T>(value: &str, what: &str) -> Result<T, StoreError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| StoreError::serialization(format!("invalid {what} '{value}': {e}")))
}

fn unsigned_32(value: i32, what: &str) -> Result<u32, StoreError> {
    u32::try_from(value)
        .map_err(|_| StoreError::serialization(format!("negative {what}: {value}")))
}

fn unsigned_64(value: i64, what: &str) -> Result<u64, StoreError> {
    u64::try_from(value)
        .map_err(|_| StoreError::serialization(format!("negative {what}: {value}")))
}

pub(crate) fn signed_64(value: u64, what: &str) -> Result<i64, StoreError> {
    i64::try_from(value)
        .map_err(|_| StoreError::serialization(format!("{what} out of range: {value}")))
}

pub(crate) fn signed_32(value: u32, what: &str) -> Result<i32, StoreError> {
    i32::try_from(value)
        .map_err(|_| StoreError::serialization(format!("{what} out of range: {value}")))
}

#[derive(Debug, FromRow)]
pub(crate) struct ProfileRow {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub family: String,
    pub host: Option<String>,
    pub port: Option<i32>,
    pub database_name: String,
    pub username: Option<String>,
    pub encrypted_password: Option<String>,
    pub encrypted_uri: Option<String>,
    pub pool_size: i32,
    pub max_connections: i32,
    pub timeout_seconds: i64,
    pub access_mode: String,
    pub ssl_ca_path: Option<String>,
    pub ssl_cert_path: Option<String>,
    pub ssl_key_path: Option<String>,
    pub is_active: bool,
    pub health_status: String,
    pub last_health_check: Option<DateTime<Utc>>,
    pub response_time_ms: Option<i64>,
    pub failed_attempts: i32,
    pub capabilities: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ProfileRow> for ConnectionProfile {
    type Error = StoreError;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        let family: DatabaseFamily = parse_enum(&row.family, "database family")?;
        let access_mode: AccessMode = parse_enum(&row.access_mode, "access mode")?;
        let health_status: HealthStatus = parse_enum(&row.health_status, "health status")?;
        let port = row
            .port
            .map(|p| {
                u16::try_from(p)
                    .map_err(|_| StoreError::serialization(format!("invalid port: {p}")))
            })
            .transpose()?;

        Ok(ConnectionProfile {
            id: row.id,
            name: row.name,
            description: row.description,
            family,
            host: row.host,
            port,
            database: row.database_name,
            username: row.username,
            encrypted_password: row.encrypted_password,
            encrypted_uri: row.encrypted_uri,
            pool_size: unsigned_32(row.pool_size, "pool size")?,
            max_connections: unsigned_32(row.max_connections, "max connections")?,
            timeout_seconds: unsigned_64(row.timeout_seconds, "timeout")?,
            access_mode,
            ssl_ca_path: row.ssl_ca_path,
            ssl_cert_path: row.ssl_cert_path,
            ssl_key_path: row.ssl_key_path,
            is_active: row.is_active,
            health_status,
            last_health_check: row.last_health_check,
            response_time_ms: row
                .response_time_ms
                .map(|v| unsigned_64(v, "response time"))
                .transpose()?,
            failed_attempts: unsigned_32(row.failed_attempts, "failed attempts")?,
            capabilities: row.capabilities,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct JobRow {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub job_type: String,
    pub connection_id: Uuid,
    pub configuration: serde_json::Value,
    pub pre_execution_sql: Option<String>,
    pub post_execution_sql: Option<String>,
    pub cron_expression: Option<String>,
    pub timezone: String,
    pub is_active: bool,
    pub max_runtime_seconds: i64,
    pub retry_policy: serde_json::Value,
    pub failure_threshold: i32,
    pub retry_count: i32,
    pub consecutive_failures: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub total_runs: i64,
    pub successful_runs: i64,
    pub failed_runs: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for ScheduledJob {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let job_type: JobType = parse_enum(&row.job_type, "job type")?;
        let retry_policy: RetryPolicy = serde_json::from_value(row.retry_policy)
            .map_err(|e| StoreError::serialization(format!("invalid retry policy: {e}")))?;

        Ok(ScheduledJob {
            id: row.id,
            name: row.name,
            description: row.description,
            job_type,
            connection_id: row.connection_id,
            configuration: row.configuration,
            pre_execution_sql: row.pre_execution_sql,
            post_execution_sql: row.post_execution_sql,
            cron_expression: row.cron_expression,
            timezone: row.timezone,
            is_active: row.is_active,
            max_runtime_seconds: unsigned_64(row.max_runtime_seconds, "max runtime")?,
            retry_policy,
            failure_threshold: unsigned_32(row.failure_threshold, "failure threshold")?,
            retry_count: unsigned_32(row.retry_count, "retry count")?,
            consecutive_failures: unsigned_32(row.consecutive_failures, "consecutive failures")?,
            next_retry_at: row.next_retry_at,
            next_run_at: row.next_run_at,
            last_run_at: row.last_run_at,
            total_runs: unsigned_64(row.total_runs, "total runs")?,
            successful_runs: unsigned_64(row.successful_runs, "successful runs")?,
            failed_runs: unsigned_64(row.failed_runs, "failed runs")?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct ExecutionRow {
    pub id: Uuid,
    pub job_id: Uuid,
    pub status: String,
    pub triggered_by: String,
    pub parent_execution_id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub log: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ExecutionRow> for JobExecution {
    type Error = StoreError;

    fn try_from(row: ExecutionRow) -> Result<Self, Self::Error> {
        let status: JobStatus = parse_enum(&row.status, "job status")?;
        let triggered_by: TriggerSource = parse_enum(&row.triggered_by, "trigger source")?;

        Ok(JobExecution {
            id: row.id,
            job_id: row.job_id,
            status,
            triggered_by,
            parent_execution_id: row.parent_execution_id,
            started_at: row.started_at,
            completed_at: row.completed_at,
            duration_ms: row
                .duration_ms
                .map(|v| unsigned_64(v, "duration"))
                .transpose()?,
            result: row.result,
            error_message: row.error_message,
            log: row.log,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct HealthLogRow {
    pub id: Uuid,
    pub connection_id: Uuid,
    pub status: String,
    pub response_time_ms: Option<i64>,
    pub error_message: Option<String>,
    pub checked_by: String,
    pub checked_at: DateTime<Utc>,
}

impl TryFrom<HealthLogRow> for ConnectionHealthLog {
    type Error = StoreError;

    fn try_from(row: HealthLogRow) -> Result<Self, Self::Error> {
        Ok(ConnectionHealthLog {
            id: row.id,
            connection_id: row.connection_id,
            status: parse_enum(&row.status, "health status")?,
            response_time_ms: row
                .response_time_ms
                .map(|v| unsigned_64(v, "response time"))
                .transpose()?,
            error_message: row.error_message,
            checked_by: row.checked_by,
            checked_at: row.checked_at,
        })
    }
}
