//! Job domain model
//!
//! Scheduled jobs, their executions, and the health log rows the
//! monitor appends. Enum triples (`as_str`/`Display`/`FromStr`) follow
//! the persistence-friendly lowercase snake_case convention.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use dataops_connector::types::HealthStatus;

/// Kind of work a scheduled job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    SqlScript,
    StoredProcedure,
    DatabaseBackup,
}

impl JobType {
    /// String form used in storage and APIs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::SqlScript => "sql_script",
            JobType::StoredProcedure => "stored_procedure",
            JobType::DatabaseBackup => "database_backup",
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error parsing a [`JobType`] from a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseJobTypeError(pub String);

impl std::fmt::Display for ParseJobTypeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown job type: {}", self.0)
    }
}

impl std::error::Error for ParseJobTypeError {}

impl std::str::FromStr for JobType {
    type Err = ParseJobTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sql_script" => Ok(JobType::SqlScript),
            "stored_procedure" => Ok(JobType::StoredProcedure),
            "database_backup" => Ok(JobType::DatabaseBackup),
            other => Err(ParseJobTypeError(other.to_string())),
        }
    }
}

/// Lifecycle state of one job execution.
///
/// `Retrying` is a taxonomy state: a failed execution whose retry is
/// pending shows as FAILED, and the retry runs as a fresh execution
/// chained through `parent_execution_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Retrying,
}

impl JobStatus {
    /// String form used in storage and APIs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Retrying => "retrying",
        }
    }

    /// Whether this status ends the execution lifecycle.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error parsing a [`JobStatus`] from a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseJobStatusError(pub String);

impl std::fmt::Display for ParseJobStatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown job status: {}", self.0)
    }
}

impl std::error::Error for ParseJobStatusError {}

impl std::str::FromStr for JobStatus {
    type Err = ParseJobStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            "retrying" => Ok(JobStatus::Retrying),
            other => Err(ParseJobStatusError(other.to_string())),
        }
    }
}

/// What caused an execution to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    Schedule,
    Manual,
    Api,
    Retry,
}

impl TriggerSource {
    /// String form used in storage and APIs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerSource::Schedule => "schedule",
            TriggerSource::Manual => "manual",
            TriggerSource::Api => "api",
            TriggerSource::Retry => "retry",
        }
    }
}

impl std::fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error parsing a [`TriggerSource`] from a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTriggerSourceError(pub String);

impl std::fmt::Display for ParseTriggerSourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown trigger source: {}", self.0)
    }
}

impl std::error::Error for ParseTriggerSourceError {}

impl std::str::FromStr for TriggerSource {
    type Err = ParseTriggerSourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "schedule" => Ok(TriggerSource::Schedule),
            "manual" => Ok(TriggerSource::Manual),
            "api" => Ok(TriggerSource::Api),
            "retry" => Ok(TriggerSource::Retry),
            other => Err(ParseTriggerSourceError(other.to_string())),
        }
    }
}

/// Capped exponential backoff parameters for a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries allowed per failure chain.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry.
    #[serde(default = "default_base_delay")]
    pub base_delay_seconds: u64,
    /// Growth factor per retry.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Delay ceiling.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_seconds: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay() -> u64 {
    60
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_backoff() -> u64 {
    3600
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_seconds: default_base_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            max_backoff_seconds: default_max_backoff(),
        }
    }
}

/// A recurring (or manually triggered) operational job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub job_type: JobType,
    /// Connection profile the job runs against.
    pub connection_id: Uuid,
    /// Executor configuration (script text, procedure name, backup
    /// options) as a free-form JSON object.
    pub configuration: serde_json::Value,
    /// SQL run on the job's connection before the executor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_execution_sql: Option<String>,
    /// SQL run on the job's connection after a successful executor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_execution_sql: Option<String>,

    /// Standard 5-field cron expression. None means manual-only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cron_expression: Option<String>,
    /// IANA timezone the cron expression is evaluated in.
    #[serde(default = "default_timezone")]
    pub timezone: String,

    #[serde(default = "default_true")]
    pub is_active: bool,
    /// Runtime ceiling for one execution.
    #[serde(default = "default_max_runtime")]
    pub max_runtime_seconds: u64,

    #[serde(default)]
    pub retry_policy: RetryPolicy,
    /// Consecutive failures that trip the sticky auto-disable.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Retries consumed in the current failure chain.
    #[serde(default)]
    pub retry_count: u32,
    /// Failures since the last success.
    #[serde(default)]
    pub consecutive_failures: u32,
    /// When the pending retry becomes due, if one is scheduled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_run_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub total_runs: u64,
    #[serde(default)]
    pub successful_runs: u64,
    #[serde(default)]
    pub failed_runs: u64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_runtime() -> u64 {
    3600
}

fn default_failure_threshold() -> u32 {
    5
}

/// Input for creating a job; defaults are applied by the job manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub job_type: JobType,
    pub connection_id: Uuid,
    pub configuration: serde_json::Value,
    #[serde(default)]
    pub pre_execution_sql: Option<String>,
    #[serde(default)]
    pub post_execution_sql: Option<String>,
    #[serde(default)]
    pub cron_expression: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub max_runtime_seconds: Option<u64>,
    #[serde(default)]
    pub retry_policy: Option<RetryPolicy>,
    #[serde(default)]
    pub failure_threshold: Option<u32>,
}

/// One run of a scheduled job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecution {
    pub id: Uuid,
    pub job_id: Uuid,
    pub status: JobStatus,
    pub triggered_by: TriggerSource,
    /// Execution this one retries, when triggered by the retry path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_execution_id: Option<Uuid>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Set exactly when the execution reaches a terminal status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    /// Executor result payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Accumulated execution log.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl JobExecution {
    /// Create a pending execution for a job.
    #[must_use]
    pub fn pending(
        job_id: Uuid,
        triggered_by: TriggerSource,
        parent_execution_id: Option<Uuid>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            status: JobStatus::Pending,
            triggered_by,
            parent_execution_id,
            started_at: None,
            completed_at: None,
            duration_ms: None,
            result: None,
            error_message: None,
            log: None,
            created_at: Utc::now(),
        }
    }
}

/// One health probe outcome, appended on every check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionHealthLog {
    pub id: Uuid,
    pub connection_id: Uuid,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Who ran the probe; the monitor writes "system".
    pub checked_by: String,
    pub checked_at: DateTime<Utc>,
}

impl ConnectionHealthLog {
    /// Create a log row for a system-initiated probe.
    #[must_use]
    pub fn system(
        connection_id: Uuid,
        status: HealthStatus,
        response_time_ms: Option<u64>,
        error_message: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            connection_id,
            status,
            response_time_ms,
            error_message,
            checked_by: "system".to_string(),
            checked_at: Utc::now(),
        }
    }
}
