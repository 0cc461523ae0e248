//! Job orchestration error types

use thiserror::Error;
use uuid::Uuid;

use crate::store::StoreError;
use dataops_connector::error::ConnectorError;

/// Error that can occur while scheduling or executing jobs.
#[derive(Debug, Error)]
pub enum JobError {
    /// No job with the given id.
    #[error("job {job_id} not found")]
    JobNotFound { job_id: Uuid },

    /// No execution with the given id.
    #[error("execution {execution_id} not found")]
    ExecutionNotFound { execution_id: Uuid },

    /// No connection profile with the given id.
    #[error("connection {connection_id} not found")]
    ConnectionNotFound { connection_id: Uuid },

    /// Scheduled trigger hit a deactivated job.
    #[error("job {job_id} is not active")]
    JobInactive { job_id: Uuid },

    /// An execution of this job is already in flight.
    #[error("job {job_id} is already running")]
    AlreadyRunning { job_id: Uuid },

    /// Cron expression failed to parse.
    #[error("invalid cron expression '{expression}': {message}")]
    InvalidCronExpression { expression: String, message: String },

    /// Timezone name is not in the tz database.
    #[error("invalid timezone: {timezone}")]
    InvalidTimezone { timezone: String },

    /// No executor is registered for this job type.
    #[error("no executor registered for job type '{job_type}'")]
    UnknownJobType { job_type: String },

    /// State transition not allowed from the current status.
    #[error("invalid state: expected {expected}, found {actual}")]
    InvalidState { expected: String, actual: String },

    /// Job configuration rejected by the executor.
    #[error("validation failed: {}", messages.join("; "))]
    ValidationFailed { messages: Vec<String> },

    /// Executor exceeded the job's runtime ceiling.
    #[error("execution timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// Executor failed.
    #[error("execution failed: {message}")]
    ExecutionFailed { message: String },

    /// Connector layer error.
    #[error(transparent)]
    Connector(#[from] ConnectorError),

    /// Persistence layer error.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl JobError {
    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            JobError::JobNotFound { .. } => "JOB_NOT_FOUND",
            JobError::ExecutionNotFound { .. } => "EXECUTION_NOT_FOUND",
            JobError::ConnectionNotFound { .. } => "CONNECTION_NOT_FOUND",
            JobError::JobInactive { .. } => "JOB_INACTIVE",
            JobError::AlreadyRunning { .. } => "ALREADY_RUNNING",
            JobError::InvalidCronExpression { .. } => "INVALID_CRON",
            JobError::InvalidTimezone { .. } => "INVALID_TIMEZONE",
            JobError::UnknownJobType { .. } => "UNKNOWN_JOB_TYPE",
            JobError::InvalidState { .. } => "INVALID_STATE",
            JobError::ValidationFailed { .. } => "VALIDATION_FAILED",
            JobError::Timeout { .. } => "EXECUTION_TIMEOUT",
            JobError::ExecutionFailed { .. } => "EXECUTION_FAILED",
            JobError::Connector(_) => "CONNECTOR_ERROR",
            JobError::Store(_) => "STORE_ERROR",
        }
    }

    /// Create an execution failed error.
    pub fn execution_failed(message: impl Into<String>) -> Self {
        JobError::ExecutionFailed {
            message: message.into(),
        }
    }

    /// Create a validation failed error.
    pub fn validation_failed(messages: Vec<String>) -> Self {
        JobError::ValidationFailed { messages }
    }
}

/// Result type for job operations.
pub type JobResult<T> = Result<T, JobError>;
