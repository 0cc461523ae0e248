//! Job executors
//!
//! One executor per job type, sharing a validate/execute contract and
//! an accumulated execution log with secret redaction.

pub mod backup;
pub mod procedure;
pub mod script;

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::JobResult;
use crate::model::{JobType, ScheduledJob};
use dataops_connector::profile::ConnectionProfile;
use dataops_connector::traits::Connector;

pub use backup::BackupExecutor;
pub use procedure::ProcedureExecutor;
pub use script::ScriptExecutor;

/// Rows included in a result preview before truncation.
pub const PREVIEW_ROW_LIMIT: usize = 100;

/// Database privilege an executor needs on the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    Select,
    Insert,
    Update,
    Delete,
    Ddl,
    Execute,
    ShowView,
    Trigger,
    LockTables,
}

impl Permission {
    /// Privilege name as granted on the target database.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Select => "SELECT",
            Permission::Insert => "INSERT",
            Permission::Update => "UPDATE",
            Permission::Delete => "DELETE",
            Permission::Ddl => "DDL",
            Permission::Execute => "EXECUTE",
            Permission::ShowView => "SHOW VIEW",
            Permission::Trigger => "TRIGGER",
            Permission::LockTables => "LOCK TABLES",
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Everything an executor needs for one run.
///
/// Deliberately not `Debug`: `password` carries a decrypted credential
/// destined for a subprocess environment.
pub struct ExecutionContext {
    pub job: ScheduledJob,
    pub execution_id: Uuid,
    pub profile: ConnectionProfile,
    /// Live connector for query-based executors.
    pub connector: Option<Arc<dyn Connector>>,
    /// Decrypted password for subprocess-based executors; injected into
    /// the child environment only, never argv.
    pub password: Option<String>,
}

/// Outcome of pre-execution validation.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Whether the configuration may execute.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Record a blocking problem.
    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    /// Record a non-blocking concern.
    pub fn warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

/// Accumulated, timestamped log for one execution.
#[derive(Debug, Clone, Default)]
pub struct ExecutionLog {
    entries: Vec<String>,
}

impl ExecutionLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, level: &str, message: &str) {
        let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ");
        self.entries.push(format!("[{timestamp}] [{level}] {message}"));
    }

    pub fn info(&mut self, message: impl AsRef<str>) {
        self.push("INFO", message.as_ref());
    }

    pub fn warning(&mut self, message: impl AsRef<str>) {
        self.push("WARNING", message.as_ref());
    }

    pub fn error(&mut self, message: impl AsRef<str>) {
        self.push("ERROR", message.as_ref());
    }

    #[must_use]
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Render the log for storage on the execution row.
    #[must_use]
    pub fn render(&self) -> String {
        self.entries.join("\n")
    }
}

/// Replace secret-bearing values in a JSON object before it reaches a
/// log or result payload. A key counts as secret-bearing when it
/// contains password, secret, token or key.
#[must_use]
pub fn redact_secrets(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let redacted = map
                .iter()
                .map(|(key, v)| {
                    if is_secret_key(key) {
                        (key.clone(), serde_json::Value::String("***REDACTED***".into()))
                    } else {
                        (key.clone(), redact_secrets(v))
                    }
                })
                .collect();
            serde_json::Value::Object(redacted)
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(redact_secrets).collect())
        }
        other => other.clone(),
    }
}

fn is_secret_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    ["password", "secret", "token", "key"]
        .iter()
        .any(|marker| lower.contains(marker))
}

/// Contract every job executor implements.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// Job type this executor handles.
    fn job_type(&self) -> JobType;

    /// Privileges the job's configuration needs on the target.
    fn required_permissions(&self, configuration: &serde_json::Value) -> Vec<Permission>;

    /// Check the configuration before running.
    async fn validate(&self, context: &ExecutionContext) -> JobResult<ValidationResult>;

    /// Run the job; returns the result payload persisted onto the
    /// execution row.
    async fn execute(
        &self,
        context: &ExecutionContext,
        log: &mut ExecutionLog,
    ) -> JobResult<serde_json::Value>;
}
